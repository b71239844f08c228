//! The browser-control surface consumed by the engine.
//!
//! [`Page`] is synchronous: every call blocks until Chrome answers or its own
//! timeout elapses. Implementations only need the primitive operations; the
//! DOM-level helpers (value setting, option selection, hit testing, overlay
//! removal) have script-based default implementations.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::BrowserError;
use crate::types::Locator;

/// What sits at the centre of an element when it is about to be clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitTarget {
    /// The element itself (or one of its children) receives the click.
    Top,
    /// Some other element, usually an overlay, would receive the click.
    Covered,
    /// A visually hidden native radio/checkbox/file input backing a label.
    HiddenControl,
    Missing,
}

pub trait Page {
    /// Navigate the primary tab. Single-page-app route changes surface as
    /// [`BrowserError::NavigationAborted`].
    fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    fn current_url(&self) -> String;

    fn title(&self) -> String;

    /// Full page HTML.
    fn content(&self) -> Result<String, BrowserError>;

    /// Evaluate a script expression and return its JSON value.
    fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Whether any element matches a raw CSS selector.
    fn has_match(&self, css: &str) -> bool;

    /// Native (trusted) click at the element's centre.
    fn click(&self, locator: &Locator) -> Result<(), BrowserError>;

    /// Focus the element and type text keystroke by keystroke.
    fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError>;

    fn press_key(&self, key: &str) -> Result<(), BrowserError>;

    fn set_input_files(&self, locator: &Locator, path: &str) -> Result<(), BrowserError>;

    /// Close every tab except the primary one.
    fn close_extra_tabs(&self);

    fn wait(&self, ms: u64) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    /// Poll until the element is rendered and visible, or `timeout_ms` elapses.
    fn is_visible(&self, locator: &Locator, timeout_ms: u64) -> bool {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
             return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0; }})()",
            sel = js_string(locator.as_str())
        );
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if matches!(self.evaluate(&script), Ok(Value::Bool(true))) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.wait(100);
        }
    }

    fn hit_test(&self, locator: &Locator) -> HitTarget {
        let script = HIT_TEST_JS.replace("__SEL__", &js_string(locator.as_str()));
        match self.evaluate(&script) {
            Ok(value) => serde_json::from_value(value).unwrap_or(HitTarget::Missing),
            Err(_) => HitTarget::Missing,
        }
    }

    /// DOM-level `el.click()`, bypassing hit testing.
    fn force_click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; el.click(); return true; }})()",
            sel = js_string(locator.as_str())
        );
        expect_true(self.evaluate(&script)?, locator)
    }

    /// Click the `<label>` associated with a hidden native control.
    fn click_label_for(&self, locator: &Locator) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             const label = (el.labels && el.labels[0]) || el.closest('label') || \
               (el.id && document.querySelector('label[for=\"' + CSS.escape(el.id) + '\"]')); \
             (label || el).click(); return true; }})()",
            sel = js_string(locator.as_str())
        );
        expect_true(self.evaluate(&script)?, locator)
    }

    /// Replace the element's value and fire the events frameworks listen for.
    fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); \
             const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
             const setter = Object.getOwnPropertyDescriptor(proto, 'value'); \
             if (setter && setter.set && (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA')) setter.set.call(el, {val}); \
             else if (el.isContentEditable) el.textContent = {val}; else el.value = {val}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             el.blur(); return true; }})()",
            sel = js_string(locator.as_str()),
            val = js_string(value)
        );
        expect_true(self.evaluate(&script)?, locator)
    }

    /// Choose a `<select>` option by visible label, falling back to its value.
    fn select_option(&self, locator: &Locator, label: &str) -> Result<(), BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el || !el.options) return false; \
             const want = {val}.trim().toLowerCase(); const opts = [...el.options]; \
             const opt = opts.find(o => o.text.trim().toLowerCase() === want) || \
               opts.find(o => o.value.trim().toLowerCase() === want) || \
               opts.find(o => o.text.trim().toLowerCase().startsWith(want)); \
             if (!opt) return false; el.value = opt.value; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            sel = js_string(locator.as_str()),
            val = js_string(label)
        );
        match self.evaluate(&script)? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Other(format!(
                "no option '{label}' in {locator}"
            ))),
        }
    }

    fn get_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); return el ? el.getAttribute({name}) : false; }})()",
            sel = js_string(locator.as_str()),
            name = js_string(name)
        );
        match self.evaluate(&script)? {
            Value::String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            _ => Err(BrowserError::ElementNotFound(locator.to_string())),
        }
    }

    /// Remove chat bubbles, cookie banners, toasts and unrelated modal dialogs.
    fn dismiss_overlays(&self) {
        if let Err(err) = self.evaluate(OVERLAY_JS) {
            debug!(error = %err, "overlay removal failed");
        }
    }
}

/// Encode a Rust string as a JS string literal.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn expect_true(value: Value, locator: &Locator) -> Result<(), BrowserError> {
    match value {
        Value::Bool(true) => Ok(()),
        _ => Err(BrowserError::ElementNotFound(locator.to_string())),
    }
}

const HIT_TEST_JS: &str = r#"
(() => {
  const el = document.querySelector(__SEL__);
  if (!el) return 'missing';
  const type = (el.type || '').toLowerCase();
  const s = getComputedStyle(el);
  let r = el.getBoundingClientRect();
  const hidden = s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0' || r.width < 2 || r.height < 2;
  if (hidden && el.tagName === 'INPUT' && ['radio', 'checkbox', 'file'].includes(type)) return 'hidden_control';
  el.scrollIntoView({ block: 'center', inline: 'center' });
  r = el.getBoundingClientRect();
  const top = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
  if (!top || top === el || el.contains(top)) return 'top';
  const label = top.closest('label');
  if (label && label.control === el) return 'top';
  return 'covered';
})()
"#;

const OVERLAY_JS: &str = r#"
(() => {
  document.querySelector('.msg-overlay-list-bubble')?.remove();
  document.querySelectorAll('[class*="cookie"], [class*="consent"], [id*="cookie"]').forEach(el => {
    if (el.offsetParent && !el.querySelector('form input:not([type="checkbox"])')) el.remove();
  });
  document.querySelectorAll('[role="dialog"], [role="alertdialog"]').forEach(d => {
    const text = (d.textContent || '').toLowerCase();
    if (!text.includes('apply') && !text.includes('application') && d.offsetParent) d.remove();
  });
  document.querySelectorAll('.artdeco-toast-item, .notification-badge').forEach(n => n.remove());
  document.querySelectorAll('*').forEach(el => {
    const s = getComputedStyle(el);
    if (s.position === 'fixed' && parseInt(s.zIndex || '0', 10) > 100 && s.pointerEvents !== 'none') {
      if (!el.querySelector('form, input, select, textarea, button[type="submit"]')) el.remove();
    }
  });
  return true;
})()
"#;

/// Receiving end of the captured popup-URL queue.
///
/// The tab watcher is the only producer; the navigator drains it between
/// iterations.
#[derive(Debug)]
pub struct PopupQueue {
    rx: Receiver<String>,
}

impl PopupQueue {
    pub fn channel() -> (Sender<String>, PopupQueue) {
        let (tx, rx) = mpsc::channel();
        (tx, PopupQueue { rx })
    }

    /// Drain everything captured so far and return the newest usable URL.
    pub fn drain_latest(&self) -> Option<String> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(url) if is_navigable(&url) => latest = Some(url),
                Ok(_) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

fn is_navigable(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url != "about:blank" && !url.starts_with("chrome://")
}
