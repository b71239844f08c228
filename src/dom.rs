use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::browser::Page;
use crate::error::BrowserError;
use crate::types::{Element, Locator, Snapshot};

/// Marker comment at the top of the extraction script.
pub const SNAPSHOT_SCRIPT_TAG: &str = "/* autoapply:snapshot */";

/// Attribute stamped on every extracted element.
pub const REF_ATTRIBUTE: &str = "data-ap-ref";

const MAX_TEXT_CHARS: usize = 20_000;

/// JavaScript run once per extraction.
///
/// The script:
///   1. Walks every interactive element (native controls, ARIA widgets,
///      contenteditable) in document order.
///   2. Skips invisible elements, except native file/radio/checkbox inputs,
///      which are usually hidden behind a styled label.
///   3. Stamps `data-ap-ref="<snapshot>:eN"` so the locator only matches
///      for this snapshot.
///   4. Resolves the best label (for=, wrapping label, aria-labelledby,
///      aria-label) and the enclosing question for radio/checkbox groups.
const SNAPSHOT_JS: &str = r#"/* autoapply:snapshot */
(() => {
  const SID = '__SID__';
  const QUERY = 'a[href], button, input, textarea, select, [role="button"], [role="link"], ' +
    '[role="combobox"], [role="checkbox"], [role="radio"], [role="textbox"], [contenteditable="true"]';
  const clean = s => (s || '').replace(/\s+/g, ' ').trim();
  const isVisible = el => {
    const s = getComputedStyle(el);
    const r = el.getBoundingClientRect();
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0' && r.width > 0 && r.height > 0;
  };
  const labelOf = el => {
    if (el.labels && el.labels.length) return clean(el.labels[0].innerText);
    const by = el.getAttribute('aria-labelledby');
    if (by) {
      const t = by.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean).map(n => n.innerText).join(' ');
      if (clean(t)) return clean(t);
    }
    const wrap = el.closest('label');
    if (wrap) return clean(wrap.innerText);
    return null;
  };
  const groupOf = el => {
    const group = el.closest('fieldset, [role="radiogroup"], [role="group"]');
    if (!group) return null;
    const legend = group.querySelector('legend');
    if (legend) return clean(legend.innerText);
    const by = group.getAttribute('aria-labelledby');
    if (by && document.getElementById(by)) return clean(document.getElementById(by).innerText);
    return clean(group.getAttribute('aria-label')) || null;
  };
  document.querySelectorAll('[data-ap-ref]').forEach(el => el.removeAttribute('data-ap-ref'));
  const elements = [];
  const seen = new Set();
  let n = 0;
  for (const el of document.querySelectorAll(QUERY)) {
    if (seen.has(el)) continue;
    seen.add(el);
    const tag = el.tagName.toLowerCase();
    const type = tag === 'input' ? (el.type || 'text').toLowerCase() : (el.getAttribute('type') || null);
    if (tag === 'input' && type === 'hidden') continue;
    const visible = isVisible(el);
    const nativeHidden = tag === 'input' && ['file', 'radio', 'checkbox'].includes(type);
    if (!visible && !nativeHidden) continue;
    const ref = '@e' + (n++);
    el.setAttribute('data-ap-ref', SID + ':' + ref.slice(1));
    const text = clean(el.innerText || el.textContent).slice(0, 100);
    elements.push({
      ref, tag, type,
      name: el.getAttribute('name'),
      id: el.id || null,
      role: el.getAttribute('role'),
      label: labelOf(el),
      groupLabel: (type === 'radio' || type === 'checkbox' || el.getAttribute('role') === 'radio') ? groupOf(el) : null,
      placeholder: el.getAttribute('placeholder'),
      value: (tag === 'input' || tag === 'textarea' || tag === 'select') ? (el.value || null) : el.getAttribute('value'),
      text: text || null,
      ariaLabel: el.getAttribute('aria-label'),
      testId: el.getAttribute('data-testid') || el.getAttribute('data-automation-id') ||
        el.getAttribute('data-test') || el.getAttribute('data-ph-at-id'),
      autocomplete: el.getAttribute('autocomplete'),
      href: tag === 'a' ? el.getAttribute('href') : null,
      options: tag === 'select' ? [...el.options].map(o => ({ value: o.value, text: clean(o.text) })) : null,
      required: !!el.required || el.getAttribute('aria-required') === 'true',
      disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
      checked: !!el.checked || el.getAttribute('aria-checked') === 'true',
      visible,
    });
  }
  return {
    url: location.href,
    title: document.title,
    text: (document.body ? document.body.innerText : '').slice(0, __MAX_TEXT__),
    elements,
  };
})()
"#;

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    elements: Vec<Element>,
}

/// Extract a fresh snapshot of the page in one script round trip.
pub fn extract<P: Page + ?Sized>(page: &P) -> Result<Snapshot, BrowserError> {
    let id = NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed);
    let script = SNAPSHOT_JS
        .replace("__SID__", &id.to_string())
        .replace("__MAX_TEXT__", &MAX_TEXT_CHARS.to_string());
    let raw = page.evaluate(&script)?;
    let snapshot = parse_snapshot(id, raw)?;
    info!(
        snapshot = snapshot.id,
        elements = snapshot.element_count,
        "extracted interactive elements"
    );
    Ok(snapshot)
}

/// Build a snapshot from the extraction script's JSON result.
pub fn parse_snapshot(id: u64, raw: Value) -> Result<Snapshot, BrowserError> {
    let raw: RawSnapshot = serde_json::from_value(raw)
        .map_err(|e| BrowserError::Script(format!("bad snapshot payload: {e}")))?;

    let ref_to_locator: HashMap<String, Locator> = raw
        .elements
        .iter()
        .map(|el| (el.reference.clone(), locator_for(id, &el.reference)))
        .collect();

    Ok(Snapshot::new(
        id,
        raw.url,
        raw.title,
        raw.elements,
        raw.text,
        ref_to_locator,
    ))
}

/// Locator for `reference` as stamped by snapshot `id`.
pub fn locator_for(id: u64, reference: &str) -> Locator {
    let index = reference.trim_start_matches('@');
    Locator::new(format!("[{REF_ATTRIBUTE}=\"{id}:{index}\"]"))
}

/// Serialize a snapshot into the line format the form analyzer consumes.
pub fn format_for_model(snapshot: &Snapshot) -> String {
    let mut lines = vec![
        format!("Page: {}", snapshot.title),
        format!("URL: {}", snapshot.url),
        String::new(),
        "Interactive Elements:".to_string(),
    ];

    for el in snapshot.enabled() {
        let mut parts = vec![el.reference.clone()];

        match el.kind.as_deref() {
            Some(kind) => parts.push(format!("[{}:{}]", el.tag, kind)),
            None => parts.push(format!("[{}]", el.tag)),
        }
        if let Some(text) = el.display_text() {
            parts.push(quote(text));
        }
        if let Some(question) = el.group_label.as_deref().filter(|q| !q.is_empty()) {
            parts.push(format!("question={}", quote(question)));
        }
        if let Some(placeholder) = el.placeholder.as_deref().filter(|p| !p.is_empty()) {
            parts.push(format!("placeholder={}", quote(placeholder)));
        }
        if el.required {
            parts.push("required".to_string());
        }
        if let Some(options) = el.options.as_ref().filter(|o| !o.is_empty()) {
            let mut texts: Vec<String> = options
                .iter()
                .take(5)
                .map(|o| quote(&o.text))
                .collect();
            if options.len() > 5 {
                texts.push("\"...\"".to_string());
            }
            parts.push(format!("options=[{}]", texts.join(", ")));
        }
        if let Some(value) = el.value.as_deref().filter(|v| !v.is_empty()) {
            if el.tag != "button" && el.tag != "a" {
                parts.push(format!("value={}", quote(&truncate(value, 30))));
            }
        }
        if let Some(href) = el.href.as_deref().filter(|h| !h.is_empty()) {
            parts.push(format!("href={}", quote(&truncate(href, 50))));
        }

        lines.push(parts.join(" "));
    }

    lines.join("\n")
}

/// Double-quoted with inner quotes, backslashes and newlines escaped.
fn quote(s: &str) -> String {
    format!("{s:?}")
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

const APPLY_KEYWORDS: &[&str] = &["apply", "easy apply", "apply now", "submit application"];
const NEXT_KEYWORDS: &[&str] = &[
    "next",
    "continue",
    "submit",
    "review",
    "proceed",
    "save & continue",
];
const RESUME_KEYWORDS: &[&str] = &["resume", "cv", "curriculum"];

fn button_text(el: &Element) -> String {
    [&el.text, &el.label, &el.aria_label, &el.value]
        .iter()
        .filter_map(|s| s.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Elements that look like an Apply entry button.
pub fn find_apply_buttons(snapshot: &Snapshot) -> Vec<&Element> {
    snapshot
        .enabled()
        .filter(|el| el.is_clickable() || el.tag == "input")
        .filter(|el| {
            let text = button_text(el);
            APPLY_KEYWORDS.iter().any(|kw| text.contains(kw))
        })
        .collect()
}

/// Elements that look like Next/Continue/Submit buttons, in page order.
pub fn find_next_buttons(snapshot: &Snapshot) -> Vec<&Element> {
    snapshot
        .enabled()
        .filter(|el| el.visible)
        .filter(|el| {
            el.tag == "button"
                || matches!(el.kind(), "submit" | "button")
                || el.role.as_deref() == Some("button")
        })
        .filter(|el| {
            let text = button_text(el);
            NEXT_KEYWORDS.iter().any(|kw| text.contains(kw))
                || (el.kind() == "submit" && text.trim().is_empty())
        })
        .collect()
}

pub fn find_file_inputs(snapshot: &Snapshot) -> Vec<&Element> {
    snapshot.enabled().filter(|el| el.is_file_input()).collect()
}

/// The resume/CV file input, or the first file input when none is labeled.
pub fn find_resume_upload(snapshot: &Snapshot) -> Option<&Element> {
    let inputs = find_file_inputs(snapshot);
    let labeled = inputs.iter().copied().find(|el| {
        let combined = [&el.label, &el.name, &el.id, &el.test_id]
            .iter()
            .filter_map(|s| s.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        RESUME_KEYWORDS.iter().any(|kw| combined.contains(kw))
    });
    if labeled.is_some() {
        return labeled;
    }
    // A lone "cover letter" input is not a resume slot.
    let first = inputs
        .first()
        .copied()
        .filter(|el| !el.haystack().contains("cover"));
    if let Some(el) = first {
        debug!(reference = %el.reference, "using unlabeled file input for resume");
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Snapshot {
        parse_snapshot(
            42,
            json!({
                "url": "https://boards.greenhouse.io/acme/jobs/1",
                "title": "Apply - Acme",
                "text": "Apply for Software Engineer",
                "elements": [
                    {"ref": "@e0", "tag": "input", "type": "text", "name": "first_name",
                     "label": "First Name", "required": true, "visible": true},
                    {"ref": "@e1", "tag": "select", "label": "Country", "visible": true,
                     "options": [
                        {"value": "", "text": "Select"}, {"value": "us", "text": "United States"},
                        {"value": "ca", "text": "Canada"}, {"value": "mx", "text": "Mexico"},
                        {"value": "uk", "text": "United Kingdom"}, {"value": "de", "text": "Germany"}
                     ]},
                    {"ref": "@e2", "tag": "input", "type": "file", "name": "cover_letter", "visible": false},
                    {"ref": "@e3", "tag": "input", "type": "file", "name": "resume", "visible": false},
                    {"ref": "@e4", "tag": "button", "type": "submit", "text": "Submit Application", "visible": true},
                    {"ref": "@e5", "tag": "button", "text": "Old", "disabled": true, "visible": true},
                    {"ref": "@e6", "tag": "input", "type": "email", "label": "Email",
                     "value": "someone.with.a.very.long.address@example.com", "visible": true}
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn refs_resolve_to_snapshot_tagged_locators() {
        let snapshot = sample();
        assert_eq!(snapshot.element_count, 7);
        assert_eq!(
            snapshot.locator("@e4").map(Locator::as_str),
            Some("[data-ap-ref=\"42:e4\"]")
        );
        assert!(snapshot.locator("@e99").is_none());
    }

    #[test]
    fn disabled_elements_are_kept_but_flagged() {
        let snapshot = sample();
        let old = snapshot.element("@e5").unwrap();
        assert!(old.disabled);
        assert_eq!(snapshot.enabled().count(), 6);
    }

    #[test]
    fn model_format_lists_enabled_elements() {
        let text = format_for_model(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Page: Apply - Acme");
        assert_eq!(lines[1], "URL: https://boards.greenhouse.io/acme/jobs/1");
        assert_eq!(lines[3], "Interactive Elements:");
        assert_eq!(lines[4], "@e0 [input:text] \"First Name\" required");
        assert_eq!(
            lines[5],
            "@e1 [select] \"Country\" options=[\"Select\", \"United States\", \"Canada\", \"Mexico\", \"United Kingdom\", \"...\"]"
        );
        assert!(!text.contains("@e5"));
        assert!(text.contains("value=\"someone.with.a.very.long.addre\""));
    }

    #[test]
    fn model_format_escapes_embedded_quotes() {
        let snapshot = parse_snapshot(
            7,
            json!({
                "url": "https://acme.example/apply",
                "title": "Apply",
                "text": "",
                "elements": [
                    {"ref": "@e0", "tag": "input", "type": "text",
                     "label": "Nickname (e.g. \"Ada\")", "placeholder": "say \"hi\"", "visible": true},
                    {"ref": "@e1", "tag": "select", "label": "Size", "visible": true,
                     "options": [{"value": "s", "text": "12\" screen"}]}
                ]
            }),
        )
        .unwrap();
        let text = format_for_model(&snapshot);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[4],
            r#"@e0 [input:text] "Nickname (e.g. \"Ada\")" placeholder="say \"hi\"""#
        );
        assert_eq!(lines[5], r#"@e1 [select] "Size" options=["12\" screen"]"#);
    }

    #[test]
    fn finders_pick_navigation_and_resume_inputs() {
        let snapshot = sample();
        let next: Vec<&str> = find_next_buttons(&snapshot)
            .iter()
            .map(|e| e.reference.as_str())
            .collect();
        assert_eq!(next, vec!["@e4"]);
        assert_eq!(find_file_inputs(&snapshot).len(), 2);
        assert_eq!(find_resume_upload(&snapshot).unwrap().reference, "@e3");
        assert_eq!(find_apply_buttons(&snapshot)[0].reference, "@e4");
    }

    #[test]
    fn lone_cover_letter_input_is_not_a_resume_slot() {
        let snapshot = parse_snapshot(
            1,
            json!({"url": "u", "title": "t", "text": "", "elements": [
                {"ref": "@e0", "tag": "input", "type": "file", "name": "cover_letter"}
            ]}),
        )
        .unwrap();
        assert!(find_resume_upload(&snapshot).is_none());
    }

    #[test]
    fn malformed_payload_is_a_script_error() {
        let err = parse_snapshot(1, json!({"elements": "nope"})).unwrap_err();
        assert!(matches!(err, BrowserError::Script(_)));
    }
}
