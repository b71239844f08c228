use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::{Page, PopupQueue, js_string};
use crate::config::BrowserSettings;
use crate::error::BrowserError;
use crate::types::Locator;

type TabList = Arc<Mutex<Vec<Arc<Tab>>>>;

/// Persistent Chrome session driving one primary tab.
///
/// New tabs opened by the page (target="_blank" apply links, popups) are
/// picked up by a background watcher and reported through [`PopupQueue`]; the
/// primary tab is then navigated to the captured URL instead of switching.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
    tabs: TabList,
    stop: Arc<AtomicBool>,
}

impl ChromeSession {
    /// Attach to a Chrome already listening on the debug port, otherwise
    /// launch one with the persistent agent profile.
    pub fn launch(
        settings: &BrowserSettings,
        popup_poll_ms: u64,
    ) -> Result<(Self, PopupQueue), BrowserError> {
        let browser = match attach(settings.debug_port) {
            Some(browser) => browser,
            None => launch_new(settings)?,
        };

        let tab = {
            let tabs = lock(browser.get_tabs());
            tabs.first().cloned()
        };
        let tab = match tab {
            Some(tab) => {
                debug!("using existing tab");
                tab
            }
            None => browser.new_tab().map_err(other)?,
        };

        let tabs = browser.get_tabs().clone();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, queue) = PopupQueue::channel();
        spawn_tab_watcher(
            tabs.clone(),
            tab.get_target_id().clone(),
            tx,
            stop.clone(),
            Duration::from_millis(popup_poll_ms.max(50)),
        );

        info!("Chrome ready");
        Ok((
            Self {
                _browser: browser,
                tab,
                tabs,
                stop,
            },
            queue,
        ))
    }

    fn find(&self, locator: &Locator) -> Result<headless_chrome::Element<'_>, BrowserError> {
        if !self.has_match(locator.as_str()) {
            return Err(BrowserError::ElementNotFound(locator.to_string()));
        }
        self.tab
            .find_element(locator.as_str())
            .map_err(|_| BrowserError::ElementNotFound(locator.to_string()))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Page for ChromeSession {
    fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let result = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated());
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let message = err.to_string();
                if message.to_ascii_uppercase().contains("ERR_ABORTED") {
                    Err(BrowserError::NavigationAborted(url.to_string()))
                } else {
                    Err(BrowserError::Navigation(format!("{url}: {message}")))
                }
            }
        }
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn title(&self) -> String {
        self.tab.get_title().unwrap_or_default()
    }

    fn content(&self) -> Result<String, BrowserError> {
        self.tab.get_content().map_err(other)
    }

    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn has_match(&self, css: &str) -> bool {
        let script = format!(
            "(() => {{ try {{ return !!document.querySelector({}); }} catch (e) {{ return false; }} }})()",
            js_string(css)
        );
        matches!(self.evaluate(&script), Ok(Value::Bool(true)))
    }

    fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let element = self.find(locator)?;
        element.click().map_err(other)?;
        Ok(())
    }

    fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let element = self.find(locator)?;
        element.click().map_err(other)?;
        self.tab.type_str(text).map_err(other)?;
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        self.tab.press_key(key).map_err(other)?;
        Ok(())
    }

    fn set_input_files(&self, locator: &Locator, path: &str) -> Result<(), BrowserError> {
        let element = self.find(locator)?;
        element.set_input_files(&[path]).map_err(other)?;
        Ok(())
    }

    fn close_extra_tabs(&self) {
        let primary = self.tab.get_target_id().clone();
        let extras: Vec<Arc<Tab>> = lock(&self.tabs)
            .iter()
            .filter(|t| *t.get_target_id() != primary)
            .cloned()
            .collect();
        for tab in extras {
            if let Err(err) = tab.close(false) {
                debug!(error = %err, "failed to close extra tab");
            }
        }
    }
}

/// Poll the browser's tab list and report URLs of tabs opened after startup.
fn spawn_tab_watcher(
    tabs: TabList,
    primary: String,
    tx: Sender<String>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) {
    std::thread::spawn(move || {
        let mut reported: HashSet<String> = HashSet::new();
        reported.insert(primary.clone());
        for tab in lock(&tabs).iter() {
            reported.insert(tab.get_target_id().clone());
        }

        while !stop.load(Ordering::Relaxed) {
            let fresh: Vec<Arc<Tab>> = lock(&tabs)
                .iter()
                .filter(|t| !reported.contains(t.get_target_id()))
                .cloned()
                .collect();
            for tab in fresh {
                let url = tab.get_url();
                // A popup starts on about:blank; report it once it has a real URL.
                if url.is_empty() || url == "about:blank" {
                    continue;
                }
                reported.insert(tab.get_target_id().clone());
                debug!(%url, "captured new tab");
                if tx.send(url).is_err() {
                    return;
                }
            }
            std::thread::sleep(poll);
        }
    });
}

fn attach(port: u16) -> Option<Browser> {
    info!(port, "attempting to attach to existing Chrome");
    let version: Value = reqwest::blocking::Client::new()
        .get(format!("http://127.0.0.1:{port}/json/version"))
        .timeout(Duration::from_secs(2))
        .send()
        .ok()?
        .json()
        .ok()?;
    let ws_url = version["webSocketDebuggerUrl"].as_str()?.to_string();
    match Browser::connect(ws_url) {
        Ok(browser) => {
            info!("attached to existing Chrome");
            Some(browser)
        }
        Err(err) => {
            warn!(error = %err, "could not attach to Chrome");
            None
        }
    }
}

fn launch_new(settings: &BrowserSettings) -> Result<Browser, BrowserError> {
    let profile_dir = settings.profile_dir();
    if !profile_dir.exists() {
        info!(path = %profile_dir.display(), "creating agent profile");
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| BrowserError::Launch(format!("{}: {e}", profile_dir.display())))?;
    }

    let options = LaunchOptions {
        headless: settings.headless,
        path: settings.chrome_path.clone().or_else(find_chrome),
        user_data_dir: Some(profile_dir),
        args: vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--password-store=basic"),
        ],
        idle_browser_timeout: Duration::from_secs(settings.idle_timeout_secs),
        ..Default::default()
    };

    info!(headless = settings.headless, "launching Chrome");
    Browser::new(options).map_err(|e| BrowserError::Launch(e.to_string()))
}

fn find_chrome() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join(r"Google\Chrome\Application\chrome.exe"));
    }
    candidates.into_iter().find(|p| p.exists())
}

fn lock(tabs: &TabList) -> MutexGuard<'_, Vec<Arc<Tab>>> {
    tabs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn other(err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Other(err.to_string())
}
