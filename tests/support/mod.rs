//! Scripted in-memory browser for driving the navigator end to end.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use autoapply::browser::{HitTarget, Page};
use autoapply::dom::SNAPSHOT_SCRIPT_TAG;
use autoapply::error::BrowserError;
use autoapply::types::Locator;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One rendered page: what extraction sees plus where clicks lead.
pub struct Screen {
    pub url: String,
    pub text: String,
    pub html: String,
    pub elements: Value,
    links: Vec<(String, String)>,
}

impl Screen {
    pub fn new(url: &str, text: &str, elements: Value) -> Self {
        Self {
            url: url.to_string(),
            text: text.to_string(),
            html: format!("<html><body>{text}</body></html>"),
            elements,
            links: Vec::new(),
        }
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    /// Clicking `reference` shows the screen at `url`.
    pub fn link(mut self, reference: &str, url: &str) -> Self {
        self.links.push((reference.to_string(), url.to_string()));
        self
    }
}

pub struct ScriptedPage {
    screens: Vec<Screen>,
    current: Cell<usize>,
    calls: RefCell<Vec<String>>,
    snapshots: Cell<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedPage {
    pub fn new(screens: Vec<Screen>) -> Self {
        Self {
            screens,
            current: Cell::new(0),
            calls: RefCell::new(Vec::new()),
            snapshots: Cell::new(0),
            cancel_after: None,
        }
    }

    /// Cancel `token` once `n` snapshots have been taken.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn fills(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("fill ") || c.starts_with("select ") || c.starts_with("upload "))
            .collect()
    }

    fn screen(&self) -> &Screen {
        &self.screens[self.current.get()]
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn snapshot_json(&self) -> Value {
        let taken = self.snapshots.get() + 1;
        self.snapshots.set(taken);
        if let Some((n, token)) = &self.cancel_after {
            if taken >= *n {
                token.cancel();
            }
        }
        let screen = self.screen();
        json!({
            "url": screen.url,
            "title": "",
            "text": screen.text,
            "elements": screen.elements,
        })
    }

    fn follow(&self, reference: &str) {
        let target = self
            .screen()
            .links
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, url)| url.clone());
        if let Some(url) = target {
            if let Some(index) = self.screens.iter().position(|s| s.url == url) {
                self.current.set(index);
            }
        }
    }
}

/// `[data-ap-ref="12:e3"]` -> `@e3`.
pub fn reference_of(locator: &Locator) -> String {
    let raw = locator.as_str();
    let tail = raw.rsplit(':').next().unwrap_or_default();
    format!("@{}", tail.trim_end_matches("\"]"))
}

impl Page for ScriptedPage {
    fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.log(format!("navigate {url}"));
        match self.screens.iter().position(|s| s.url == url) {
            Some(index) => {
                self.current.set(index);
                Ok(())
            }
            None => Err(BrowserError::Navigation(url.to_string())),
        }
    }

    fn current_url(&self) -> String {
        self.screen().url.clone()
    }

    fn title(&self) -> String {
        String::new()
    }

    fn content(&self) -> Result<String, BrowserError> {
        Ok(self.screen().html.clone())
    }

    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        if script.starts_with(SNAPSHOT_SCRIPT_TAG) {
            return Ok(self.snapshot_json());
        }
        Ok(Value::Bool(true))
    }

    fn has_match(&self, _css: &str) -> bool {
        false
    }

    fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let reference = reference_of(locator);
        self.log(format!("click {reference}"));
        self.follow(&reference);
        Ok(())
    }

    fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        self.log(format!("type {} {text}", reference_of(locator)));
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        self.log(format!("key {key}"));
        Ok(())
    }

    fn set_input_files(&self, locator: &Locator, path: &str) -> Result<(), BrowserError> {
        self.log(format!("upload {} {path}", reference_of(locator)));
        Ok(())
    }

    fn close_extra_tabs(&self) {}

    fn wait(&self, _ms: u64) {}

    fn hit_test(&self, _locator: &Locator) -> HitTarget {
        HitTarget::Top
    }

    fn force_click(&self, locator: &Locator) -> Result<(), BrowserError> {
        self.click(locator)
    }

    fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        self.log(format!("fill {} {value}", reference_of(locator)));
        Ok(())
    }

    fn select_option(&self, locator: &Locator, label: &str) -> Result<(), BrowserError> {
        self.log(format!("select {} {label}", reference_of(locator)));
        Ok(())
    }

    fn dismiss_overlays(&self) {}
}
