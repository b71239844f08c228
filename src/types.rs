use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque CSS selector produced by the snapshot service.
///
/// Locators are tagged with the id of the snapshot that minted them, so a
/// locator kept past the next extraction no longer matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// One interactive element inside a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Element {
    #[serde(rename = "ref")]
    pub reference: String,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub role: Option<String>,
    pub label: Option<String>,
    /// Question text of the enclosing fieldset / radiogroup.
    pub group_label: Option<String>,
    pub placeholder: Option<String>,
    pub value: Option<String>,
    pub text: Option<String>,
    pub aria_label: Option<String>,
    pub test_id: Option<String>,
    pub autocomplete: Option<String>,
    pub href: Option<String>,
    pub options: Option<Vec<SelectOption>>,
    pub required: bool,
    pub disabled: bool,
    pub checked: bool,
    pub visible: bool,
}

impl Element {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    pub fn is_text_entry(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                self.kind(),
                "" | "text" | "email" | "tel" | "number" | "url" | "search" | "date"
            ),
            _ => self.role.as_deref() == Some("textbox"),
        }
    }

    pub fn is_select(&self) -> bool {
        self.tag == "select"
    }

    pub fn is_combobox(&self) -> bool {
        self.role.as_deref() == Some("combobox") || self.kind() == "combobox"
    }

    pub fn is_file_input(&self) -> bool {
        self.tag == "input" && self.kind() == "file"
    }

    pub fn is_clickable(&self) -> bool {
        matches!(self.tag.as_str(), "button" | "a")
            || matches!(self.kind(), "submit" | "button")
            || matches!(self.role.as_deref(), Some("button") | Some("link"))
    }

    /// Best human-readable name: label, then button text, then short inner text.
    pub fn display_text(&self) -> Option<&str> {
        if let Some(label) = non_empty(&self.label) {
            return Some(label);
        }
        if self.is_clickable() {
            if let Some(text) = non_empty(&self.text) {
                return Some(text);
            }
            if let Some(aria) = non_empty(&self.aria_label) {
                return Some(aria);
            }
        }
        non_empty(&self.text).filter(|t| t.chars().count() < 50)
    }

    /// Text used to ask the answer resolver about this field.
    pub fn question(&self) -> Option<&str> {
        non_empty(&self.label)
            .or_else(|| non_empty(&self.aria_label))
            .or_else(|| non_empty(&self.placeholder))
            .or_else(|| non_empty(&self.name))
    }

    /// Lowercased concatenation of every textual attribute, for keyword matching.
    pub fn haystack(&self) -> String {
        [
            &self.text,
            &self.label,
            &self.aria_label,
            &self.value,
            &self.test_id,
            &self.name,
            &self.id,
        ]
        .iter()
        .filter_map(|s| s.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// One atomic extraction of a page's interactive elements.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub element_count: usize,
    pub elements: Vec<Element>,
    /// Visible body text captured in the same round trip, used for hashing and
    /// page-state cues.
    pub text: String,
    pub(crate) ref_to_locator: HashMap<String, Locator>,
}

impl Snapshot {
    pub fn new(
        id: u64,
        url: String,
        title: String,
        elements: Vec<Element>,
        text: String,
        ref_to_locator: HashMap<String, Locator>,
    ) -> Self {
        Self {
            id,
            url,
            title,
            element_count: elements.len(),
            elements,
            text,
            ref_to_locator,
        }
    }

    /// Resolve a ref minted by this snapshot. Unknown refs yield `None`.
    pub fn locator(&self, reference: &str) -> Option<&Locator> {
        self.ref_to_locator.get(reference)
    }

    pub fn element(&self, reference: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.reference == reference)
    }

    pub fn contains_ref(&self, reference: &str) -> bool {
        self.ref_to_locator.contains_key(reference)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| !e.disabled)
    }

    pub fn text_lower(&self) -> String {
        self.text.to_lowercase()
    }
}

/// A single typed action against a ref of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Fill {
        #[serde(rename = "ref")]
        reference: String,
        value: String,
    },
    Select {
        #[serde(rename = "ref")]
        reference: String,
        value: String,
    },
    Click {
        #[serde(rename = "ref")]
        reference: String,
    },
    Upload {
        #[serde(rename = "ref")]
        reference: String,
        file: String,
    },
    Wait {
        #[serde(default = "default_wait_ms")]
        ms: u64,
    },
}

fn default_wait_ms() -> u64 {
    1000
}

impl Action {
    pub fn fill(reference: impl Into<String>, value: impl Into<String>) -> Self {
        Action::Fill {
            reference: reference.into(),
            value: value.into(),
        }
    }

    pub fn select(reference: impl Into<String>, value: impl Into<String>) -> Self {
        Action::Select {
            reference: reference.into(),
            value: value.into(),
        }
    }

    pub fn click(reference: impl Into<String>) -> Self {
        Action::Click {
            reference: reference.into(),
        }
    }

    pub fn upload(reference: impl Into<String>, file: impl Into<String>) -> Self {
        Action::Upload {
            reference: reference.into(),
            file: file.into(),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Action::Fill { reference, .. }
            | Action::Select { reference, .. }
            | Action::Click { reference }
            | Action::Upload { reference, .. } => Some(reference),
            Action::Wait { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Fill { .. } => "fill",
            Action::Select { .. } => "select",
            Action::Click { .. } => "click",
            Action::Upload { .. } => "upload",
            Action::Wait { .. } => "wait",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    JobListing,
    Form,
    Confirmation,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Ordered action plan for one snapshot. Consumed once by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(default)]
    pub page_type: PageKind,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub needs_more_pages: bool,
}

impl ActionPlan {
    pub fn new(page_type: PageKind, reasoning: impl Into<String>, actions: Vec<Action>) -> Self {
        let needs_more_pages = page_type != PageKind::Confirmation;
        Self {
            page_type,
            reasoning: reasoning.into(),
            actions,
            needs_more_pages,
        }
    }

    pub fn fills_anything(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, Action::Fill { .. } | Action::Select { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Success,
    Failed,
    NoApplyButton,
    MaxPagesReached,
    Stuck,
    Error,
    NeedsLogin,
    Skipped,
}

/// The only externally observable outcome of one application attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub status: ApplicationStatus,
    pub message: String,
    pub pages_processed: u32,
    pub url: String,
}

impl ApplicationResult {
    pub fn new(
        status: ApplicationStatus,
        message: impl Into<String>,
        pages_processed: u32,
        url: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            pages_processed,
            url: url.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ApplicationStatus::Success
    }
}

/// Flat key/value applicant profile, passed through unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(BTreeMap<String, String>);

impl Profile {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn full_name(&self) -> Option<String> {
        if let Some(name) = self.get("full_name").or_else(|| self.get("name")) {
            return Some(name.to_string());
        }
        let joined = [self.get("first_name"), self.get("last_name")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Profile {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Applicant inputs shared by every plan source.
#[derive(Debug, Clone, Default)]
pub struct Applicant {
    pub profile: Profile,
    pub resume: Option<PathBuf>,
}

impl Applicant {
    pub fn resume_path(&self) -> Option<&Path> {
        self.resume.as_deref()
    }
}

/// Typed progress emitted by the orchestrator onto its event channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { url: String },
    Classified { kind: String },
    PageStarted { number: u32, url: String, elements: usize },
    PlanReady { source: String, actions: usize, reasoning: String },
    ActionFailed { action: String, message: String },
    Advanced { url: String },
    PopupFollowed { url: String },
    Finished { result: ApplicationResult },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_plan_parses_model_json() {
        let raw = r#"{
            "page_type": "form",
            "reasoning": "fill then submit",
            "actions": [
                {"action": "fill", "ref": "@e0", "value": "John"},
                {"action": "select", "ref": "@e1", "value": "Yes"},
                {"action": "upload", "ref": "@e2", "file": "resume"},
                {"action": "wait"},
                {"action": "click", "ref": "@e3"}
            ]
        }"#;
        let plan: ActionPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.page_type, PageKind::Form);
        assert_eq!(plan.actions.len(), 5);
        assert_eq!(plan.actions[0], Action::fill("@e0", "John"));
        assert_eq!(plan.actions[3], Action::Wait { ms: 1000 });
        assert!(!plan.needs_more_pages);
    }

    #[test]
    fn unknown_page_type_falls_back() {
        let plan: ActionPlan =
            serde_json::from_str(r#"{"page_type":"captcha","reasoning":"","actions":[]}"#).unwrap();
        assert_eq!(plan.page_type, PageKind::Unknown);
    }

    #[test]
    fn display_text_prefers_label() {
        let el = Element {
            tag: "button".into(),
            label: Some("Submit application".into()),
            text: Some("Submit".into()),
            ..Default::default()
        };
        assert_eq!(el.display_text(), Some("Submit application"));

        let el = Element {
            tag: "div".into(),
            text: Some("x".repeat(80)),
            ..Default::default()
        };
        assert_eq!(el.display_text(), None);
    }

    #[test]
    fn profile_full_name_joins_parts() {
        let profile: Profile = [("first_name", "Ada"), ("last_name", "Lovelace")]
            .into_iter()
            .collect();
        assert_eq!(profile.full_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(Profile::default().full_name(), None);
    }
}
