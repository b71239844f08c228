//! AI form analysis: the fallback plan source for pages no site handler
//! recognises.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::AnalyzerSettings;
use crate::dom;
use crate::error::{AnalyzerError, PlanError};
use crate::types::{Action, ActionPlan, Element, Profile, Snapshot};

/// Placeholder the model uses for the applicant's resume in upload actions.
pub const RESUME_PLACEHOLDER: &str = "resume";

pub const SYSTEM_PROMPT: &str = r#"You fill out job application forms in a real browser.

You receive the page's interactive elements, each addressed by a ref such as @e0, and the applicant profile as JSON. Reply with one JSON action plan that uses those refs.

Page types:
- job_listing: a posting with an Apply button. Click Apply and nothing else.
- form: input fields, dropdowns, uploads. Fill every visible field, then click the button that advances (Next, Continue, Review, Submit).
- confirmation: "thank you", "application submitted". Return no actions.
- unknown: anything else.

Ignore navigation, footer, social, language, cookie and login links, and buttons such as Save, Share, Cancel, Back or Add Another.

Field conventions:
- Names, email, phone, LinkedIn, GitHub and portfolio come from the profile.
- City and state come from the profile's location ("City, State").
- Work authorization: Yes. Visa sponsorship: No. How did you hear: Job Board.
- EEO questions (gender, race, veteran, disability): decline to self-identify.
- Tick agreement and acknowledgement checkboxes.

Output ONLY this JSON, no prose:
{"page_type": "form", "reasoning": "short explanation", "actions": [
  {"action": "fill", "ref": "@e0", "value": "Ada"},
  {"action": "select", "ref": "@e1", "value": "exact option text"},
  {"action": "upload", "ref": "@e2", "file": "resume"},
  {"action": "click", "ref": "@e3"}
]}

Rules:
1. Only use refs from the element list.
2. fill targets text inputs and textareas, select targets dropdowns, upload targets file inputs.
3. For uploads always use "resume" as the file.
4. Unless the page is a confirmation, the last action MUST click the single button that advances the application."#;

/// One form-analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub system: String,
    pub elements_text: String,
    pub profile_json: String,
}

impl AnalysisRequest {
    pub fn new(snapshot: &Snapshot, profile: &Profile) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            elements_text: dom::format_for_model(snapshot),
            profile_json: profile.to_json(),
        }
    }

    pub fn user_prompt(&self) -> String {
        format!(
            "## CURRENT PAGE ELEMENTS\n{}\n\n## APPLICANT PROFILE\n{}\n\n## INSTRUCTIONS\n\
             Return the JSON action plan for this page.",
            self.elements_text, self.profile_json
        )
    }
}

/// External form-analysis capability. Returns the raw model text.
#[cfg_attr(test, mockall::automock)]
pub trait FormAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: String,
    settings: AnalyzerSettings,
}

impl OpenAiAnalyzer {
    /// Reads the API key from the environment variable named in the settings.
    pub fn from_env(settings: &AnalyzerSettings) -> Result<Self, AnalyzerError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AnalyzerError::MissingApiKey(settings.api_key_env.clone()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            settings: settings.clone(),
        })
    }
}

impl FormAnalyzer for OpenAiAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.settings.model,
                "max_tokens": self.settings.max_tokens,
                "temperature": self.settings.temperature,
                "messages": [
                    {"role": "system", "content": request.system},
                    {"role": "user", "content": request.user_prompt()},
                ],
            }))
            .send()?;

        let status = response.status();
        let body: Value = response.json()?;
        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(AnalyzerError::EmptyResponse)?;
        debug!(%content, "model response");
        Ok(content.to_string())
    }
}

/// Strip a Markdown code fence (with or without a language tag).
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let body = match after.find("```") {
        Some(end) => &after[..end],
        None => after,
    };
    body.trim()
}

/// Parse and validate a model response against the snapshot it was made for.
///
/// Any unknown ref or action/element mismatch rejects the whole plan. Upload
/// actions naming the resume placeholder get the real path, or are dropped
/// when no resume is configured.
pub fn parse_plan(
    raw: &str,
    snapshot: &Snapshot,
    resume: Option<&Path>,
) -> Result<ActionPlan, PlanError> {
    let mut plan: ActionPlan = serde_json::from_str(strip_fences(raw))?;

    for (index, action) in plan.actions.iter().enumerate() {
        let Some(reference) = action.reference() else {
            continue;
        };
        let Some(element) = snapshot.element(reference) else {
            return Err(PlanError::InvalidRef {
                index,
                reference: reference.to_string(),
            });
        };
        if !compatible(action, element) {
            return Err(PlanError::IncompatibleAction {
                index,
                action: action.name(),
                tag: element.tag.clone(),
            });
        }
    }

    plan.actions.retain_mut(|action| match action {
        Action::Upload { file, .. } if file.as_str() == RESUME_PLACEHOLDER => match resume {
            Some(path) => {
                *file = path.to_string_lossy().into_owned();
                true
            }
            None => {
                warn!("dropping resume upload: no resume configured");
                false
            }
        },
        _ => true,
    });
    plan.needs_more_pages = plan.page_type != crate::types::PageKind::Confirmation;

    info!(
        page_type = ?plan.page_type,
        actions = plan.actions.len(),
        reasoning = %plan.reasoning,
        "model plan accepted"
    );
    Ok(plan)
}

fn compatible(action: &Action, el: &Element) -> bool {
    match action {
        Action::Fill { .. } => {
            matches!(el.tag.as_str(), "input" | "textarea")
                || el.role.as_deref() == Some("textbox")
                || el.is_combobox()
        }
        Action::Select { .. } => el.is_select() || el.is_combobox(),
        Action::Upload { .. } => el.is_file_input(),
        Action::Click { .. } | Action::Wait { .. } => true,
    }
}

/// Ask the analyzer for a plan; every failure is logged and becomes `None`.
pub fn analyze_form(
    analyzer: &dyn FormAnalyzer,
    snapshot: &Snapshot,
    profile: &Profile,
    resume: Option<&Path>,
) -> Option<ActionPlan> {
    info!(elements = snapshot.element_count, "analyzing form with model");
    let request = AnalysisRequest::new(snapshot, profile);
    let raw = match analyzer.analyze(&request) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "form analysis failed");
            return None;
        }
    };
    match parse_plan(&raw, snapshot, resume) {
        Ok(plan) => Some(plan),
        Err(e) => {
            warn!(error = %e, "rejecting model plan");
            None
        }
    }
}
