//! Application-submitted detection.

use tracing::info;

use crate::types::Snapshot;

const SUCCESS_URL_PATTERNS: &[&str] = &[
    "post-apply",
    "postapplyjobid",
    "/confirmation",
    "/thank",
    "/success",
    "/submitted",
    "/complete",
    "/applied",
    "application-submitted",
    "apply/success",
];

const SUCCESS_TEXT_PATTERNS: &[&str] = &[
    "thank you for applying",
    "application submitted",
    "application received",
    "application was sent",
    "your application has been submitted",
    "we have received your application",
    "successfully submitted",
    "thanks for applying",
    "application complete",
    "you have applied",
];

const AUTH_URL_WORDS: &[&str] = &["login", "signin", "register"];

/// Which signal decided the page is a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    Url,
    Text,
    FormDisappeared,
}

impl std::fmt::Display for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CompletionSignal::Url => "url",
            CompletionSignal::Text => "text",
            CompletionSignal::FormDisappeared => "form_disappeared",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub signal: CompletionSignal,
    pub details: String,
}

/// Per-attempt detector; the form-disappeared signal only counts after a
/// form was filled in this attempt.
#[derive(Debug, Default)]
pub struct CompletionDetector {
    forms_filled: bool,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_form_filled(&mut self) {
        self.forms_filled = true;
    }

    pub fn forms_filled(&self) -> bool {
        self.forms_filled
    }

    pub fn reset(&mut self) {
        self.forms_filled = false;
    }

    /// Check URL, page text and the remaining form-input count.
    pub fn check(&self, url: &str, text: &str, form_inputs: usize) -> Option<Completion> {
        let url_lower = url.to_lowercase();
        if let Some(pattern) = SUCCESS_URL_PATTERNS.iter().find(|p| url_lower.contains(*p)) {
            info!(%url, pattern, "completion detected by URL");
            return Some(Completion {
                signal: CompletionSignal::Url,
                details: format!("URL matched {pattern}"),
            });
        }

        let text_lower = text.to_lowercase();
        if let Some(pattern) = SUCCESS_TEXT_PATTERNS.iter().find(|p| text_lower.contains(*p)) {
            info!(pattern, "completion detected by text");
            return Some(Completion {
                signal: CompletionSignal::Text,
                details: format!("text matched \"{pattern}\""),
            });
        }

        if self.forms_filled
            && form_inputs <= 2
            && !AUTH_URL_WORDS.iter().any(|w| url_lower.contains(w))
        {
            info!(form_inputs, "completion detected by form disappearance");
            return Some(Completion {
                signal: CompletionSignal::FormDisappeared,
                details: format!("{form_inputs} form inputs remain"),
            });
        }

        None
    }

    pub fn check_snapshot(&self, snapshot: &Snapshot) -> Option<Completion> {
        self.check(&snapshot.url, &snapshot.text, form_input_count(snapshot))
    }
}

/// Visible text inputs, selects and textareas.
pub fn form_input_count(snapshot: &Snapshot) -> usize {
    snapshot
        .elements
        .iter()
        .filter(|el| el.visible && matches!(el.tag.as_str(), "input" | "select" | "textarea"))
        .filter(|el| !matches!(el.kind(), "hidden" | "submit" | "button"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_url_patterns() {
        let detector = CompletionDetector::new();
        let hit = detector
            .check("https://www.indeed.com/viewjob?postApplyJobId=9", "", 10)
            .unwrap();
        assert_eq!(hit.signal, CompletionSignal::Url);
        assert!(detector.check("https://acme.example/careers/thank-you", "", 10).is_some());
        assert!(detector.check("https://acme.example/careers/apply", "", 10).is_none());
    }

    #[test]
    fn success_text_is_case_insensitive() {
        let detector = CompletionDetector::new();
        let hit = detector
            .check("https://acme.example/jobs/1", "Thank You For Applying to Acme!", 10)
            .unwrap();
        assert_eq!(hit.signal, CompletionSignal::Text);
    }

    #[test]
    fn form_disappearance_needs_a_filled_form() {
        let mut detector = CompletionDetector::new();
        assert!(detector.check("https://acme.example/jobs/1", "", 0).is_none());
        detector.mark_form_filled();
        let hit = detector.check("https://acme.example/jobs/1", "", 1).unwrap();
        assert_eq!(hit.signal, CompletionSignal::FormDisappeared);
        assert!(detector.check("https://acme.example/jobs/1", "", 3).is_none());
        assert!(detector.check("https://acme.example/login", "", 0).is_none());
        detector.reset();
        assert!(detector.check("https://acme.example/jobs/1", "", 0).is_none());
    }
}
