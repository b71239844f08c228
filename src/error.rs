//! Error types for the application engine.
//!
//! Element- and action-level errors are absorbed by the executor, plan and
//! analyzer errors become "no plan", and [`FlowError`] is folded into the
//! final [`ApplicationResult`](crate::types::ApplicationResult) by the
//! navigator. Callers of the library only ever see that result.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the browser-control surface.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation aborted: {0}")]
    NavigationAborted(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("{0}")]
    Other(String),
}

impl BrowserError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, BrowserError::NavigationAborted(_))
    }
}

/// Failure of a single action against a snapshot ref.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown ref {0} for the current snapshot")]
    UnknownRef(String),

    #[error("element not found for {0}")]
    ElementNotFound(String),

    #[error("no file input behind {0}")]
    NoFileInput(String),

    #[error("{action} on {reference} failed: {source}")]
    Browser {
        action: &'static str,
        reference: String,
        #[source]
        source: BrowserError,
    },
}

impl ActionError {
    /// Missing-element failures skip one action; everything else stops the plan.
    pub fn is_skippable(&self) -> bool {
        match self {
            ActionError::UnknownRef(_) | ActionError::ElementNotFound(_) => true,
            ActionError::Browser { source, .. } => {
                matches!(source, BrowserError::ElementNotFound(_))
            }
            ActionError::NoFileInput(_) => false,
        }
    }
}

/// Failure to obtain a plan from the AI fallback.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("{0} is not set")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no content in model response")]
    EmptyResponse,
}

/// A model response that cannot be turned into a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("malformed plan JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("action {index} references unknown ref {reference}")]
    InvalidRef { index: usize, reference: String },

    #[error("action {index} ({action}) is not valid for a {tag} element")]
    IncompatibleAction {
        index: usize,
        action: &'static str,
        tag: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("invalid answer pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Orchestrator-level failure taxonomy. Never escapes the navigator.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("navigation aborted: {0}")]
    NavigationAborted(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("action execution failed: {0}")]
    ActionExecutionFailed(String),

    #[error("{0}")]
    SafetyAbort(String),

    #[error("{0}")]
    PlanUnavailable(String),

    #[error("{0}")]
    LoopDetected(String),
}

impl From<BrowserError> for FlowError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NavigationAborted(url) => FlowError::NavigationAborted(url),
            BrowserError::ElementNotFound(sel) => FlowError::ElementNotFound(sel),
            other => FlowError::ActionExecutionFailed(other.to_string()),
        }
    }
}
