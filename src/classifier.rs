//! Page/Site Classifier.
//!
//! [`classify`] is a pure function over the signals of one page; the
//! page-bound [`Classifier`] gathers those signals and clicks the winning
//! entry candidate.

use std::fmt;

use tracing::{debug, info, warn};

use crate::browser::{Page, js_string};
use crate::dom;
use crate::error::BrowserError;
use crate::payment;
use crate::types::{Element, Locator, Snapshot};

const ALREADY_APPLIED_PHRASES: &[&str] = &[
    "already applied",
    "you applied",
    "you have applied",
    "application submitted",
    "previously applied",
    "application on file",
];

const CLOSED_PHRASES: &[&str] = &[
    "no longer accepting",
    "position filled",
    "position has been filled",
    "job has been filled",
    "no longer available",
    "this job is closed",
    "job is no longer",
    "posting has expired",
    "job expired",
    "job closed",
];

const ACCOUNT_CREATION_URL_PATTERNS: &[&str] = &[
    "register",
    "signup",
    "sign-up",
    "sign_up",
    "create-account",
    "create_account",
    "createaccount",
    "join",
    "registration",
    "new-account",
    "new_account",
    "newuser",
    "new-user",
];

const ACCOUNT_CREATION_PHRASES: &[&str] = &[
    "create an account",
    "create your account",
    "create account",
    "sign up for",
    "register for",
    "join now",
    "join for free",
    "create password",
    "confirm password",
    "retype password",
    "already have an account",
    "have an account? sign in",
    "create your profile",
    "set up your account",
];

const NEGATIVE_PHRASES: &[&str] = &["save", "later", "dismiss", "close", "cancel", "not now"];

const EXTERNAL_ARIA_PHRASES: &[&str] = &["on company website", "company site", "external site"];

/// Login page URL fragments per platform.
const LOGIN_URL_PATTERNS: &[(&str, &[&str])] = &[
    (
        "linkedin",
        &["linkedin.com/login", "linkedin.com/checkpoint", "linkedin.com/uas/login"],
    ),
    (
        "indeed",
        &["secure.indeed.com/auth", "indeed.com/account/login", "indeed.com/account/signin"],
    ),
    ("generic", &["/login", "/signin", "/sign-in", "/auth", "/authenticate"]),
];

/// LinkedIn's own Easy Apply buttons, tried in order before generic scoring.
pub const LINKEDIN_EASY_APPLY_SELECTORS: &[&str] = &[
    r#"button[data-control-name="jobdetails_topcard_inapply"]"#,
    "button.jobs-apply-button",
    r#"button[aria-label*="Easy Apply"]"#,
    "button.jobs-apply-button--top-card",
    r#"[data-testid="jobs-apply-button"]"#,
];

/// Score of a button found through a known platform selector.
const DIRECT_SCORE: f32 = 10.0;
const DIRECT_VISIBLE_MS: u64 = 500;

/// Only the first part of the HTML is scanned for status phrases.
const PHRASE_SCAN_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    EasyApply,
    ExternalLink,
    AlreadyApplied,
    Closed,
    LoginRequired,
    PaymentDanger,
    AccountCreation,
    Unknown,
}

impl fmt::Display for PageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageClass::EasyApply => "easy_apply",
            PageClass::ExternalLink => "external",
            PageClass::AlreadyApplied => "already_applied",
            PageClass::Closed => "closed",
            PageClass::LoginRequired => "login_required",
            PageClass::PaymentDanger => "payment_danger",
            PageClass::AccountCreation => "account_creation",
            PageClass::Unknown => "unknown",
        })
    }
}

/// A scored entry-button candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub reference: String,
    /// Raw CSS selector for candidates found outside the snapshot.
    pub selector: Option<Locator>,
    pub tag: String,
    pub role: Option<String>,
    pub text: String,
    pub aria_label: Option<String>,
    pub href: Option<String>,
    pub test_id: Option<String>,
    pub visible: bool,
    pub score: f32,
}

impl Candidate {
    fn from_element(el: &Element) -> Self {
        let mut candidate = Self {
            reference: el.reference.clone(),
            selector: None,
            tag: el.tag.clone(),
            role: el.role.clone(),
            text: el.text.clone().unwrap_or_default(),
            aria_label: el.aria_label.clone().filter(|a| !a.is_empty()),
            href: el.href.clone().filter(|h| !h.is_empty()),
            test_id: el.test_id.clone().filter(|t| !t.is_empty()),
            visible: el.visible,
            score: 0.0,
        };
        candidate.score = score(&candidate);
        candidate
    }

    fn aria_lower(&self) -> String {
        self.aria_label.as_deref().unwrap_or_default().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: PageClass,
    pub candidate: Option<Candidate>,
}

impl Classification {
    fn bare(class: PageClass) -> Self {
        Self {
            class,
            candidate: None,
        }
    }
}

/// Everything [`classify`] looks at.
#[derive(Debug, Clone, Copy)]
pub struct PageSignals<'a> {
    pub url: &'a str,
    pub html: &'a str,
    pub snapshot: &'a Snapshot,
}

/// Classify a page. The first matching check wins.
pub fn classify(signals: &PageSignals<'_>) -> Classification {
    let head: String = signals.html.chars().take(PHRASE_SCAN_CHARS).collect();
    let text = format!("{}\n{}", signals.snapshot.text, head).to_lowercase();

    if contains_any(&text, ALREADY_APPLIED_PHRASES) {
        return Classification::bare(PageClass::AlreadyApplied);
    }
    if contains_any(&text, CLOSED_PHRASES) {
        return Classification::bare(PageClass::Closed);
    }
    if has_password_input(signals.snapshot) {
        return Classification::bare(PageClass::LoginRequired);
    }
    let payment = payment::assess(signals.url, signals.html);
    if payment.should_block {
        warn!(url = signals.url, reason = ?payment.reason, "payment page");
        return Classification::bare(PageClass::PaymentDanger);
    }
    if is_account_creation(signals.url, &text) {
        warn!(url = signals.url, "account creation page");
        return Classification::bare(PageClass::AccountCreation);
    }

    match best_candidate(signals.snapshot) {
        Some(candidate) => Classification {
            class: class_of(&candidate),
            candidate: Some(candidate),
        },
        None => Classification::bare(PageClass::Unknown),
    }
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

fn has_password_input(snapshot: &Snapshot) -> bool {
    snapshot
        .elements
        .iter()
        .any(|el| el.visible && el.tag == "input" && el.kind() == "password")
}

/// Signup URL, or two or more account-creation phrases in the page text.
pub fn is_account_creation(url: &str, text: &str) -> bool {
    let url = url.to_lowercase();
    if contains_any(&url, ACCOUNT_CREATION_URL_PATTERNS) {
        return true;
    }
    let text = text.to_lowercase();
    ACCOUNT_CREATION_PHRASES
        .iter()
        .filter(|p| text.contains(*p))
        .count()
        >= 2
}

/// Platform whose login page `url` is, if any.
pub fn login_platform(url: &str) -> Option<&'static str> {
    let url = url.to_lowercase();
    LOGIN_URL_PATTERNS
        .iter()
        .find(|(_, patterns)| contains_any(&url, patterns))
        .map(|(platform, _)| *platform)
}

/// Weighted score of one candidate.
pub fn score(candidate: &Candidate) -> f32 {
    let mut score = 0.0;
    let text = candidate.text.to_lowercase();
    let aria = candidate.aria_lower();

    score += match (candidate.role.as_deref(), candidate.tag.as_str()) {
        (Some("button"), _) => 1.5,
        (Some("link"), _) => 1.2,
        (_, "button") => 1.4,
        (_, "a") => 1.0,
        _ => 0.0,
    };

    if text.contains("easy apply") {
        score += 2.0;
    } else if text.contains("apply now") {
        score += 1.8;
    } else if text.contains("apply on ") {
        score += 1.4;
    } else if text.contains("apply") {
        score += 1.5;
    }

    if aria.contains("easy apply") {
        score += 1.8;
    } else if aria.contains("apply") {
        score += 1.2;
    }

    if let Some(test_id) = candidate.test_id.as_deref() {
        let test_id = test_id.to_lowercase();
        if test_id.contains("easyapply") || test_id.contains("easy-apply") {
            score += 1.5;
        } else if test_id.contains("apply") {
            score += 1.0;
        }
    }

    if contains_any(&text, NEGATIVE_PHRASES) {
        score -= 2.0;
    }
    if payment::is_payment_button(&text) || payment::is_payment_button(&aria) {
        score -= 10.0;
    }
    if !candidate.visible {
        score -= 3.0;
    }
    score
}

/// Apply-like clickables, best first.
pub fn score_candidates(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = snapshot
        .enabled()
        .filter(|el| {
            matches!(el.tag.as_str(), "button" | "a")
                || matches!(el.role.as_deref(), Some("button") | Some("link"))
        })
        .filter(|el| {
            let search = [&el.text, &el.aria_label, &el.test_id]
                .iter()
                .filter_map(|s| s.as_deref())
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            search.contains("apply")
        })
        .map(Candidate::from_element)
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// First visible candidate with a positive score.
pub fn best_candidate(snapshot: &Snapshot) -> Option<Candidate> {
    score_candidates(snapshot)
        .into_iter()
        .find(|c| c.visible && c.score > 0.0)
}

fn class_of(candidate: &Candidate) -> PageClass {
    let text = candidate.text.to_lowercase();
    let aria = candidate.aria_lower();
    if text.contains("easy") || aria.contains("easy") {
        return PageClass::EasyApply;
    }
    let external = contains_any(&aria, EXTERNAL_ARIA_PHRASES)
        || (candidate.tag == "button" && candidate.role.as_deref() == Some("link"))
        || (candidate.tag == "a" && candidate.href.is_some())
        || text.contains("apply on ");
    if external {
        PageClass::ExternalLink
    } else {
        PageClass::EasyApply
    }
}

/// First selector the page reports as visible.
pub fn first_visible_selector<'s>(
    selectors: &[&'s str],
    visible: impl Fn(&str) -> bool,
) -> Option<&'s str> {
    selectors.iter().copied().find(|css| visible(css))
}

fn is_linkedin(url: &str) -> bool {
    url.to_lowercase().contains("linkedin.com/")
}

/// The landing page only offers an "Apply on company site" entry.
pub fn is_external_only(snapshot: &Snapshot) -> bool {
    let mut external = false;
    for el in snapshot.enabled().filter(|el| el.visible) {
        let text = el.text.as_deref().unwrap_or_default().to_lowercase();
        let aria = el.aria_label.as_deref().unwrap_or_default().to_lowercase();
        if text.contains("easy apply") || aria.contains("easy apply") {
            return false;
        }
        if (el.is_clickable() && text.contains("apply on company")) || aria.contains("apply on company") {
            external = true;
        }
    }
    external
}

/// Classifier bound to a live page.
pub struct Classifier<'a, P: Page + ?Sized> {
    page: &'a P,
}

impl<'a, P: Page + ?Sized> Classifier<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self { page }
    }

    /// Extract a fresh snapshot and classify the current page.
    pub fn classify(&self) -> Result<(Classification, Snapshot), BrowserError> {
        let snapshot = dom::extract(self.page)?;
        let html = self.page.content().unwrap_or_default();
        let url = if snapshot.url.is_empty() {
            self.page.current_url()
        } else {
            snapshot.url.clone()
        };
        let mut classification = classify(&PageSignals {
            url: &url,
            html: &html,
            snapshot: &snapshot,
        });
        let open = matches!(
            classification.class,
            PageClass::EasyApply | PageClass::ExternalLink | PageClass::Unknown
        );
        if open {
            if let Some(direct) = self.direct_candidate(&url) {
                classification = Classification {
                    class: class_of(&direct),
                    candidate: Some(direct),
                };
            }
        }
        info!(class = %classification.class, "page classified");
        Ok((classification, snapshot))
    }

    /// LinkedIn's Easy Apply button located through its known selectors.
    pub fn direct_candidate(&self, url: &str) -> Option<Candidate> {
        if !is_linkedin(url) {
            return None;
        }
        let selector = first_visible_selector(LINKEDIN_EASY_APPLY_SELECTORS, |css| {
            self.page.is_visible(&Locator::new(css), DIRECT_VISIBLE_MS)
        })?;
        let locator = Locator::new(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); return el ? el.textContent : ''; }})()",
            sel = js_string(selector)
        );
        let text = match self.page.evaluate(&script) {
            Ok(serde_json::Value::String(text)) => text.trim().to_string(),
            _ => String::new(),
        };
        let attribute = |name: &str| {
            self.page
                .get_attribute(&locator, name)
                .ok()
                .flatten()
                .filter(|v| !v.is_empty())
        };
        let aria_label = attribute("aria-label");
        let test_id = attribute("data-testid");
        let candidate = Candidate {
            reference: String::new(),
            tag: "button".to_string(),
            role: Some("button".to_string()),
            text,
            aria_label,
            href: None,
            test_id,
            visible: true,
            score: DIRECT_SCORE,
            selector: Some(locator),
        };
        info!(selector, "LinkedIn apply button found by selector");
        Some(candidate)
    }

    /// The known-selector button when there is one, else the best scored
    /// candidate of `snapshot`.
    pub fn find_apply_button(&self, snapshot: &Snapshot) -> Option<Candidate> {
        self.direct_candidate(&snapshot.url)
            .or_else(|| best_candidate(snapshot))
    }

    /// Click the entry button of `snapshot`, retrying once against a fresh,
    /// re-scored extraction.
    pub fn click_apply(&self, snapshot: &Snapshot) -> Result<bool, BrowserError> {
        if let Some(candidate) = self.find_apply_button(snapshot) {
            info!(text = %candidate.text, score = candidate.score, "clicking entry candidate");
            self.page.dismiss_overlays();
            if self.try_click(snapshot, &candidate) {
                self.page.wait(500);
                self.page.dismiss_overlays();
                return Ok(true);
            }
            self.page.wait(500);
            self.page.dismiss_overlays();
        }

        let fresh = dom::extract(self.page)?;
        let Some(candidate) = best_candidate(&fresh) else {
            warn!("no apply button candidate found");
            return Ok(false);
        };
        debug!(text = %candidate.text, "retrying with re-scored candidate");
        Ok(self.try_click(&fresh, &candidate))
    }

    fn try_click(&self, snapshot: &Snapshot, candidate: &Candidate) -> bool {
        let Some(locator) = candidate
            .selector
            .as_ref()
            .or_else(|| snapshot.locator(&candidate.reference))
        else {
            return false;
        };
        self.page.wait(200 + (rand::random::<f32>() * 300.0) as u64);
        self.click_sequence(locator)
    }

    fn click_sequence(&self, locator: &Locator) -> bool {
        if !self.page.is_visible(locator, 1000) {
            debug!(%locator, "candidate not visible yet");
        }
        match self.page.click(locator) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "native click failed, forcing");
                self.page.force_click(locator).is_ok()
            }
        }
    }
}
