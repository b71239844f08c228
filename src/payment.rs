//! Payment-page safety assessment.
//!
//! Job-application URLs and content veto a block; otherwise payment URLs,
//! credit-card inputs, purchase buttons and premium upsells block.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Hosts where apply flows live next to premium upsells; never blocked.
pub const SAFE_HOSTS: &[&str] = &[
    "smartapply.indeed.com",
    "indeed.com/applystart",
    "linkedin.com/jobs",
];

const BLOCK_URL_PATTERNS: &[&str] = &[
    "/checkout",
    "/payment",
    "/subscribe",
    "/premium",
    "/upgrade",
    "/billing",
];

const ALLOW_URL_PATTERNS: &[&str] = &["/apply", "/submit", "/application", "/confirmed"];

/// Words that mark a button as a purchase rather than an application.
pub const PAYMENT_BUTTON_WORDS: &[&str] = &[
    "buy",
    "purchase",
    "upgrade",
    "premium",
    "subscribe",
    "checkout",
    "pay now",
    "start trial",
    "get premium",
    "unlock",
    "pro version",
    "pricing",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDecision {
    pub should_block: bool,
    pub reason: Option<&'static str>,
    pub confidence: f32,
}

impl BlockDecision {
    fn allow(confidence: f32) -> Self {
        Self {
            should_block: false,
            reason: None,
            confidence,
        }
    }

    fn block(reason: &'static str, confidence: f32) -> Self {
        Self {
            should_block: true,
            reason: Some(reason),
            confidence,
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
        .collect()
}

static PURCHASE_BUTTONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"complete\s+purchase",
        r"subscribe\s+now",
        r"buy\s+now",
        r"upgrade\s+to\s+premium",
        r"get\s+premium",
        r"try\s+premium",
    ])
});

static CREDIT_CARD_INPUTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r#"name=["']?(?:card[-_]?number|cc[-_]?number|creditcard)"#,
        r#"name=["']?(?:cvv|cvc|ccv|security[-_]?code)"#,
        r#"name=["']?(?:expir|exp[-_]?date|cc[-_]?exp)"#,
        r#"placeholder=["']?(?:card\s*number|credit\s*card)"#,
        r#"placeholder=["']?(?:mm\s*/\s*yy|mm/yy|expir)"#,
        r#"placeholder=["']?(?:cvc|cvv|security)"#,
        r#"autocomplete=["']?cc-"#,
    ])
});

static PREMIUM_UPSELLS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"indeed\s+premium", r"linkedin\s+premium"]));

static JOB_APPLICATION_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"submit\s+application",
        r"apply\s+now",
        r"application[-_]?form",
        r#"name=["']?resume"#,
        r"application\s+submitted",
        r"thank\s+you\s+for\s+applying",
    ])
});

static JOB_LISTING_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"<h1[^>]*>.*(?:engineer|developer|manager|analyst|designer)",
        r"job[-_]?listing",
        r"we\s+are\s+looking\s+for",
    ])
});

fn any_match(patterns: &[Regex], content: &str) -> bool {
    patterns.iter().any(|p| p.is_match(content))
}

/// Decide whether `url` with HTML `content` is a payment page.
pub fn assess(url: &str, content: &str) -> BlockDecision {
    let url = url.to_lowercase();
    if SAFE_HOSTS.iter().any(|safe| url.contains(safe)) {
        return BlockDecision::allow(0.95);
    }

    let is_job_app_url = ALLOW_URL_PATTERNS.iter().any(|p| url.contains(p));
    let is_payment_url = BLOCK_URL_PATTERNS.iter().any(|p| url.contains(p));
    let has_job_signals = any_match(&JOB_APPLICATION_SIGNALS, content);
    let has_job_listing = any_match(&JOB_LISTING_SIGNALS, content);

    if is_job_app_url || has_job_signals {
        return BlockDecision::allow(0.9);
    }

    let has_card_inputs = any_match(&CREDIT_CARD_INPUTS, content);
    let has_purchase_button = any_match(&PURCHASE_BUTTONS, content);

    if has_job_listing && !has_card_inputs && !has_purchase_button {
        return BlockDecision::allow(0.8);
    }

    if is_payment_url {
        if has_job_listing {
            return BlockDecision::allow(0.7);
        }
        return BlockDecision::block("URL contains payment pattern", 0.9);
    }

    if has_card_inputs {
        return BlockDecision::block("Credit card input fields detected", 0.95);
    }

    if has_purchase_button {
        return BlockDecision::block("Purchase button detected", 0.9);
    }

    if any_match(&PREMIUM_UPSELLS, content) {
        let lower = content.to_lowercase();
        if lower.contains("see detailed") || lower.contains("premium-hint") {
            return BlockDecision::allow(0.6);
        }
        return BlockDecision::block("Premium upsell detected", 0.85);
    }

    BlockDecision::allow(0.5)
}

/// Whether a button's text or aria-label reads like a purchase.
pub fn is_payment_button(text: &str) -> bool {
    let text = text.to_lowercase();
    PAYMENT_BUTTON_WORDS.iter().any(|w| text.contains(w))
}
