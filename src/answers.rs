//! Deterministic answers for application questions.
//!
//! An ordered rule list maps question text to a `(category, key)` slot in the
//! [`AnswerTable`]; the first rule whose slot has a value wins. Questions no
//! rule answers fall through to a dynamic "years of X" lookup. Resolution is a
//! pure function of the question, the field type and the loaded table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::types::{Element, Profile};

const DEFAULT_ANSWERS: &str = include_str!("../config/answers.toml");

/// Category whose rules always answer "Yes".
const EXPERIENCE_CONFIRMATION: &str = "experience_confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Checkbox,
    Radio,
    Select,
}

impl FieldType {
    pub fn of(element: &Element) -> Self {
        match (element.tag.as_str(), element.kind()) {
            ("select", _) => FieldType::Select,
            (_, "checkbox") => FieldType::Checkbox,
            (_, "radio") => FieldType::Radio,
            (_, "number") => FieldType::Number,
            _ if element.is_combobox() => FieldType::Select,
            _ => match element.role.as_deref() {
                Some("checkbox") => FieldType::Checkbox,
                Some("radio") => FieldType::Radio,
                _ => FieldType::Text,
            },
        }
    }
}

/// A configured answer value as written in the TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A resolved answer, already coerced to the field type.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Answer {
    /// Whether a checkbox should end up checked.
    pub fn is_affirmative(&self) -> bool {
        match self {
            Answer::Bool(b) => *b,
            Answer::Int(n) => *n != 0,
            Answer::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "y" | "1"
            ),
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Bool(true) => f.write_str("Yes"),
            Answer::Bool(false) => f.write_str("No"),
            Answer::Int(n) => write!(f, "{n}"),
            Answer::Text(s) => f.write_str(s),
        }
    }
}

/// Category → key → value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerTable(BTreeMap<String, BTreeMap<String, AnswerValue>>);

impl AnswerTable {
    /// The embedded default table.
    pub fn defaults() -> Self {
        // The embedded file is covered by a unit test.
        toml::from_str(DEFAULT_ANSWERS).unwrap_or_default()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn get(&self, category: &str, key: &str) -> Option<&AnswerValue> {
        self.0.get(category)?.get(key)
    }

    pub fn set(&mut self, category: &str, key: &str, value: AnswerValue) {
        self.0
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Copy the applicant profile into the `personal` category.
    ///
    /// Aliases (`linkedin_url`, `portfolio_url`, a combined `location`) are
    /// folded into the keys the rules look up.
    pub fn with_profile(mut self, profile: &Profile) -> Self {
        for (key, value) in profile.iter() {
            if !value.trim().is_empty() {
                self.set("personal", key, AnswerValue::Text(value.clone()));
            }
        }

        let aliases = [
            ("linkedin", &["linkedin_url"][..]),
            ("website", &["portfolio_url", "github_url", "website_url"][..]),
            ("zip", &["postal_code", "zip_code"][..]),
        ];
        for (key, sources) in aliases {
            if self.get("personal", key).is_none() {
                if let Some(value) = sources.iter().find_map(|s| profile.get(s)) {
                    self.set("personal", key, AnswerValue::Text(value.to_string()));
                }
            }
        }

        if let Some(location) = profile.get("location") {
            let (city, state) = split_location(location);
            if self.get("personal", "city").is_none() && !city.is_empty() {
                self.set("personal", "city", AnswerValue::Text(city));
            }
            if let Some(state) = state {
                if self.get("personal", "state").is_none() {
                    self.set("personal", "state", AnswerValue::Text(state));
                }
            }
        }
        self
    }
}

/// Split "City, State" into its parts.
pub fn split_location(location: &str) -> (String, Option<String>) {
    let mut parts = location.splitn(2, ',').map(str::trim);
    let city = parts.next().unwrap_or_default().to_string();
    let state = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (city, state)
}

/// One static question rule.
pub struct AnswerRule {
    pub pattern: Regex,
    pub category: &'static str,
    pub key: &'static str,
}

const RULE_SOURCES: &[(&str, &str, &str)] = &[
    // Experience confirmation ("do you have at least N years...") comes first.
    (r"do you have at least.*years.*experience|at least.*years.*professional", EXPERIENCE_CONFIRMATION, "yes"),
    (r"do you have.*\d+.*years", EXPERIENCE_CONFIRMATION, "yes"),
    (r"software engineer.*experience|experience.*software engineer", EXPERIENCE_CONFIRMATION, "yes"),
    // EEO before personal, so "self-identification of disability" never hits personal.website.
    (r"self.?identification.*disability|voluntary.*disability|disability\s*status|disability|accommodation", "dropdowns", "disability_status"),
    (r"self.?identification.*veteran|voluntary.*veteran|veteran\s*status|protected\s*veteran|veteran", "dropdowns", "veteran_status"),
    (r"self.?identification.*gender|voluntary.*gender|gender\s*identity|gender|sex", "dropdowns", "gender"),
    (r"self.?identification.*race|voluntary.*race|race|ethnicity|racial\s*background", "dropdowns", "race"),
    (r"voluntary|self.?identification|demographic|eeo|equal\s*opportunity", "dropdowns", "decline_to_identify"),
    (r"first\s*name", "personal", "first_name"),
    (r"last\s*name", "personal", "last_name"),
    (r"email", "personal", "email"),
    (r"phone\s*country\s*code|country\s*code.*phone", "personal", "phone_country_code"),
    (r"phone|mobile|cell", "personal", "phone"),
    (r"city|location", "personal", "city"),
    (r"state|province", "personal", "state"),
    (r"zip|postal", "personal", "zip"),
    (r"linkedin", "personal", "linkedin"),
    (r"website|portfolio|github", "personal", "website"),
    (r"driver.?s?\s*licen[sc]e", "checkboxes", "drivers_license"),
    (r"(require|need)\s*(visa|sponsorship)", "checkboxes", "require_visa"),
    (r"will you.*need.*sponsorship|ever need.*sponsorship|sponsorship.*to work", "checkboxes", "require_visa"),
    (r"require.*employer.*sponsor|employer.*sponsored.*work.*authorization", "checkboxes", "require_visa"),
    (r"do you have.*experience|solid experience|experience with.*and knowledge", "checkboxes", "acknowledgment"),
    (r"legally\s*(authorized|able)", "checkboxes", "legally_authorized"),
    (r"(willing|open)\s*to\s*relocate", "checkboxes", "willing_to_relocate"),
    (r"background\s*check", "checkboxes", "background_check"),
    (r"drug\s*(test|screen)", "checkboxes", "drug_test"),
    (r"start\s*(immediately|right\s*away|asap)", "checkboxes", "start_immediately"),
    (r"(comfortable|able)\s*(commuting|to\s*commute)", "checkboxes", "comfortable_commuting"),
    (r"remote\s*(work|position)", "checkboxes", "remote_work"),
    (r"(us|u\.s\.?|united\s*states)\s*citizen", "checkboxes", "us_citizen"),
    (r"(authorized|eligible)\s*to\s*work", "checkboxes", "work_authorization"),
    (r"(18|eighteen)\s*(years|yrs)\s*(old|of\s*age|or\s*older)", "checkboxes", "over_18"),
    (r"designed.*application.*end\s*to\s*end|end\s*to\s*end.*application", "checkboxes", "designed_end_to_end"),
    (r"sms|text\s*(message|communication)", "checkboxes", "sms_consent"),
    (r"i\s*(understand|acknowledge|agree|certify|confirm)", "checkboxes", "acknowledgment"),
    (r"consent", "checkboxes", "general_consent"),
    (r"can you start.*immediately|start.*urgent|urgently", "checkboxes", "start_immediately"),
    (r"comfortable.*remote|remote.*environment|work.*from.*home", "checkboxes", "remote_work"),
    (r"felony|convicted|criminal.*record", "checkboxes", "criminal_record"),
    (r"previously.*worked.*at|former.*employee|worked.*here.*before", "checkboxes", "worked_here_before"),
    (r"completed.*education|bachelor|master|degree.*completed|level.*education", "checkboxes", "education_completed"),
    (r"how many years.*(work|professional).*experience|years of work experience|total.*experience", "industry", "software_engineering"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*python", "technology", "python"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*fastapi", "technology", "fastapi"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*(aws|amazon)", "technology", "aws"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*docker", "technology", "docker"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*kubernetes", "technology", "kubernetes"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*(postgres|postgresql)", "technology", "postgresql"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*sql", "technology", "sql"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*javascript", "technology", "javascript"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*typescript", "technology", "typescript"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*react", "technology", "react"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*git", "technology", "git"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*linux", "technology", "linux"),
    (r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*redis", "technology", "redis"),
    (r"salary\s*expectation|desired\s*salary|expected\s*compensation", "salary", "expected"),
    (r"minimum\s*salary|salary\s*requirement", "salary", "minimum"),
    (r"hourly\s*rate|rate\s*expectation", "salary", "hourly_rate"),
    (r"english\s*proficiency|english\s*fluency|language\s*proficiency", "languages", "english"),
    (r"notice\s*period|how\s*much\s*notice|when\s*can\s*you\s*start", "preferences", "notice_period"),
    (r"available\s*to\s*start|start\s*date|earliest\s*start", "preferences", "available_start"),
    (r"work\s*type|remote.?hybrid.?onsite", "preferences", "work_type"),
    (r"which\s*database|database.*experienced|experienced.*database", "preferences", "databases"),
    (r"agree.*privacy\s*policy|privacy\s*policy.*data\s*processing|clicking.*yes.*agree", "yes_no", "yes"),
    (r"accurate\s*information|dishonesty.*rejection|termination", "yes_no", "yes"),
    (r"certify.*true|information.*accurate|truthful", "yes_no", "yes"),
];

static RULES: LazyLock<Vec<AnswerRule>> = LazyLock::new(|| {
    RULE_SOURCES
        .iter()
        .filter_map(|&(pattern, category, key)| match Regex::new(pattern) {
            Ok(pattern) => Some(AnswerRule {
                pattern,
                category,
                key,
            }),
            Err(err) => {
                warn!(%err, category, key, "skipping invalid answer rule");
                None
            }
        })
        .collect()
});

static YEARS_OF: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"years?\s*(of)?\s*(experience|exp)?\s*(with|in|using)?\s*(\w+)").ok()
});

/// Keywords for "Go, Python or comparable language" style questions.
const TECH_KEYWORDS: &[(&str, &str)] = &[
    ("python", "python"),
    ("go", "go"),
    ("golang", "go"),
    ("java", "java"),
    ("c#", "csharp"),
    ("csharp", "csharp"),
    ("ruby", "ruby"),
    ("rust", "rust"),
    ("scala", "scala"),
    ("javascript", "javascript"),
    ("typescript", "typescript"),
    ("sql", "sql"),
    ("postgresql", "postgresql"),
    ("postgres", "postgresql"),
    ("mysql", "sql"),
    ("database", "postgresql"),
    ("relational", "postgresql"),
];

/// Rule-based question answering over a loaded [`AnswerTable`].
#[derive(Debug, Clone, Default)]
pub struct AnswerResolver {
    table: AnswerTable,
}

impl AnswerResolver {
    pub fn new(table: AnswerTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &AnswerTable {
        &self.table
    }

    pub fn rules() -> &'static [AnswerRule] {
        &RULES
    }

    pub fn resolve(&self, question: &str, field: FieldType) -> Option<Answer> {
        let q = question.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }

        if field == FieldType::Select {
            if let Some(answer) = self.experience_dropdown(&q) {
                debug!(question = %short(question), %answer, "experience dropdown");
                return Some(answer);
            }
        }

        for rule in RULES.iter() {
            if !rule.pattern.is_match(&q) {
                continue;
            }
            if rule.category == EXPERIENCE_CONFIRMATION {
                return Some(match field {
                    FieldType::Checkbox => Answer::Bool(true),
                    _ => Answer::Text("Yes".to_string()),
                });
            }
            if let Some(value) = self.table.get(rule.category, rule.key) {
                debug!(question = %short(question), category = rule.category, key = rule.key, "rule matched");
                return Some(coerce(value, field));
            }
        }

        if let Some(value) = self.years_of(&q) {
            return Some(coerce(&value, field));
        }

        debug!(question = %short(question), "no answer");
        None
    }

    fn years_of(&self, q: &str) -> Option<AnswerValue> {
        let captures = YEARS_OF.as_ref()?.captures(q)?;
        let skill = captures.get(4)?.as_str();
        self.table
            .get("technology", skill)
            .or_else(|| self.table.get("industry", skill))
            .cloned()
            .or_else(|| self.table.get("technology", "default").cloned())
            .or(Some(AnswerValue::Int(0)))
    }

    fn experience_dropdown(&self, q: &str) -> Option<Answer> {
        if q.contains("do you have") && q.contains("years") {
            return Some(Answer::Text("Yes".to_string()));
        }
        let mut best: Option<i64> = None;
        for &(keyword, key) in TECH_KEYWORDS {
            if !mentions(q, keyword) {
                continue;
            }
            let years = match self.table.get("technology", key) {
                Some(AnswerValue::Int(n)) => *n,
                Some(AnswerValue::Float(f)) => *f as i64,
                _ => 0,
            };
            if years > best.unwrap_or(0) {
                best = Some(years);
            }
        }
        best.map(|n| Answer::Text(n.to_string()))
    }
}

/// Whole-word keyword match, so "go" does not fire on "good".
fn mentions(haystack: &str, keyword: &str) -> bool {
    haystack.match_indices(keyword).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + keyword.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

fn coerce(value: &AnswerValue, field: FieldType) -> Answer {
    match field {
        FieldType::Checkbox => Answer::Bool(match value {
            AnswerValue::Bool(b) => *b,
            AnswerValue::Int(n) => *n != 0,
            AnswerValue::Float(f) => *f != 0.0,
            AnswerValue::Text(s) => !s.is_empty(),
        }),
        FieldType::Number => Answer::Int(match value {
            AnswerValue::Int(n) => *n,
            AnswerValue::Float(f) => *f as i64,
            AnswerValue::Text(s) => s.trim().parse().unwrap_or(0),
            AnswerValue::Bool(_) => 0,
        }),
        _ => match value {
            AnswerValue::Bool(b) => Answer::Bool(*b),
            AnswerValue::Int(n) => Answer::Text(n.to_string()),
            AnswerValue::Float(f) => Answer::Text(f.to_string()),
            AnswerValue::Text(s) => Answer::Text(s.clone()),
        },
    }
}

/// Conservative default for yes/no questions nothing answered.
///
/// Liability, background and sponsorship questions get "No"; authorization
/// and consent questions get "Yes"; anything else gets "No".
pub fn default_yes_no(question: &str) -> bool {
    const NO: &[&str] = &[
        "liability",
        "background",
        "criminal",
        "felony",
        "convicted",
        "sponsor",
        "visa",
        "relative",
        "non-compete",
        "previously employed",
    ];
    const YES: &[&str] = &[
        "authorized",
        "authorization",
        "eligible",
        "legally",
        "consent",
        "agree",
        "acknowledge",
        "certify",
        "18",
        "over the age",
    ];
    let q = question.to_lowercase();
    if NO.iter().any(|k| q.contains(k)) {
        return false;
    }
    YES.iter().any(|k| q.contains(k))
}

fn short(question: &str) -> String {
    question.chars().take(60).collect()
}
