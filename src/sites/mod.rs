//! Per-site handlers.
//!
//! Every supported applicant-tracking system is described by a static
//! [`SiteSpec`] table: URL and DOM signatures for detection, page-state
//! indicators, structural field rules and button cues. [`SpecHandler`]
//! interprets a spec against a snapshot and yields plain [`Action`]s; it never
//! touches the browser itself.

pub mod greenhouse;
pub mod icims;
pub mod indeed;
pub mod lever;
pub mod linkedin;
pub mod phenom;
pub mod registry;
pub mod smartrecruiters;
pub mod workday;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::answers::{Answer, AnswerResolver, FieldType, default_yes_no, split_location};
use crate::dom;
use crate::types::{Action, Applicant, Element, Snapshot};

pub use registry::HandlerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Site {
    Greenhouse,
    Lever,
    Workday,
    SmartRecruiters,
    Icims,
    Phenom,
    Indeed,
    LinkedIn,
}

impl Site {
    pub fn name(&self) -> &'static str {
        match self {
            Site::Greenhouse => "greenhouse",
            Site::Lever => "lever",
            Site::Workday => "workday",
            Site::SmartRecruiters => "smartrecruiters",
            Site::Icims => "icims",
            Site::Phenom => "phenom",
            Site::Indeed => "indeed",
            Site::LinkedIn => "linkedin",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a multi-page flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPage {
    JobListing,
    Login,
    PersonalInfo,
    Experience,
    Education,
    Questions,
    Documents,
    Review,
    Confirmation,
    Unknown,
}

/// Inputs a handler may draw values from.
pub struct SiteContext<'a> {
    pub applicant: &'a Applicant,
    pub resolver: &'a AnswerResolver,
}

/// Capability set every site handler provides.
pub trait SiteHandler: Send + Sync {
    fn site(&self) -> Site;

    fn detect_page_state(&self, snapshot: &Snapshot) -> FormPage;

    /// Field actions for the current page, without the advance click.
    fn fill_current_page(&self, snapshot: &Snapshot, ctx: &SiteContext<'_>) -> Vec<Action>;

    /// The click that moves the flow forward from this page, if any.
    fn advance_page(&self, snapshot: &Snapshot) -> Option<Action>;
}

/// Element predicate used by field rules, button cues and page indicators.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    Id(&'static str),
    /// Case-insensitive substring of the `id` attribute.
    IdContains(&'static str),
    Name(&'static str),
    /// Case-insensitive substring of the `name` attribute.
    NameContains(&'static str),
    /// Exact automation id (`data-testid`, `data-automation-id`, `data-test`,
    /// `data-ph-at-id`).
    TestId(&'static str),
    TestIdContains(&'static str),
    Autocomplete(&'static str),
    /// Input `type`.
    Kind(&'static str),
    PlaceholderContains(&'static str),
    /// Case-insensitive substring of label, text, aria-label or value.
    Text(&'static str),
}

impl Matcher {
    pub fn matches(&self, el: &Element) -> bool {
        match *self {
            Matcher::Id(id) => el.id.as_deref() == Some(id),
            Matcher::IdContains(part) => contains_ci(el.id.as_deref(), part),
            Matcher::Name(name) => el.name.as_deref() == Some(name),
            Matcher::NameContains(part) => contains_ci(el.name.as_deref(), part),
            Matcher::TestId(id) => el.test_id.as_deref() == Some(id),
            Matcher::TestIdContains(part) => contains_ci(el.test_id.as_deref(), part),
            Matcher::Autocomplete(value) => el.autocomplete.as_deref() == Some(value),
            Matcher::Kind(kind) => el.tag == "input" && el.kind() == kind,
            Matcher::PlaceholderContains(part) => contains_ci(el.placeholder.as_deref(), part),
            Matcher::Text(part) => [&el.label, &el.text, &el.aria_label, &el.value]
                .iter()
                .any(|s| contains_ci(s.as_deref(), part)),
        }
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

/// Where a structural field's value comes from.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// First non-empty profile key.
    Profile(&'static [&'static str]),
    FirstName,
    LastName,
    FullName,
    City,
    State,
    Resume,
    Literal(&'static str),
}

impl Source {
    fn value(&self, applicant: &Applicant) -> Option<String> {
        let profile = &applicant.profile;
        match *self {
            Source::Profile(keys) => keys.iter().find_map(|k| profile.get(k)).map(str::to_string),
            Source::FirstName => profile.get("first_name").map(str::to_string).or_else(|| {
                let full = profile.full_name()?;
                full.split_whitespace().next().map(str::to_string)
            }),
            Source::LastName => profile.get("last_name").map(str::to_string).or_else(|| {
                let full = profile.full_name()?;
                let mut parts = full.split_whitespace();
                parts.next()?;
                let rest = parts.collect::<Vec<_>>().join(" ");
                (!rest.is_empty()).then_some(rest)
            }),
            Source::FullName => profile.full_name(),
            Source::City => profile
                .get("city")
                .map(str::to_string)
                .or_else(|| profile.get("location").map(|l| split_location(l).0))
                .filter(|c| !c.is_empty()),
            Source::State => profile
                .get("state")
                .map(str::to_string)
                .or_else(|| profile.get("location").and_then(|l| split_location(l).1)),
            Source::Resume => applicant
                .resume_path()
                .map(|p| p.to_string_lossy().into_owned()),
            Source::Literal(value) => Some(value.to_string()),
        }
    }
}

/// A structural field: the first unused element matching any matcher gets
/// the source's value.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub matchers: &'static [Matcher],
    pub source: Source,
    /// Restrict matches to one tag (`select` for dropdown rules).
    pub tag: Option<&'static str>,
}

impl FieldRule {
    pub const fn new(matchers: &'static [Matcher], source: Source) -> Self {
        Self {
            matchers,
            source,
            tag: None,
        }
    }

    pub const fn select(matchers: &'static [Matcher], value: &'static str) -> Self {
        Self {
            matchers,
            source: Source::Literal(value),
            tag: Some("select"),
        }
    }
}

/// Page-state evidence.
#[derive(Debug, Clone, Copy)]
pub enum Indicator {
    Url(&'static str),
    Element(Matcher),
    Text(&'static str),
}

impl Indicator {
    fn present(&self, snapshot: &Snapshot, url: &str, text: &str) -> bool {
        match *self {
            Indicator::Url(part) => url.contains(&part.to_lowercase()),
            Indicator::Element(m) => snapshot.elements.iter().any(|el| m.matches(el)),
            Indicator::Text(part) => text.contains(&part.to_lowercase()),
        }
    }
}

/// Which checkboxes a site ticks without a resolved answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPolicy {
    /// Every visible unchecked checkbox.
    All,
    /// Required checkboxes and explicit agreement boxes.
    Required,
    None,
}

/// Static description of one applicant-tracking system.
#[derive(Debug)]
pub struct SiteSpec {
    pub site: Site,
    /// Regexes over the lowercased URL.
    pub url_patterns: &'static [&'static str],
    /// CSS selectors probed on the live page when no URL pattern matched.
    pub dom_signatures: &'static [&'static str],
    /// Checked in order; the first state with any present indicator wins.
    pub states: &'static [(FormPage, &'static [Indicator])],
    pub fallback_state: FormPage,
    /// States that are only advanced through, never filled.
    pub passive_states: &'static [FormPage],
    pub fields: &'static [FieldRule],
    pub apply_buttons: &'static [Matcher],
    pub next_buttons: &'static [Matcher],
    pub submit_buttons: &'static [Matcher],
    /// Cards that pick a stored resume instead of uploading one.
    pub resume_cards: &'static [Matcher],
    pub consent: ConsentPolicy,
}

/// The one [`SiteHandler`] implementation, driven by a [`SiteSpec`].
#[derive(Debug, Clone, Copy)]
pub struct SpecHandler {
    spec: &'static SiteSpec,
}

impl SpecHandler {
    pub const fn new(spec: &'static SiteSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &'static SiteSpec {
        self.spec
    }

    fn first_button(&self, snapshot: &Snapshot, cues: &[Matcher]) -> Option<Action> {
        cues.iter().find_map(|cue| {
            snapshot
                .enabled()
                .filter(|el| el.visible)
                .find(|el| cue.matches(el))
                .map(|el| Action::click(el.reference.clone()))
        })
    }

    fn structural_fields(
        &self,
        snapshot: &Snapshot,
        ctx: &SiteContext<'_>,
        used: &mut HashSet<String>,
        actions: &mut Vec<Action>,
    ) {
        for rule in self.spec.fields {
            let Some(el) = rule.matchers.iter().find_map(|m| {
                snapshot.enabled().find(|el| {
                    !used.contains(&el.reference)
                        && rule.tag.is_none_or(|tag| el.tag == tag)
                        && (el.visible || el.is_file_input())
                        && matches!(rule.source, Source::Resume) == el.is_file_input()
                        && m.matches(el)
                })
            }) else {
                continue;
            };
            let Some(value) = rule.source.value(ctx.applicant) else {
                continue;
            };
            used.insert(el.reference.clone());
            if let Some(action) = action_for(el, &value, rule.source) {
                debug!(site = %self.spec.site, reference = %el.reference, "structural field");
                actions.push(action);
            }
        }
    }
}

impl SiteHandler for SpecHandler {
    fn site(&self) -> Site {
        self.spec.site
    }

    fn detect_page_state(&self, snapshot: &Snapshot) -> FormPage {
        let url = snapshot.url.to_lowercase();
        let text = snapshot.text_lower();
        self.spec
            .states
            .iter()
            .find(|(_, indicators)| indicators.iter().any(|i| i.present(snapshot, &url, &text)))
            .map(|(state, _)| *state)
            .unwrap_or(self.spec.fallback_state)
    }

    fn fill_current_page(&self, snapshot: &Snapshot, ctx: &SiteContext<'_>) -> Vec<Action> {
        let state = self.detect_page_state(snapshot);
        debug!(site = %self.spec.site, ?state, "filling page");
        match state {
            FormPage::Confirmation | FormPage::Login | FormPage::JobListing => return Vec::new(),
            // A stored resume card replaces the whole page.
            FormPage::Documents => {
                if let Some(card) = self.first_button(snapshot, self.spec.resume_cards) {
                    return vec![card];
                }
            }
            state if self.spec.passive_states.contains(&state) => return Vec::new(),
            _ => {}
        }

        let mut used = HashSet::new();
        let mut actions = Vec::new();
        self.structural_fields(snapshot, ctx, &mut used, &mut actions);
        answer_questions(snapshot, ctx.resolver, &mut used, &mut actions);
        tick_consent_boxes(snapshot, self.spec.consent, &used, &mut actions);
        actions
    }

    fn advance_page(&self, snapshot: &Snapshot) -> Option<Action> {
        match self.detect_page_state(snapshot) {
            FormPage::Confirmation | FormPage::Login => None,
            FormPage::JobListing => self.first_button(snapshot, self.spec.apply_buttons),
            FormPage::Review => self
                .first_button(snapshot, self.spec.submit_buttons)
                .or_else(|| self.first_button(snapshot, self.spec.next_buttons)),
            _ => self
                .first_button(snapshot, self.spec.next_buttons)
                .or_else(|| self.first_button(snapshot, self.spec.submit_buttons))
                .or_else(|| {
                    dom::find_next_buttons(snapshot)
                        .first()
                        .map(|el| Action::click(el.reference.clone()))
                }),
        }
    }
}

/// The action that puts `value` into `el`, or `None` when it is already there.
fn action_for(el: &Element, value: &str, source: Source) -> Option<Action> {
    if el.is_file_input() {
        return matches!(source, Source::Resume).then(|| Action::upload(el.reference.clone(), value));
    }
    if el.is_select() {
        let option = pick_option(el, value)?;
        if el.value.as_deref() == Some(option.as_str()) {
            return None;
        }
        return Some(Action::select(el.reference.clone(), option));
    }
    if matches!(el.kind(), "checkbox" | "radio") {
        return (!el.checked).then(|| Action::click(el.reference.clone()));
    }
    let current = el.value.as_deref().unwrap_or_default().trim();
    if current.eq_ignore_ascii_case(value.trim()) {
        return None;
    }
    Some(Action::fill(el.reference.clone(), value))
}

/// Option text matching `want`: exact, then prefix, then substring.
fn pick_option(el: &Element, want: &str) -> Option<String> {
    let want = want.trim().to_lowercase();
    let options = el.options.as_deref().unwrap_or_default();
    if options.is_empty() {
        return Some(want);
    }
    let text = |o: &crate::types::SelectOption| o.text.trim().to_lowercase();
    options
        .iter()
        .find(|o| text(o) == want || o.value.trim().to_lowercase() == want)
        .or_else(|| options.iter().find(|o| text(o).starts_with(&want)))
        .or_else(|| {
            options
                .iter()
                .find(|o| !want.is_empty() && !o.value.is_empty() && text(o).contains(&want))
        })
        .map(|o| o.text.clone())
}

fn is_yes_no(options: &[String]) -> bool {
    let lower: Vec<String> = options.iter().map(|o| o.trim().to_lowercase()).collect();
    lower.iter().any(|o| o == "yes") && lower.iter().any(|o| o == "no")
}

/// Screening questions: text inputs, dropdowns, radio groups, checkboxes.
pub fn answer_questions(
    snapshot: &Snapshot,
    resolver: &AnswerResolver,
    used: &mut HashSet<String>,
    actions: &mut Vec<Action>,
) {
    let mut groups: BTreeMap<String, Vec<&Element>> = BTreeMap::new();

    for el in snapshot.enabled() {
        if used.contains(&el.reference) || !matches!(el.tag.as_str(), "input" | "select" | "textarea") {
            continue;
        }
        if el.kind() == "radio" {
            // Radios with neither a group label nor a name carry no question.
            let key = el
                .group_label
                .clone()
                .or_else(|| el.name.clone())
                .filter(|k| !k.trim().is_empty());
            if let Some(key) = key {
                groups.entry(key).or_default().push(el);
            }
            continue;
        }
        let Some(question) = el.question() else {
            continue;
        };
        let field = FieldType::of(el);
        let answer = resolver.resolve(question, field);

        let action = match field {
            FieldType::Checkbox => {
                let tick = answer.as_ref().is_some_and(Answer::is_affirmative);
                (tick && !el.checked).then(|| Action::click(el.reference.clone()))
            }
            FieldType::Select if el.is_select() => {
                let options: Vec<String> = el
                    .options
                    .iter()
                    .flatten()
                    .map(|o| o.text.clone())
                    .collect();
                let wanted = match answer {
                    Some(answer) => Some(answer.to_string()),
                    None if is_yes_no(&options) => Some(yes_no(default_yes_no(question))),
                    None => None,
                };
                let unset = el.value.as_deref().is_none_or(|v| v.is_empty());
                wanted
                    .filter(|_| unset)
                    .and_then(|w| pick_option(el, &w))
                    .map(|option| Action::select(el.reference.clone(), option))
            }
            _ => answer
                .filter(|_| el.value.as_deref().is_none_or(|v| v.trim().is_empty()))
                .map(|a| Action::fill(el.reference.clone(), a.to_string())),
        };
        if let Some(action) = action {
            used.insert(el.reference.clone());
            actions.push(action);
        }
    }

    for (question, radios) in groups {
        if radios.iter().any(|r| r.checked) {
            continue;
        }
        let options: Vec<String> = radios.iter().map(|r| radio_text(r)).collect();
        let wanted = match resolver.resolve(&question, FieldType::Radio) {
            Some(answer) => answer.to_string(),
            None if is_yes_no(&options) => yes_no(default_yes_no(&question)),
            None => continue,
        };
        let wanted = wanted.trim().to_lowercase();
        let choice = radios
            .iter()
            .zip(&options)
            .find(|(_, text)| text.trim().to_lowercase() == wanted)
            .or_else(|| {
                radios
                    .iter()
                    .zip(&options)
                    .find(|(_, text)| text.to_lowercase().starts_with(&wanted))
            });
        if let Some((radio, _)) = choice {
            for r in &radios {
                used.insert(r.reference.clone());
            }
            actions.push(Action::click(radio.reference.clone()));
        }
    }
}

fn radio_text(el: &Element) -> String {
    el.label
        .clone()
        .or_else(|| el.value.clone())
        .or_else(|| el.text.clone())
        .unwrap_or_default()
}

fn yes_no(yes: bool) -> String {
    if yes { "Yes" } else { "No" }.to_string()
}

const AGREEMENT_WORDS: &[&str] = &["agree", "acknowledge", "consent", "terms", "certify"];

fn tick_consent_boxes(
    snapshot: &Snapshot,
    policy: ConsentPolicy,
    used: &HashSet<String>,
    actions: &mut Vec<Action>,
) {
    if policy == ConsentPolicy::None {
        return;
    }
    for el in snapshot.enabled() {
        if el.kind() != "checkbox" || el.checked || used.contains(&el.reference) {
            continue;
        }
        let wanted = match policy {
            ConsentPolicy::All => el.visible,
            ConsentPolicy::Required => {
                let hay = el.haystack();
                el.required || AGREEMENT_WORDS.iter().any(|w| hay.contains(w))
            }
            ConsentPolicy::None => false,
        };
        if wanted {
            actions.push(Action::click(el.reference.clone()));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::answers::AnswerTable;
    use crate::dom::parse_snapshot;
    use crate::types::Profile;
    use serde_json::Value;
    use std::path::PathBuf;

    pub fn snapshot(url: &str, text: &str, elements: Value) -> Snapshot {
        parse_snapshot(
            11,
            serde_json::json!({"url": url, "title": "Apply", "text": text, "elements": elements}),
        )
        .unwrap()
    }

    pub fn applicant() -> Applicant {
        let profile: Profile = [
            ("first_name", "Ada"),
            ("last_name", "Lovelace"),
            ("email", "ada@example.com"),
            ("phone", "555-0100"),
            ("location", "Austin, TX"),
            ("linkedin_url", "https://linkedin.com/in/ada"),
            ("current_company", "Analytical Engines"),
        ]
        .into_iter()
        .collect();
        Applicant {
            profile,
            resume: Some(PathBuf::from("/tmp/ada.pdf")),
        }
    }

    pub fn resolver(applicant: &Applicant) -> AnswerResolver {
        AnswerResolver::new(AnswerTable::defaults().with_profile(&applicant.profile))
    }
}
