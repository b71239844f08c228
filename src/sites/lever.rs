//! Lever: one application page with a single full-name field.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Lever,
    url_patterns: &[r"jobs\.lever\.co", r"lever\.co/.*apply"],
    dom_signatures: &[".lever-application", "[data-lever]", ".lever-job-posting"],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Text("thank you for applying"),
                Indicator::Text("application submitted"),
                Indicator::Url("/thanks"),
            ],
        ),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Url("/apply"),
                Indicator::Element(Name("name")),
                Indicator::Element(Name("resume")),
            ],
        ),
        (FormPage::JobListing, &[Indicator::Element(Text("apply for this job"))]),
    ],
    fallback_state: FormPage::Unknown,
    passive_states: &[],
    fields: &[
        FieldRule::new(&[Name("name"), Id("name")], Source::FullName),
        FieldRule::new(&[Name("email"), Id("email"), Kind("email")], Source::Profile(&["email"])),
        FieldRule::new(&[Name("phone"), Id("phone"), Kind("tel")], Source::Profile(&["phone"])),
        FieldRule::new(&[Name("resume"), NameContains("resume")], Source::Resume),
        FieldRule::new(
            &[Name("urls[LinkedIn]"), PlaceholderContains("linkedin")],
            Source::Profile(&["linkedin_url", "linkedin"]),
        ),
        FieldRule::new(
            &[Name("urls[GitHub]"), PlaceholderContains("github")],
            Source::Profile(&["github_url"]),
        ),
        FieldRule::new(
            &[Name("urls[Portfolio]"), Name("urls[Other]")],
            Source::Profile(&["portfolio_url", "website"]),
        ),
        FieldRule::new(
            &[Name("org"), Id("current-company")],
            Source::Profile(&["current_company"]),
        ),
        FieldRule::select(&[NameContains("authorized")], "Yes"),
        FieldRule::select(&[NameContains("sponsor")], "No"),
    ],
    apply_buttons: &[Text("apply for this job"), Text("apply")],
    next_buttons: &[Kind("submit"), Text("submit application"), Text("submit")],
    submit_buttons: &[Kind("submit"), Text("submit application"), Text("submit")],
    resume_cards: &[],
    consent: ConsentPolicy::All,
};

pub fn handler() -> Box<dyn SiteHandler> {
    Box::new(SpecHandler::new(&SPEC))
}
