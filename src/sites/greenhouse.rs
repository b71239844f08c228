//! Greenhouse: single-page application form behind an "Apply for this job"
//! link.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Greenhouse,
    url_patterns: &[r"boards\.greenhouse\.io", r"greenhouse\.io/.*jobs", r"gh_jid="],
    dom_signatures: &[
        "#greenhouse-app",
        "[data-greenhouse]",
        ".greenhouse-application",
        "#application_form",
    ],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Text("application submitted"),
                Indicator::Text("thank you for applying"),
                Indicator::Url("/confirmation"),
            ],
        ),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Element(Id("first_name")),
                Indicator::Element(Name("first_name")),
                Indicator::Element(Id("email")),
            ],
        ),
    ],
    fallback_state: FormPage::JobListing,
    passive_states: &[],
    fields: &[
        FieldRule::new(
            &[Id("first_name"), Name("first_name"), Autocomplete("given-name")],
            Source::FirstName,
        ),
        FieldRule::new(
            &[Id("last_name"), Name("last_name"), Autocomplete("family-name")],
            Source::LastName,
        ),
        FieldRule::new(&[Id("email"), Name("email"), Kind("email")], Source::Profile(&["email"])),
        FieldRule::new(&[Id("phone"), Name("phone"), Kind("tel")], Source::Profile(&["phone"])),
        FieldRule::new(
            &[NameContains("resume"), Id("resume_file"), TestId("resume")],
            Source::Resume,
        ),
        FieldRule::new(
            &[NameContains("linkedin"), PlaceholderContains("linkedin")],
            Source::Profile(&["linkedin_url", "linkedin"]),
        ),
        FieldRule::new(
            &[NameContains("website"), NameContains("portfolio")],
            Source::Profile(&["portfolio_url", "website"]),
        ),
        FieldRule::new(
            &[NameContains("location"), Id("location")],
            Source::Profile(&["location"]),
        ),
        FieldRule::select(&[NameContains("authorized")], "Yes"),
        FieldRule::select(&[NameContains("sponsorship")], "No"),
        FieldRule::select(&[NameContains("source"), NameContains("hear")], "Job Board"),
    ],
    apply_buttons: &[Text("apply for this job"), Text("apply now"), Text("apply")],
    next_buttons: &[Kind("submit"), Text("submit application"), Text("submit")],
    submit_buttons: &[Kind("submit"), Text("submit application"), Text("submit")],
    resume_cards: &[],
    consent: ConsentPolicy::All,
};

pub fn handler() -> Box<dyn SiteHandler> {
    Box::new(SpecHandler::new(&SPEC))
}
