use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::SmartRecruiters,
    url_patterns: &[r"jobs\.smartrecruiters\.com", r"smartrecruiters\.com/.*jobs"],
    dom_signatures: &["[class*='smartrecruiters']", "[data-sr]"],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Element(TestId("confirmation")),
                Indicator::Text("application submitted"),
                Indicator::Text("thank you for applying"),
            ],
        ),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Element(Name("firstName")),
                Indicator::Element(Id("firstName")),
                Indicator::Element(Name("email")),
            ],
        ),
        (
            FormPage::JobListing,
            &[
                Indicator::Element(TestId("apply-button")),
                Indicator::Element(Text("i'm interested")),
            ],
        ),
    ],
    fallback_state: FormPage::Questions,
    passive_states: &[],
    fields: &[
        FieldRule::new(
            &[Name("firstName"), Id("firstName"), Autocomplete("given-name")],
            Source::FirstName,
        ),
        FieldRule::new(
            &[Name("lastName"), Id("lastName"), Autocomplete("family-name")],
            Source::LastName,
        ),
        FieldRule::new(&[Name("email"), Id("email"), Kind("email")], Source::Profile(&["email"])),
        FieldRule::new(&[Name("phone"), Id("phone"), Kind("tel")], Source::Profile(&["phone"])),
        FieldRule::new(&[TestId("resume-upload"), Kind("file")], Source::Resume),
        FieldRule::new(
            &[NameContains("linkedin"), PlaceholderContains("linkedin")],
            Source::Profile(&["linkedin_url", "linkedin"]),
        ),
    ],
    apply_buttons: &[TestId("apply-button"), Text("i'm interested"), Text("apply now"), Text("apply")],
    next_buttons: &[TestId("next-button"), Text("next"), Text("continue")],
    submit_buttons: &[TestId("submit-button"), Text("submit application"), Text("submit")],
    resume_cards: &[],
    consent: ConsentPolicy::All,
};

pub fn handler() -> Box<dyn SiteHandler> {
    Box::new(SpecHandler::new(&SPEC))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteContext;
    use crate::sites::test_support::{applicant, resolver, snapshot};
    use crate::types::Action;
    use serde_json::json;

    #[test]
    fn single_page_form_submits_when_no_next_button() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://jobs.smartrecruiters.com/Acme/743999-engineer/apply",
            "Personal information",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "name": "firstName", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "text", "name": "lastName", "visible": true},
                {"ref": "@e2", "tag": "input", "type": "file", "testId": "resume-upload", "visible": false},
                {"ref": "@e3", "tag": "button", "testId": "submit-button", "text": "Submit", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::PersonalInfo);
        assert_eq!(
            handler.fill_current_page(&snap, &ctx),
            vec![
                Action::fill("@e0", "Ada"),
                Action::fill("@e1", "Lovelace"),
                Action::upload("@e2", "/tmp/ada.pdf"),
            ]
        );
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e3")));
    }

    #[test]
    fn confirmation_element_is_detected() {
        let snap = snapshot(
            "https://jobs.smartrecruiters.com/Acme/743999-engineer",
            "",
            json!([{"ref": "@e0", "tag": "a", "testId": "confirmation", "text": "Back to jobs", "visible": true}]),
        );
        assert_eq!(handler().detect_page_state(&snap), FormPage::Confirmation);
    }
}
