//! Phenom-hosted career sites (`data-ph-at-id` automation hooks).

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Phenom,
    url_patterns: &[r"phenom\.com", r"/us/en/job/", r"/us/en/apply"],
    dom_signatures: &["[data-ph-id]", "[data-ph-at-id]", "[class*='phenom']"],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Url("/confirmation"),
                Indicator::Text("thank you for applying"),
                Indicator::Text("application submitted"),
            ],
        ),
        (
            FormPage::Login,
            &[Indicator::Url("/login"), Indicator::Element(Kind("password"))],
        ),
        (
            FormPage::JobListing,
            &[Indicator::Element(Id("link-apply")), Indicator::Element(TestId("apply-link"))],
        ),
    ],
    fallback_state: FormPage::PersonalInfo,
    passive_states: &[],
    fields: &[
        FieldRule::new(&[Id("email"), Name("email"), Kind("email")], Source::Profile(&["email"])),
        FieldRule::new(&[Id("firstName"), Name("firstName")], Source::FirstName),
        FieldRule::new(&[Id("lastName"), Name("lastName")], Source::LastName),
        FieldRule::new(&[Id("phone"), Name("phone"), Kind("tel")], Source::Profile(&["phone"])),
        FieldRule::new(&[Id("city"), Name("city")], Source::City),
        FieldRule::new(&[Kind("file")], Source::Resume),
    ],
    apply_buttons: &[Id("link-apply"), TestId("apply-link"), Text("apply")],
    next_buttons: &[Id("next"), TestId("next-button"), Text("next"), Text("continue")],
    submit_buttons: &[Id("submit"), TestId("submit-button"), Text("submit")],
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
    fn listing_then_form() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let handler = handler();

        let listing = snapshot(
            "https://careers.acme.example/us/en/job/R1/engineer",
            "Engineer",
            json!([{"ref": "@e0", "tag": "a", "testId": "apply-link", "text": "Apply now", "visible": true}]),
        );
        assert_eq!(handler.detect_page_state(&listing), FormPage::JobListing);
        assert_eq!(handler.advance_page(&listing), Some(Action::click("@e0")));

        let form = snapshot(
            "https://careers.acme.example/us/en/apply?jobSeqNo=R1",
            "Apply",
            json!([
                {"ref": "@e0", "tag": "input", "type": "email", "id": "email", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "checkbox", "label": "Keep me updated", "visible": true},
                {"ref": "@e2", "tag": "button", "testId": "next-button", "text": "Next", "visible": true}
            ]),
        );
        assert_eq!(handler.detect_page_state(&form), FormPage::PersonalInfo);
        assert_eq!(
            handler.fill_current_page(&form, &ctx),
            vec![Action::fill("@e0", "ada@example.com"), Action::click("@e1")]
        );
        assert_eq!(handler.advance_page(&form), Some(Action::click("@e2")));
    }
}
