//! iCIMS: portal wizard, often behind its own login.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Icims,
    url_patterns: &[r"icims\.com", r"careers-.*\.icims\.com", r"\.icims\.com/jobs"],
    dom_signatures: &["[class*='icims']", "#icims_content"],
    states: &[
        (
            FormPage::Login,
            &[
                Indicator::Url("/login"),
                Indicator::Element(Kind("password")),
                Indicator::Element(Id("login")),
            ],
        ),
        (
            FormPage::Confirmation,
            &[
                Indicator::Text("application submitted"),
                Indicator::Text("submitted successfully"),
                Indicator::Text("thank you for applying"),
            ],
        ),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Element(Id("Contact_Information_email")),
                Indicator::Text("contact information"),
            ],
        ),
        (
            FormPage::Questions,
            &[
                Indicator::Element(NameContains("position_specific")),
                Indicator::Text("position specific questions"),
            ],
        ),
        (
            FormPage::Review,
            &[Indicator::Text("review your application"), Indicator::Text("summary")],
        ),
        (FormPage::JobListing, &[Indicator::Element(Id("link-apply"))]),
    ],
    fallback_state: FormPage::Unknown,
    passive_states: &[],
    fields: &[
        FieldRule::new(
            &[Id("Contact_Information_firstname"), NameContains("firstname")],
            Source::FirstName,
        ),
        FieldRule::new(
            &[Id("Contact_Information_lastname"), NameContains("lastname")],
            Source::LastName,
        ),
        FieldRule::new(
            &[Id("Contact_Information_email"), NameContains("email"), Kind("email")],
            Source::Profile(&["email"]),
        ),
        FieldRule::new(
            &[Id("Contact_Information_phone"), NameContains("phone"), Kind("tel")],
            Source::Profile(&["phone"]),
        ),
        FieldRule::new(&[Id("Contact_Information_city"), NameContains("city")], Source::City),
        FieldRule::new(&[Id("resumeUpload"), Kind("file")], Source::Resume),
    ],
    apply_buttons: &[Id("link-apply"), Text("apply for this job"), Text("apply")],
    next_buttons: &[Id("next"), Text("next"), Text("continue")],
    submit_buttons: &[Id("submit"), Text("submit")],
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
    fn login_page_is_left_alone() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers-acme.icims.com/jobs/42/login",
            "Sign In",
            json!([
                {"ref": "@e0", "tag": "input", "type": "email", "label": "Email", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "password", "label": "Password", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Login);
        assert!(handler.fill_current_page(&snap, &ctx).is_empty());
        assert_eq!(handler.advance_page(&snap), None);
    }

    #[test]
    fn contact_information_uses_portal_ids() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers-acme.icims.com/jobs/42/candidate",
            "Contact Information",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "id": "Contact_Information_email", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "text", "id": "Contact_Information_city", "visible": true},
                {"ref": "@e2", "tag": "button", "id": "next", "text": "Next", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::PersonalInfo);
        assert_eq!(
            handler.fill_current_page(&snap, &ctx),
            vec![Action::fill("@e0", "ada@example.com"), Action::fill("@e1", "Austin")]
        );
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e2")));
    }
}
