//! LinkedIn Easy Apply: a modal wizard opened over the job listing.
//!
//! The listing stays in the DOM behind the modal, so every modal step is
//! listed before the listing state.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::LinkedIn,
    url_patterns: &[r"linkedin\.com/jobs"],
    dom_signatures: &[".jobs-easy-apply-modal", "[data-test-modal]"],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Text("your application was sent"),
                Indicator::Text("application sent"),
            ],
        ),
        (
            FormPage::Login,
            &[
                Indicator::Url("linkedin.com/login"),
                Indicator::Url("linkedin.com/checkpoint"),
                Indicator::Url("linkedin.com/uas/login"),
            ],
        ),
        (
            FormPage::Review,
            &[
                Indicator::Element(Text("submit application")),
                Indicator::Text("review your application"),
            ],
        ),
        (FormPage::Documents, &[Indicator::Element(Kind("file"))]),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Element(IdContains("phoneNumber")),
                Indicator::Text("contact info"),
            ],
        ),
        (
            FormPage::Questions,
            &[
                Indicator::Element(IdContains("easyApplyFormElement")),
                Indicator::Text("additional questions"),
            ],
        ),
        (FormPage::JobListing, &[Indicator::Element(Text("easy apply"))]),
    ],
    fallback_state: FormPage::Unknown,
    passive_states: &[],
    fields: &[
        FieldRule::new(
            &[IdContains("phoneNumber-nationalNumber"), IdContains("phoneNumber")],
            Source::Profile(&["phone"]),
        ),
        FieldRule::new(&[IdContains("GEO-LOCATION")], Source::City),
        FieldRule::new(&[Kind("file")], Source::Resume),
    ],
    apply_buttons: &[TestId("jobs-apply-button"), Text("easy apply")],
    next_buttons: &[
        Text("continue to next step"),
        Text("review your application"),
        Text("next"),
        Text("review"),
        Text("continue"),
    ],
    submit_buttons: &[Text("submit application"), Text("submit")],
    resume_cards: &[],
    consent: ConsentPolicy::Required,
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

    const JOB: &str = "https://www.linkedin.com/jobs/view/3790001234/";

    fn listing_button() -> serde_json::Value {
        json!({"ref": "@e0", "tag": "button", "text": "Easy Apply",
               "ariaLabel": "Easy Apply to Data Engineer at Acme", "visible": true})
    }

    #[test]
    fn listing_clicks_easy_apply() {
        let snap = snapshot(JOB, "Data Engineer at Acme", json!([listing_button()]));
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::JobListing);
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e0")));
    }

    #[test]
    fn contact_step_fills_phone_behind_the_open_modal() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            JOB,
            "Apply to Acme. Contact info",
            json!([
                listing_button(),
                {"ref": "@e1", "tag": "input", "type": "text", "label": "Mobile phone number",
                 "id": "single-line-text-form-component-formElement-urn-li-jobs-applyformcommon-easyApplyFormElement-1-phoneNumber-nationalNumber",
                 "required": true, "visible": true},
                {"ref": "@e2", "tag": "button", "text": "Next", "ariaLabel": "Continue to next step", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::PersonalInfo);
        assert_eq!(handler.fill_current_page(&snap, &ctx), vec![Action::fill("@e1", "555-0100")]);
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e2")));
    }

    #[test]
    fn resume_step_uploads_the_resume() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            JOB,
            "Apply to Acme. Resume",
            json!([
                listing_button(),
                {"ref": "@e1", "tag": "input", "type": "file", "name": "file", "visible": false},
                {"ref": "@e2", "tag": "button", "text": "Next", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Documents);
        assert_eq!(
            handler.fill_current_page(&snap, &ctx),
            vec![Action::upload("@e1", "/tmp/ada.pdf")]
        );
    }

    #[test]
    fn review_step_submits_and_leaves_follow_box_alone() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            JOB,
            "Apply to Acme. Review your application",
            json!([
                listing_button(),
                {"ref": "@e1", "tag": "input", "type": "checkbox",
                 "label": "Follow Acme to stay up to date with their page.", "visible": true},
                {"ref": "@e2", "tag": "button", "text": "Back", "visible": true},
                {"ref": "@e3", "tag": "button", "text": "Submit application", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Review);
        assert!(handler.fill_current_page(&snap, &ctx).is_empty());
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e3")));
    }

    #[test]
    fn sent_dialog_is_confirmation() {
        let snap = snapshot(
            JOB,
            "Your application was sent to Acme!",
            json!([listing_button(), {"ref": "@e1", "tag": "button", "text": "Done", "visible": true}]),
        );
        assert_eq!(handler().detect_page_state(&snap), FormPage::Confirmation);
    }
}
