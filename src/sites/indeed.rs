//! Indeed Apply (`smartapply.indeed.com`) wizard.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Indeed,
    url_patterns: &[r"smartapply\.indeed\.com", r"indeed\.com/applystart", r"indeedapply"],
    dom_signatures: &["[data-testid='indeedApply']", ".indeed-apply", "[class*='ia-']"],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Url("/post-apply"),
                Indicator::Url("postapplyjobid"),
                Indicator::Element(TestId("ia-success")),
                Indicator::Text("application submitted"),
                Indicator::Text("your application has been submitted"),
            ],
        ),
        (
            FormPage::Login,
            &[Indicator::Url("/account/login"), Indicator::Element(Id("loginForm"))],
        ),
        (FormPage::Documents, &[Indicator::Url("/resume")]),
        (FormPage::Review, &[Indicator::Url("/review-module"), Indicator::Url("/review")]),
        (FormPage::Questions, &[Indicator::Url("smartapply.indeed.com")]),
        (FormPage::JobListing, &[Indicator::Url("indeed.com/viewjob")]),
    ],
    fallback_state: FormPage::Unknown,
    passive_states: &[],
    fields: &[
        FieldRule::new(&[Id("firstName"), Name("firstName")], Source::FirstName),
        FieldRule::new(&[Id("lastName"), Name("lastName")], Source::LastName),
        FieldRule::new(&[Id("email"), Name("email")], Source::Profile(&["email"])),
        FieldRule::new(&[Id("phone"), Name("phone"), Kind("tel")], Source::Profile(&["phone"])),
        FieldRule::new(&[Kind("file")], Source::Resume),
    ],
    apply_buttons: &[TestId("indeedApply-button"), Id("indeedApplyButton"), Text("apply now")],
    next_buttons: &[TestId("ia-continueButton"), Text("continue"), Text("next")],
    submit_buttons: &[
        TestId("ia-submit-button"),
        Text("submit your application"),
        Text("submit"),
    ],
    resume_cards: &[
        TestIdContains("structured-resume"),
        TestIdContains("resume-selection"),
        Text("indeed resume"),
    ],
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

    #[test]
    fn resume_step_picks_the_stored_resume_card() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://smartapply.indeed.com/beta/indeedapply/form/resume",
            "Add a resume for the employer",
            json!([
                {"ref": "@e0", "tag": "div", "role": "button", "testId": "structured-resume-card", "text": "Indeed Resume", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "file", "visible": false},
                {"ref": "@e2", "tag": "button", "testId": "ia-continueButton", "text": "Continue", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Documents);
        assert_eq!(handler.fill_current_page(&snap, &ctx), vec![Action::click("@e0")]);
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e2")));
    }

    #[test]
    fn review_step_submits() {
        let snap = snapshot(
            "https://smartapply.indeed.com/beta/indeedapply/form/review-module",
            "Please review your application",
            json!([
                {"ref": "@e0", "tag": "button", "text": "Continue", "visible": true},
                {"ref": "@e1", "tag": "button", "testId": "ia-submit-button", "text": "Submit your application", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Review);
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e1")));
    }

    #[test]
    fn questions_tick_agreement_and_required_boxes_only() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://smartapply.indeed.com/beta/indeedapply/form/questions/1",
            "Answer these questions from the employer",
            json!([
                {"ref": "@e0", "tag": "input", "type": "checkbox", "testId": "agree-checkbox", "label": "Send me updates", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "checkbox", "label": "Subscribe to newsletter", "visible": true},
                {"ref": "@e2", "tag": "input", "type": "checkbox", "label": "Share my profile", "required": true, "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Questions);
        assert_eq!(
            handler.fill_current_page(&snap, &ctx),
            vec![Action::click("@e0"), Action::click("@e2")]
        );
    }

    #[test]
    fn post_apply_url_is_confirmation() {
        let snap = snapshot("https://www.indeed.com/viewjob?jk=1&postApplyJobId=1", "", json!([]));
        assert_eq!(handler().detect_page_state(&snap), FormPage::Confirmation);
    }
}
