//! Workday: multi-step wizard keyed by `data-automation-id`.

use super::{
    ConsentPolicy, FieldRule, FormPage, Indicator, Matcher, Site, SiteHandler, SiteSpec, Source,
    SpecHandler,
};

use Matcher::*;

pub static SPEC: SiteSpec = SiteSpec {
    site: Site::Workday,
    url_patterns: &[r"myworkdayjobs\.com", r"workday\.com/.*jobs", r"wd\d+\.myworkdayjobs"],
    dom_signatures: &[
        "[data-automation-id='workday']",
        "[data-automation-id='jobPostingPage']",
        "[class*='workday']",
    ],
    states: &[
        (
            FormPage::Confirmation,
            &[
                Indicator::Element(TestId("applicationSuccessMessage")),
                Indicator::Text("application submitted"),
                Indicator::Text("thank you for applying"),
            ],
        ),
        (
            FormPage::JobListing,
            &[
                Indicator::Element(TestId("jobPostingApplyButton")),
                Indicator::Element(TestId("applyButton")),
            ],
        ),
        (
            FormPage::PersonalInfo,
            &[
                Indicator::Element(TestId("legalNameSection_firstName")),
                Indicator::Element(TestIdContains("legalNameSection")),
                Indicator::Element(TestIdContains("addressSection")),
            ],
        ),
        (
            FormPage::Experience,
            &[
                Indicator::Element(TestIdContains("workExperience")),
                Indicator::Element(Text("add work experience")),
            ],
        ),
        (
            FormPage::Education,
            &[
                Indicator::Element(TestIdContains("education")),
                Indicator::Element(Text("add education")),
            ],
        ),
        (
            FormPage::Documents,
            &[
                Indicator::Element(TestId("file-upload-input-ref")),
                Indicator::Element(TestIdContains("resumeUpload")),
            ],
        ),
        (
            FormPage::Review,
            &[
                Indicator::Element(TestId("bottom-navigation-submit-button")),
                Indicator::Text("review your application"),
            ],
        ),
    ],
    fallback_state: FormPage::Questions,
    passive_states: &[FormPage::Experience, FormPage::Education],
    fields: &[
        FieldRule::new(
            &[TestId("legalNameSection_firstName"), TestId("firstName")],
            Source::FirstName,
        ),
        FieldRule::new(
            &[TestId("legalNameSection_lastName"), TestId("lastName")],
            Source::LastName,
        ),
        FieldRule::new(&[TestId("email"), TestId("emailAddress")], Source::Profile(&["email"])),
        FieldRule::new(&[TestId("phone-number"), TestId("phoneNumber")], Source::Profile(&["phone"])),
        FieldRule::new(
            &[TestId("addressSection_addressLine1")],
            Source::Profile(&["address", "street_address"]),
        ),
        FieldRule::new(&[TestId("addressSection_city")], Source::City),
        FieldRule::new(&[TestId("addressSection_countryRegion")], Source::State),
        FieldRule::new(
            &[TestId("addressSection_postalCode")],
            Source::Profile(&["zip", "postal_code", "zip_code"]),
        ),
        FieldRule::new(
            &[TestId("file-upload-input-ref"), TestIdContains("resumeUpload")],
            Source::Resume,
        ),
        FieldRule::new(
            &[TestId("linkedInUrl"), PlaceholderContains("linkedin")],
            Source::Profile(&["linkedin_url", "linkedin"]),
        ),
    ],
    apply_buttons: &[
        TestId("jobPostingApplyButton"),
        TestId("applyButton"),
        Text("apply manually"),
        Text("apply"),
    ],
    next_buttons: &[
        TestId("bottom-navigation-next-button"),
        TestId("nextButton"),
        Text("save and continue"),
        Text("next"),
        Text("continue"),
    ],
    submit_buttons: &[
        TestId("bottom-navigation-submit-button"),
        TestId("submitButton"),
        Text("submit"),
    ],
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

    const URL: &str = "https://acme.wd5.myworkdayjobs.com/en-US/careers/job/Austin/Engineer_R123/apply";

    #[test]
    fn personal_info_splits_location() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            URL,
            "My Information",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "testId": "legalNameSection_firstName", "label": "Given Name(s)", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "text", "testId": "legalNameSection_lastName", "label": "Family Name", "visible": true},
                {"ref": "@e2", "tag": "input", "type": "text", "testId": "addressSection_city", "label": "City", "visible": true},
                {"ref": "@e3", "tag": "input", "type": "text", "testId": "addressSection_countryRegion", "label": "State", "visible": true},
                {"ref": "@e4", "tag": "button", "testId": "bottom-navigation-next-button", "text": "Save and Continue", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::PersonalInfo);
        assert_eq!(
            handler.fill_current_page(&snap, &ctx),
            vec![
                Action::fill("@e0", "Ada"),
                Action::fill("@e1", "Lovelace"),
                Action::fill("@e2", "Austin"),
                Action::fill("@e3", "TX"),
            ]
        );
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e4")));
    }

    #[test]
    fn experience_page_is_only_advanced() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            URL,
            "My Experience",
            json!([
                {"ref": "@e0", "tag": "button", "testId": "workExperienceSection-add", "text": "Add Work Experience", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "text", "label": "Email", "visible": true},
                {"ref": "@e2", "tag": "button", "testId": "bottom-navigation-next-button", "text": "Save and Continue", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Experience);
        assert!(handler.fill_current_page(&snap, &ctx).is_empty());
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e2")));
    }

    #[test]
    fn review_page_ticks_terms_and_submits() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            URL,
            "Review your application",
            json!([
                {"ref": "@e0", "tag": "input", "type": "checkbox", "label": "I have read the terms", "required": true, "visible": true},
                {"ref": "@e1", "tag": "button", "testId": "bottom-navigation-submit-button", "text": "Submit", "visible": true}
            ]),
        );
        let handler = handler();
        assert_eq!(handler.detect_page_state(&snap), FormPage::Review);
        assert_eq!(handler.fill_current_page(&snap, &ctx), vec![Action::click("@e0")]);
        assert_eq!(handler.advance_page(&snap), Some(Action::click("@e1")));
    }
}
