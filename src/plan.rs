//! Plan acquisition: site handler first, then the model, then the generic
//! rule pass.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::brain::{self, FormAnalyzer};
use crate::dom;
use crate::sites::{FormPage, HandlerRegistry, Site, SiteContext, SiteHandler, answer_questions};
use crate::types::{Action, ActionPlan, PageKind, Snapshot};

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOrigin {
    Site(Site),
    Model,
    Generic,
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOrigin::Site(site) => write!(f, "site:{site}"),
            PlanOrigin::Model => f.write_str("model"),
            PlanOrigin::Generic => f.write_str("generic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPage {
    pub plan: ActionPlan,
    pub origin: PlanOrigin,
}

pub type SharedAnalyzer = Box<dyn FormAnalyzer + Send + Sync>;

pub struct PlanSource {
    registry: HandlerRegistry,
    analyzer: Option<SharedAnalyzer>,
}

impl PlanSource {
    pub fn new(registry: HandlerRegistry, analyzer: Option<SharedAnalyzer>) -> Self {
        Self { registry, analyzer }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Ordered plan for `snapshot`, or `None` when no strategy produced one.
    ///
    /// `probe` answers DOM-signature queries for site detection.
    pub fn plan_for(
        &self,
        snapshot: &Snapshot,
        ctx: &SiteContext<'_>,
        probe: &dyn Fn(&str) -> bool,
    ) -> Option<PlannedPage> {
        let handler = self.registry.resolve(&snapshot.url, probe);

        let planned = handler
            .as_deref()
            .and_then(|h| site_plan(h, snapshot, ctx))
            .or_else(|| self.model_plan(snapshot, ctx))
            .or_else(|| generic_plan(snapshot, ctx));

        finish(planned, snapshot, ctx)
    }

    /// Like [`plan_for`](Self::plan_for), but only model and generic plans
    /// that act on the page. Used when a confirmation verdict cannot be
    /// trusted yet.
    pub fn form_plan_for(&self, snapshot: &Snapshot, ctx: &SiteContext<'_>) -> Option<PlannedPage> {
        let planned = self
            .model_plan(snapshot, ctx)
            .filter(|p| p.plan.page_type != PageKind::Confirmation)
            .or_else(|| generic_plan(snapshot, ctx));
        finish(planned, snapshot, ctx)
    }

    /// The explicit advance click for a page that did not move on its own.
    pub fn advance_for(&self, snapshot: &Snapshot, probe: &dyn Fn(&str) -> bool) -> Option<Action> {
        self.registry
            .resolve(&snapshot.url, probe)
            .and_then(|h| h.advance_page(snapshot))
            .or_else(|| {
                dom::find_next_buttons(snapshot)
                    .first()
                    .map(|el| Action::click(el.reference.clone()))
            })
    }

    fn model_plan(&self, snapshot: &Snapshot, ctx: &SiteContext<'_>) -> Option<PlannedPage> {
        let analyzer = self.analyzer.as_deref()?;
        let plan = brain::analyze_form(
            analyzer,
            snapshot,
            &ctx.applicant.profile,
            ctx.applicant.resume_path(),
        )?;
        Some(PlannedPage {
            plan,
            origin: PlanOrigin::Model,
        })
    }
}

fn finish(
    planned: Option<PlannedPage>,
    snapshot: &Snapshot,
    ctx: &SiteContext<'_>,
) -> Option<PlannedPage> {
    let Some(mut planned) = planned else {
        warn!(url = %snapshot.url, "no plan source produced a plan");
        return None;
    };
    if planned.plan.page_type != PageKind::Confirmation {
        inject_resume_upload(&mut planned.plan, snapshot, ctx);
    }
    info!(
        origin = %planned.origin,
        actions = planned.plan.actions.len(),
        "plan ready"
    );
    Some(planned)
}

fn page_kind(state: FormPage) -> PageKind {
    match state {
        FormPage::JobListing => PageKind::JobListing,
        FormPage::Confirmation => PageKind::Confirmation,
        FormPage::Unknown | FormPage::Login => PageKind::Unknown,
        _ => PageKind::Form,
    }
}

fn site_plan(
    handler: &dyn SiteHandler,
    snapshot: &Snapshot,
    ctx: &SiteContext<'_>,
) -> Option<PlannedPage> {
    let state = handler.detect_page_state(snapshot);
    let origin = PlanOrigin::Site(handler.site());
    debug!(%origin, ?state, "site page state");

    if state == FormPage::Confirmation {
        return Some(PlannedPage {
            plan: ActionPlan::new(PageKind::Confirmation, format!("{origin}: confirmation"), Vec::new()),
            origin,
        });
    }

    let mut actions = handler.fill_current_page(snapshot, ctx);
    actions.extend(handler.advance_page(snapshot));
    if actions.is_empty() {
        debug!(%origin, ?state, "site handler had nothing to do");
        return None;
    }
    Some(PlannedPage {
        plan: ActionPlan::new(page_kind(state), format!("{origin}: {state:?}"), actions),
        origin,
    })
}

/// Resolver-driven pass over any form: answer what can be answered, then
/// click the first advance button.
pub fn generic_plan(snapshot: &Snapshot, ctx: &SiteContext<'_>) -> Option<PlannedPage> {
    let mut used = HashSet::new();
    let mut actions = Vec::new();
    answer_questions(snapshot, ctx.resolver, &mut used, &mut actions);

    let advance = dom::find_next_buttons(snapshot)
        .first()
        .map(|el| Action::click(el.reference.clone()));
    let kind = if actions.is_empty() && advance.is_none() {
        return None;
    } else if actions.is_empty() {
        PageKind::Unknown
    } else {
        PageKind::Form
    };
    actions.extend(advance);
    Some(PlannedPage {
        plan: ActionPlan::new(kind, "generic form pass", actions),
        origin: PlanOrigin::Generic,
    })
}

/// Put a resume upload in front of the plan when the page has a resume slot
/// nothing in the plan targets yet.
fn inject_resume_upload(plan: &mut ActionPlan, snapshot: &Snapshot, ctx: &SiteContext<'_>) {
    let Some(resume) = ctx.applicant.resume_path() else {
        return;
    };
    let Some(input) = dom::find_resume_upload(snapshot) else {
        return;
    };
    if plan.actions.iter().any(|a| a.reference() == Some(input.reference.as_str())) {
        return;
    }
    debug!(reference = %input.reference, "injecting resume upload");
    plan.actions.insert(
        0,
        Action::upload(input.reference.clone(), resume.to_string_lossy().into_owned()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockFormAnalyzer;
    use crate::error::AnalyzerError;
    use crate::sites::test_support::{applicant, resolver, snapshot};
    use crate::types::{Applicant, Profile};
    use serde_json::json;

    fn no_dom(_: &str) -> bool {
        false
    }

    #[test]
    fn email_and_submit_yield_exactly_fill_then_click() {
        let applicant = Applicant {
            profile: [("email", "a@b.com")].into_iter().collect::<Profile>(),
            resume: None,
        };
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers.acme.example/apply",
            "",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "label": "Email", "visible": true},
                {"ref": "@e1", "tag": "button", "type": "submit", "text": "Submit", "visible": true}
            ]),
        );
        let source = PlanSource::new(HandlerRegistry::with_builtin(), None);
        let planned = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(planned.origin, PlanOrigin::Generic);
        assert_eq!(
            planned.plan.actions,
            vec![Action::fill("@e0", "a@b.com"), Action::click("@e1")]
        );
    }

    #[test]
    fn model_is_used_when_no_site_matches() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers.acme.example/apply",
            "",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "label": "Preferred pronouns", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "file", "name": "cv", "visible": true},
                {"ref": "@e2", "tag": "button", "text": "Continue", "visible": true}
            ]),
        );
        let mut analyzer = MockFormAnalyzer::new();
        analyzer.expect_analyze().times(1).returning(|_| {
            Ok(r#"{"page_type": "form", "reasoning": "r", "actions": [
                {"action": "fill", "ref": "@e0", "value": "she/her"},
                {"action": "click", "ref": "@e2"}]}"#
                .to_string())
        });
        let source = PlanSource::new(HandlerRegistry::with_builtin(), Some(Box::new(analyzer)));
        let planned = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(planned.origin, PlanOrigin::Model);
        assert_eq!(
            planned.plan.actions,
            vec![
                Action::upload("@e1", "/tmp/ada.pdf"),
                Action::fill("@e0", "she/her"),
                Action::click("@e2"),
            ]
        );
    }

    #[test]
    fn resume_is_uploaded_next_to_other_documents() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers.acme.example/apply",
            "",
            json!([
                {"ref": "@e0", "tag": "input", "type": "file", "name": "cover_letter", "label": "Cover letter", "visible": true},
                {"ref": "@e1", "tag": "input", "type": "file", "name": "resume", "label": "Resume/CV", "visible": true},
                {"ref": "@e2", "tag": "button", "text": "Continue", "visible": true}
            ]),
        );
        let mut analyzer = MockFormAnalyzer::new();
        analyzer.expect_analyze().times(1).returning(|_| {
            Ok(r#"{"page_type": "form", "reasoning": "r", "actions": [
                {"action": "upload", "ref": "@e0", "file": "/tmp/cover.pdf"},
                {"action": "click", "ref": "@e2"}]}"#
                .to_string())
        });
        let source = PlanSource::new(HandlerRegistry::with_builtin(), Some(Box::new(analyzer)));
        let planned = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(
            planned.plan.actions,
            vec![
                Action::upload("@e1", "/tmp/ada.pdf"),
                Action::upload("@e0", "/tmp/cover.pdf"),
                Action::click("@e2"),
            ]
        );
    }

    #[test]
    fn rejected_model_plan_falls_back_to_generic_pass() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers.acme.example/apply",
            "",
            json!([{"ref": "@e0", "tag": "button", "text": "Next", "visible": true}]),
        );
        let mut analyzer = MockFormAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Err(AnalyzerError::Api { status: 500, message: "down".into() }));
        let source = PlanSource::new(HandlerRegistry::with_builtin(), Some(Box::new(analyzer)));
        let planned = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(planned.origin, PlanOrigin::Generic);
        assert_eq!(planned.plan.actions, vec![Action::click("@e0")]);
    }

    #[test]
    fn site_handler_wins_and_confirmation_has_no_actions() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://boards.greenhouse.io/acme/jobs/1",
            "Thank you for applying!",
            json!([{"ref": "@e0", "tag": "input", "type": "file", "name": "resume", "visible": true}]),
        );
        let mut analyzer = MockFormAnalyzer::new();
        analyzer.expect_analyze().never();
        let source = PlanSource::new(HandlerRegistry::with_builtin(), Some(Box::new(analyzer)));
        let planned = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(planned.origin, PlanOrigin::Site(Site::Greenhouse));
        assert_eq!(planned.plan.page_type, PageKind::Confirmation);
        assert!(planned.plan.actions.is_empty());
    }

    #[test]
    fn form_plan_skips_site_confirmation_verdict() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://boards.greenhouse.io/acme/jobs/1",
            "Thank you for applying to our team in advance",
            json!([
                {"ref": "@e0", "tag": "input", "type": "text", "label": "Email", "visible": true},
                {"ref": "@e1", "tag": "button", "type": "submit", "text": "Submit", "visible": true}
            ]),
        );
        let source = PlanSource::new(HandlerRegistry::with_builtin(), None);
        let site = source.plan_for(&snap, &ctx, &no_dom).unwrap();
        assert_eq!(site.plan.page_type, PageKind::Confirmation);

        let form = source.form_plan_for(&snap, &ctx).unwrap();
        assert_eq!(form.origin, PlanOrigin::Generic);
        assert_eq!(
            form.plan.actions,
            vec![Action::fill("@e0", "ada@example.com"), Action::click("@e1")]
        );
    }

    #[test]
    fn nothing_actionable_is_no_plan() {
        let applicant = applicant();
        let resolver = resolver(&applicant);
        let ctx = SiteContext { applicant: &applicant, resolver: &resolver };
        let snap = snapshot(
            "https://careers.acme.example/apply",
            "",
            json!([{"ref": "@e0", "tag": "a", "text": "Privacy policy", "href": "/privacy", "visible": true}]),
        );
        let source = PlanSource::new(HandlerRegistry::with_builtin(), None);
        assert!(source.plan_for(&snap, &ctx, &no_dom).is_none());
        assert_eq!(source.advance_for(&snap, &no_dom), None);
    }
}
