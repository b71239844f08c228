//! Navigation orchestrator: drives one application attempt from the job URL
//! to a terminal [`ApplicationResult`].
//!
//! ```text
//! Start -> Classify -> {safety abort | login | already applied | closed}
//!                   -> entry click -> redirect wait -> Processing (loop)
//! Processing -> Complete | Stuck | MaxPages | Error
//! ```
//!
//! Everything here is blocking. Run it on a dedicated thread (or
//! `spawn_blocking`); progress goes out on a broadcast channel and
//! cancellation is polled between iterations.

use std::time::Instant;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::answers::AnswerResolver;
use crate::browser::{Page, PopupQueue};
use crate::classifier::{self, Classifier, PageClass};
use crate::completion::{Completion, CompletionDetector};
use crate::config::{DetectorSettings, NavigationSettings};
use crate::dom;
use crate::error::{BrowserError, FlowError};
use crate::executor::{ExecutionReport, Executor};
use crate::payment;
use crate::plan::PlanSource;
use crate::sites::SiteContext;
use crate::stuck::{StuckDetector, content_hash};
use crate::types::{
    Applicant, ApplicationResult, ApplicationStatus, PageKind, ProgressEvent, Snapshot,
};

/// Pause after an iteration that found nothing to work with.
const EMPTY_PAGE_WAIT_MS: u64 = 2000;
/// Pause between the post-plan completion check and the popup check.
const POPUP_SETTLE_MS: u64 = 500;
/// Selectors that mean an in-page application dialog opened.
const DIALOG_SELECTOR: &str = "[role='dialog'], [aria-modal='true']";

/// Why an iteration made no progress. Consecutive strikes only add up while
/// the reason stays the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strike {
    EmptyPage,
    NoPlan,
    NoAdvance,
}

/// Per-attempt state. Dropped when the attempt ends.
struct PageState {
    started: Instant,
    pages_processed: u32,
    strikes: Option<(Strike, u32)>,
    detector: StuckDetector,
    completion: CompletionDetector,
    last_report: ExecutionReport,
}

impl PageState {
    fn new(detector: &DetectorSettings) -> Self {
        Self {
            started: Instant::now(),
            pages_processed: 0,
            strikes: None,
            detector: StuckDetector::new(detector.clone()),
            completion: CompletionDetector::new(),
            last_report: ExecutionReport::default(),
        }
    }

    /// Record a strike and return the current run length for its kind.
    fn strike(&mut self, kind: Strike) -> u32 {
        let count = match self.strikes {
            Some((last, count)) if last == kind => count + 1,
            _ => 1,
        };
        self.strikes = Some((kind, count));
        warn!(?kind, strikes = count, "no progress");
        count
    }

    fn clear_strikes(&mut self) {
        self.strikes = None;
    }
}

/// Result of one step that either continues the attempt or ends it.
enum Step {
    Continue,
    Done(ApplicationStatus, String),
}

pub struct Navigator<'a, P: Page + ?Sized> {
    page: &'a P,
    plans: &'a PlanSource,
    applicant: &'a Applicant,
    resolver: &'a AnswerResolver,
    settings: NavigationSettings,
    detector: DetectorSettings,
    popups: Option<&'a PopupQueue>,
    events: Option<broadcast::Sender<ProgressEvent>>,
    cancel: CancellationToken,
}

impl<'a, P: Page + ?Sized> Navigator<'a, P> {
    pub fn new(
        page: &'a P,
        plans: &'a PlanSource,
        applicant: &'a Applicant,
        resolver: &'a AnswerResolver,
        settings: NavigationSettings,
        detector: DetectorSettings,
    ) -> Self {
        Self {
            page,
            plans,
            applicant,
            resolver,
            settings,
            detector,
            popups: None,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_popups(mut self, popups: &'a PopupQueue) -> Self {
        self.popups = Some(popups);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one application attempt. Never fails; every outcome is a result.
    pub fn apply(&self, url: &str) -> ApplicationResult {
        info!(%url, "starting application");
        self.emit(ProgressEvent::Started { url: url.to_string() });

        let mut state = PageState::new(&self.detector);
        let (status, message) = match self.run(url, &mut state) {
            Ok(Step::Done(status, message)) => (status, message),
            Ok(Step::Continue) => (ApplicationStatus::Error, "Attempt ended without a result".to_string()),
            Err(err) => fold_error(err),
        };

        let result = ApplicationResult::new(status, message, state.pages_processed, self.page.current_url());
        match result.status {
            ApplicationStatus::Success => info!(message = %result.message, pages = result.pages_processed, "application finished"),
            _ => warn!(status = ?result.status, message = %result.message, pages = result.pages_processed, "application finished"),
        }
        self.emit(ProgressEvent::Finished { result: result.clone() });
        result
    }

    fn run(&self, url: &str, state: &mut PageState) -> Result<Step, FlowError> {
        if let Step::Done(status, message) = self.enter(url)? {
            return Ok(Step::Done(status, message));
        }
        self.process(state)
    }

    /// Landing page: classify, click the entry button, follow the redirect.
    fn enter(&self, url: &str) -> Result<Step, FlowError> {
        if self.cancel.is_cancelled() {
            return Ok(cancelled());
        }
        self.navigate(url)?;
        self.page.wait(self.settings.post_plan_wait_ms);
        self.page.dismiss_overlays();

        let (classification, snapshot) = Classifier::new(self.page).classify()?;
        self.emit(ProgressEvent::Classified {
            kind: classification.class.to_string(),
        });

        if self.settings.easy_apply_only && classifier::is_external_only(&snapshot) {
            return Ok(Step::Done(
                ApplicationStatus::Skipped,
                "External application - Easy Apply only".to_string(),
            ));
        }

        match classification.class {
            PageClass::PaymentDanger => {
                warn!(%url, "payment page at entry");
                return Err(FlowError::SafetyAbort("Payment page detected - safety abort".to_string()));
            }
            PageClass::AccountCreation => {
                warn!(%url, "account creation page at entry");
                return Err(FlowError::SafetyAbort(
                    "Account creation page detected - safety abort".to_string(),
                ));
            }
            PageClass::LoginRequired => {
                return Ok(Step::Done(
                    ApplicationStatus::NeedsLogin,
                    "Login required - please authenticate in browser".to_string(),
                ));
            }
            PageClass::AlreadyApplied => {
                return Ok(Step::Done(
                    ApplicationStatus::Failed,
                    "Already applied to this job".to_string(),
                ));
            }
            PageClass::Closed => {
                return Ok(Step::Done(
                    ApplicationStatus::Failed,
                    "Job is closed or no longer accepting applications".to_string(),
                ));
            }
            PageClass::Unknown => {
                // No entry candidate: the landing page may be the form itself.
                debug!("no entry candidate");
                return Ok(Step::Continue);
            }
            PageClass::EasyApply | PageClass::ExternalLink => {}
        }

        let start_url = self.page.current_url();
        if !Classifier::new(self.page).click_apply(&snapshot)? {
            return Ok(Step::Done(
                ApplicationStatus::NoApplyButton,
                "Could not find Apply button".to_string(),
            ));
        }
        if !self.wait_for_redirect(&start_url) {
            return Ok(cancelled());
        }

        if let Some(platform) = classifier::login_platform(&self.page.current_url()) {
            return Ok(Step::Done(
                ApplicationStatus::NeedsLogin,
                format!(
                    "Login required for {} ATS - please authenticate in browser",
                    platform.to_uppercase()
                ),
            ));
        }
        Ok(Step::Continue)
    }

    /// Wait for a popup, a same-tab URL change or an application dialog.
    /// Returns `false` only when cancelled.
    fn wait_for_redirect(&self, start_url: &str) -> bool {
        let deadline = Instant::now() + self.settings.redirect_timeout();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if self.follow_popup() {
                return true;
            }
            let current = self.page.current_url();
            if current != start_url {
                info!(url = %current, "redirected after entry click");
                return true;
            }
            if self.page.has_match(DIALOG_SELECTOR) {
                debug!("application dialog opened");
                return true;
            }
            if Instant::now() >= deadline {
                debug!("no redirect after entry click, continuing on the same page");
                return true;
            }
            self.page.wait(self.settings.popup_poll_ms);
        }
    }

    fn process(&self, state: &mut PageState) -> Result<Step, FlowError> {
        let limit = self.settings.no_progress_limit.max(1);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(cancelled());
            }
            let elapsed = state.started.elapsed();
            if elapsed > self.settings.timeout() {
                return Ok(Step::Done(
                    ApplicationStatus::Stuck,
                    format!("Timed out after {:.1}s", elapsed.as_secs_f64()),
                ));
            }
            if state.pages_processed >= self.settings.max_pages {
                return Ok(Step::Done(
                    ApplicationStatus::MaxPagesReached,
                    format!("Reached max pages ({})", self.settings.max_pages),
                ));
            }
            state.pages_processed += 1;
            self.page.dismiss_overlays();

            let snapshot = self.extract()?;
            self.emit(ProgressEvent::PageStarted {
                number: state.pages_processed,
                url: snapshot.url.clone(),
                elements: snapshot.element_count,
            });
            info!(
                page = state.pages_processed,
                url = %snapshot.url,
                elements = snapshot.element_count,
                "processing page"
            );

            self.check_safety(&snapshot)?;

            if let Some(done) = self.check_completion(state, &snapshot) {
                return Ok(done);
            }

            if snapshot.element_count == 0 {
                if state.strike(Strike::EmptyPage) >= limit {
                    return Ok(Step::Done(
                        ApplicationStatus::Stuck,
                        "No interactive elements found".to_string(),
                    ));
                }
                self.page.wait(EMPTY_PAGE_WAIT_MS);
                continue;
            }

            state.detector.record(
                &snapshot.url,
                snapshot.element_count,
                &content_hash(&fingerprint(&snapshot)),
                state.last_report.executed,
                state.last_report.success(),
            );
            if let Some(reason) = state.detector.is_stuck() {
                warn!(%reason, "loop detected");
                return Err(FlowError::LoopDetected(reason.to_string()));
            }

            let ctx = SiteContext {
                applicant: self.applicant,
                resolver: self.resolver,
            };
            let probe = |css: &str| self.page.has_match(css);
            let planned = match self.plans.plan_for(&snapshot, &ctx, &probe) {
                Some(planned) if planned.plan.page_type == PageKind::Confirmation => {
                    if self.completion_allowed(state) {
                        return Ok(Step::Done(
                            ApplicationStatus::Success,
                            format!("Application submitted ({}: confirmation page)", planned.origin),
                        ));
                    }
                    debug!(origin = %planned.origin, "confirmation verdict before any form was filled");
                    self.plans.form_plan_for(&snapshot, &ctx)
                }
                planned => planned,
            };
            let Some(planned) = planned else {
                if state.strike(Strike::NoPlan) >= limit {
                    return Err(FlowError::PlanUnavailable("Failed to analyze form".to_string()));
                }
                self.page.wait(EMPTY_PAGE_WAIT_MS);
                continue;
            };
            self.emit(ProgressEvent::PlanReady {
                source: planned.origin.to_string(),
                actions: planned.plan.actions.len(),
                reasoning: planned.plan.reasoning.clone(),
            });
            if planned.plan.fills_anything() {
                state.completion.mark_form_filled();
            }

            self.page.dismiss_overlays();
            let report = Executor::new(self.page, self.settings.settle_ms).run(&snapshot, &planned.plan);
            for (action, message) in &report.failed {
                self.emit(ProgressEvent::ActionFailed {
                    action: action.clone(),
                    message: message.clone(),
                });
            }
            state.last_report = report;

            self.page.wait(self.settings.post_plan_wait_ms);
            let after = self.extract()?;
            if let Some(done) = self.check_completion(state, &after) {
                return Ok(done);
            }

            self.page.wait(POPUP_SETTLE_MS);
            if self.follow_popup() {
                state.clear_strikes();
                continue;
            }

            let current_url = self.page.current_url();
            let moved = current_url != snapshot.url || after.element_count != snapshot.element_count;
            if moved {
                state.clear_strikes();
                self.emit(ProgressEvent::Advanced { url: current_url });
            } else if !self.advance(&after) {
                if state.strike(Strike::NoAdvance) >= limit {
                    return Ok(Step::Done(
                        ApplicationStatus::Stuck,
                        "Could not advance to next page".to_string(),
                    ));
                }
            } else {
                state.clear_strikes();
            }
        }
    }

    /// Click the explicit advance button of an unchanged page.
    fn advance(&self, snapshot: &Snapshot) -> bool {
        let probe = |css: &str| self.page.has_match(css);
        let Some(action) = self.plans.advance_for(snapshot, &probe) else {
            debug!("no advance button");
            return false;
        };
        match Executor::new(self.page, self.settings.settle_ms).execute_one(snapshot, &action) {
            Ok(()) => {
                self.emit(ProgressEvent::Advanced {
                    url: self.page.current_url(),
                });
                true
            }
            Err(err) => {
                warn!(error = %err, "advance click failed");
                false
            }
        }
    }

    /// Payment and account-creation pages end the attempt immediately.
    fn check_safety(&self, snapshot: &Snapshot) -> Result<(), FlowError> {
        let html = self.page.content().unwrap_or_default();
        let decision = payment::assess(&snapshot.url, &html);
        if decision.should_block {
            warn!(url = %snapshot.url, reason = ?decision.reason, "payment page, aborting");
            return Err(FlowError::SafetyAbort("Payment page detected - safety abort".to_string()));
        }
        if classifier::is_account_creation(&snapshot.url, &snapshot.text) {
            warn!(url = %snapshot.url, "account creation page, aborting");
            return Err(FlowError::SafetyAbort(
                "Account creation page detected - safety abort".to_string(),
            ));
        }
        Ok(())
    }

    /// Completion verdicts count once enough pages were processed or a form
    /// was filled in this attempt.
    fn completion_allowed(&self, state: &PageState) -> bool {
        state.pages_processed >= self.settings.min_pages_for_completion
            || state.completion.forms_filled()
    }

    fn check_completion(&self, state: &PageState, snapshot: &Snapshot) -> Option<Step> {
        if !self.completion_allowed(state) {
            return None;
        }
        let Completion { signal, details } = state.completion.check_snapshot(snapshot)?;
        Some(Step::Done(
            ApplicationStatus::Success,
            format!("Application submitted ({signal}: {details})"),
        ))
    }

    /// Navigate the primary tab to the newest captured popup URL.
    fn follow_popup(&self) -> bool {
        let Some(url) = self.popups.and_then(PopupQueue::drain_latest) else {
            return false;
        };
        info!(%url, "following popup in primary tab");
        if let Err(err) = self.navigate(&url) {
            warn!(error = %err, "failed to follow popup");
            return false;
        }
        self.page.close_extra_tabs();
        self.emit(ProgressEvent::PopupFollowed { url });
        true
    }

    /// Navigate, tolerating aborts from client-side routing that stay on site.
    fn navigate(&self, url: &str) -> Result<(), FlowError> {
        match self.page.navigate(url) {
            Ok(()) => Ok(()),
            Err(BrowserError::NavigationAborted(reason)) if same_site(&self.page.current_url(), url) => {
                debug!(%reason, "navigation aborted but still on site");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Extract, retrying once after a short settle if the page was mid-navigation.
    fn extract(&self) -> Result<Snapshot, FlowError> {
        match dom::extract(self.page) {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                debug!(error = %err, "extraction failed, retrying");
                self.page.wait(self.settings.post_plan_wait_ms);
                Ok(dom::extract(self.page)?)
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

fn cancelled() -> Step {
    Step::Done(ApplicationStatus::Skipped, "Cancelled".to_string())
}

fn fold_error(err: FlowError) -> (ApplicationStatus, String) {
    let status = match &err {
        FlowError::SafetyAbort(_) => ApplicationStatus::Failed,
        FlowError::LoopDetected(_) | FlowError::PlanUnavailable(_) => ApplicationStatus::Stuck,
        FlowError::NavigationAborted(_)
        | FlowError::ElementNotFound(_)
        | FlowError::ActionExecutionFailed(_) => ApplicationStatus::Error,
    };
    (status, err.to_string())
}

/// Text plus every element's ref, value and checked state.
fn fingerprint(snapshot: &Snapshot) -> String {
    let mut out = snapshot.text.clone();
    for el in &snapshot.elements {
        out.push('\n');
        out.push_str(&el.reference);
        out.push('=');
        out.push_str(el.value.as_deref().unwrap_or_default());
        if el.checked {
            out.push_str(" [x]");
        }
    }
    out
}

/// Host with the `www.` prefix and port dropped, lowercased.
fn host(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default().to_lowercase();
    match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    }
}

/// Both URLs belong to the same registrable site (last two host labels).
pub fn same_site(a: &str, b: &str) -> bool {
    let site = |url: &str| {
        let host = host(url);
        let labels: Vec<&str> = host.rsplit('.').take(2).collect();
        labels.into_iter().rev().collect::<Vec<_>>().join(".")
    };
    let (a, b) = (site(a), site(b));
    !a.is_empty() && a == b
}
