//! Action Executor: applies typed actions against snapshot refs.

use tracing::{debug, info, warn};

use crate::browser::{HitTarget, Page};
use crate::error::{ActionError, BrowserError};
use crate::types::{Action, ActionPlan, Element, Locator, Snapshot};

/// Pause between typing into a combobox and confirming the suggestion.
const COMBOBOX_SETTLE_MS: u64 = 300;

/// Outcome of running one plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: usize,
    pub succeeded: usize,
    /// `(action name, error message)` for every action that did not apply.
    pub failed: Vec<(String, String)>,
    /// A non-skippable failure stopped the plan early.
    pub aborted: bool,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        !self.aborted
    }
}

pub struct Executor<'a, P: Page + ?Sized> {
    page: &'a P,
    settle_ms: u64,
}

impl<'a, P: Page + ?Sized> Executor<'a, P> {
    pub fn new(page: &'a P, settle_ms: u64) -> Self {
        Self { page, settle_ms }
    }

    /// Run every action of `plan` against `snapshot`.
    ///
    /// Missing elements skip one action; any other failure stops the plan.
    /// Never returns an error.
    pub fn run(&self, snapshot: &Snapshot, plan: &ActionPlan) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for action in &plan.actions {
            report.executed += 1;
            match self.execute_one(snapshot, action) {
                Ok(()) => report.succeeded += 1,
                Err(err) if err.is_skippable() => {
                    warn!(action = action.name(), error = %err, "skipping action");
                    report.failed.push((action.name().to_string(), err.to_string()));
                }
                Err(err) => {
                    warn!(action = action.name(), error = %err, "action failed, stopping plan");
                    report.failed.push((action.name().to_string(), err.to_string()));
                    report.aborted = true;
                    break;
                }
            }
            self.page.wait(self.settle_ms);
        }
        info!(
            executed = report.executed,
            succeeded = report.succeeded,
            aborted = report.aborted,
            "plan executed"
        );
        report
    }

    /// Soft variant of [`Executor::run`].
    pub fn execute(&self, snapshot: &Snapshot, plan: &ActionPlan) -> bool {
        self.run(snapshot, plan).success()
    }

    /// Execute a single action, failing loudly.
    pub fn execute_one(&self, snapshot: &Snapshot, action: &Action) -> Result<(), ActionError> {
        match action {
            Action::Wait { ms } => {
                self.page.wait(*ms);
                Ok(())
            }
            Action::Fill { reference, value } => {
                let (locator, element) = resolve(snapshot, reference)?;
                self.fill(reference, locator, element, value)
            }
            Action::Select { reference, value } => {
                let (locator, element) = resolve(snapshot, reference)?;
                if element.is_select() {
                    self.page
                        .select_option(locator, value)
                        .map_err(|e| browser("select", reference, e))
                } else {
                    self.fill(reference, locator, element, value)
                }
            }
            Action::Click { reference } => {
                let (locator, _) = resolve(snapshot, reference)?;
                self.click(reference, locator)
            }
            Action::Upload { reference, file } => {
                let (locator, element) = resolve(snapshot, reference)?;
                self.upload(reference, locator, element, file)
            }
        }
    }

    fn fill(
        &self,
        reference: &str,
        locator: &Locator,
        element: &Element,
        value: &str,
    ) -> Result<(), ActionError> {
        let result = if element.is_select() {
            self.page.select_option(locator, value)
        } else if element.is_combobox() {
            self.fill_combobox(locator, value)
        } else {
            self.page.fill(locator, value)
        };
        result.map_err(|e| browser("fill", reference, e))?;
        debug!(reference, "filled");
        Ok(())
    }

    // Autocomplete widgets ignore programmatic values; type and confirm.
    fn fill_combobox(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        self.page.click(locator)?;
        self.page.type_text(locator, value)?;
        self.page.wait(COMBOBOX_SETTLE_MS);
        self.page.press_key("Enter")
    }

    fn click(&self, reference: &str, locator: &Locator) -> Result<(), ActionError> {
        match self.page.hit_test(locator) {
            HitTarget::Top => self
                .page
                .click(locator)
                .or_else(|err| {
                    debug!(reference, error = %err, "native click failed, forcing");
                    self.page.force_click(locator)
                })
                .map_err(|e| browser("click", reference, e)),
            HitTarget::Covered => {
                debug!(reference, "click intercepted, dismissing overlays");
                self.page.dismiss_overlays();
                let result = match self.page.hit_test(locator) {
                    HitTarget::Top => self.page.click(locator),
                    _ => self.page.force_click(locator),
                };
                result.map_err(|e| browser("click", reference, e))
            }
            HitTarget::HiddenControl => self
                .page
                .click_label_for(locator)
                .map_err(|e| browser("click", reference, e)),
            HitTarget::Missing => Err(ActionError::ElementNotFound(reference.to_string())),
        }
    }

    fn upload(
        &self,
        reference: &str,
        locator: &Locator,
        element: &Element,
        file: &str,
    ) -> Result<(), ActionError> {
        let target = if element.is_file_input() {
            locator.clone()
        } else {
            self.file_input_behind(reference, locator, element)?
        };
        self.page
            .set_input_files(&target, file)
            .map_err(|e| browser("upload", reference, e))?;
        info!(reference, file, "uploaded file");
        Ok(())
    }

    /// Resolve a label (or styled wrapper) to the file input it controls.
    fn file_input_behind(
        &self,
        reference: &str,
        locator: &Locator,
        element: &Element,
    ) -> Result<Locator, ActionError> {
        if element.tag == "label" {
            let target = self
                .page
                .get_attribute(locator, "for")
                .map_err(|e| browser("upload", reference, e))?;
            if let Some(id) = target.filter(|id| !id.is_empty()) {
                let by_id = Locator::new(format!("[id=\"{id}\"]"));
                if self.page.has_match(by_id.as_str()) {
                    return Ok(by_id);
                }
            }
        }
        let nested = Locator::new(format!("{locator} input[type=\"file\"]"));
        if self.page.has_match(nested.as_str()) {
            return Ok(nested);
        }
        Err(ActionError::NoFileInput(reference.to_string()))
    }
}

fn resolve<'s>(
    snapshot: &'s Snapshot,
    reference: &str,
) -> Result<(&'s Locator, &'s Element), ActionError> {
    let locator = snapshot
        .locator(reference)
        .ok_or_else(|| ActionError::UnknownRef(reference.to_string()))?;
    let element = snapshot
        .element(reference)
        .ok_or_else(|| ActionError::UnknownRef(reference.to_string()))?;
    Ok((locator, element))
}

fn browser(action: &'static str, reference: &str, source: BrowserError) -> ActionError {
    ActionError::Browser {
        action,
        reference: reference.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_snapshot;
    use crate::types::PageKind;
    use serde_json::{Value, json};
    use std::cell::RefCell;

    /// Records every primitive call; hit tests answer from a fixed script.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        hits: RefCell<Vec<HitTarget>>,
        missing: Vec<String>,
        fail_fill: bool,
    }

    impl Recorder {
        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Page for Recorder {
        fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        fn current_url(&self) -> String {
            String::new()
        }
        fn title(&self) -> String {
            String::new()
        }
        fn content(&self) -> Result<String, BrowserError> {
            Ok(String::new())
        }
        fn evaluate(&self, _script: &str) -> Result<Value, BrowserError> {
            Ok(Value::Bool(true))
        }
        fn has_match(&self, css: &str) -> bool {
            !self.missing.iter().any(|m| m == css)
        }
        fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
            self.log(format!("click {locator}"));
            Ok(())
        }
        fn type_text(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
            self.log(format!("type {locator} {text}"));
            Ok(())
        }
        fn press_key(&self, key: &str) -> Result<(), BrowserError> {
            self.log(format!("key {key}"));
            Ok(())
        }
        fn set_input_files(&self, locator: &Locator, path: &str) -> Result<(), BrowserError> {
            self.log(format!("upload {locator} {path}"));
            Ok(())
        }
        fn close_extra_tabs(&self) {}
        fn wait(&self, _ms: u64) {}
        fn hit_test(&self, _locator: &Locator) -> HitTarget {
            let mut hits = self.hits.borrow_mut();
            if hits.is_empty() {
                HitTarget::Top
            } else {
                hits.remove(0)
            }
        }
        fn force_click(&self, locator: &Locator) -> Result<(), BrowserError> {
            self.log(format!("force {locator}"));
            Ok(())
        }
        fn click_label_for(&self, locator: &Locator) -> Result<(), BrowserError> {
            self.log(format!("label {locator}"));
            Ok(())
        }
        fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
            if self.fail_fill {
                return Err(BrowserError::Script("detached".into()));
            }
            self.log(format!("fill {locator} {value}"));
            Ok(())
        }
        fn select_option(&self, locator: &Locator, label: &str) -> Result<(), BrowserError> {
            self.log(format!("select {locator} {label}"));
            Ok(())
        }
        fn get_attribute(&self, _locator: &Locator, name: &str) -> Result<Option<String>, BrowserError> {
            Ok((name == "for").then(|| "resume-input".to_string()))
        }
        fn dismiss_overlays(&self) {
            self.log("dismiss".to_string());
        }
    }

    fn snapshot() -> Snapshot {
        parse_snapshot(
            7,
            json!({"url": "https://jobs.example/apply", "title": "Apply", "text": "", "elements": [
                {"ref": "@e0", "tag": "input", "type": "email", "label": "Email", "visible": true},
                {"ref": "@e1", "tag": "select", "label": "Country", "visible": true},
                {"ref": "@e2", "tag": "input", "type": "text", "role": "combobox", "label": "City", "visible": true},
                {"ref": "@e3", "tag": "label", "text": "Upload resume", "visible": true},
                {"ref": "@e4", "tag": "button", "text": "Submit", "visible": true},
                {"ref": "@e5", "tag": "input", "type": "file", "name": "resume", "visible": false}
            ]}),
        )
        .unwrap()
    }

    fn plan(actions: Vec<Action>) -> ActionPlan {
        ActionPlan::new(PageKind::Form, "test", actions)
    }

    #[test]
    fn fill_branches_on_element_kind() {
        let page = Recorder::default();
        let exec = Executor::new(&page, 0);
        let snap = snapshot();
        exec.execute_one(&snap, &Action::fill("@e0", "a@b.com")).unwrap();
        exec.execute_one(&snap, &Action::fill("@e1", "Canada")).unwrap();
        exec.execute_one(&snap, &Action::fill("@e2", "Austin")).unwrap();
        assert_eq!(
            page.calls(),
            vec![
                "fill [data-ap-ref=\"7:e0\"] a@b.com",
                "select [data-ap-ref=\"7:e1\"] Canada",
                "click [data-ap-ref=\"7:e2\"]",
                "type [data-ap-ref=\"7:e2\"] Austin",
                "key Enter",
            ]
        );
    }

    #[test]
    fn covered_click_dismisses_overlays_then_forces() {
        let page = Recorder {
            hits: RefCell::new(vec![HitTarget::Covered, HitTarget::Covered]),
            ..Default::default()
        };
        Executor::new(&page, 0)
            .execute_one(&snapshot(), &Action::click("@e4"))
            .unwrap();
        assert_eq!(page.calls(), vec!["dismiss", "force [data-ap-ref=\"7:e4\"]"]);
    }

    #[test]
    fn hidden_control_clicks_its_label() {
        let page = Recorder {
            hits: RefCell::new(vec![HitTarget::HiddenControl]),
            ..Default::default()
        };
        Executor::new(&page, 0)
            .execute_one(&snapshot(), &Action::click("@e5"))
            .unwrap();
        assert_eq!(page.calls(), vec!["label [data-ap-ref=\"7:e5\"]"]);
    }

    #[test]
    fn upload_on_label_resolves_for_attribute() {
        let page = Recorder::default();
        Executor::new(&page, 0)
            .execute_one(&snapshot(), &Action::upload("@e3", "/tmp/cv.pdf"))
            .unwrap();
        assert_eq!(page.calls(), vec!["upload [id=\"resume-input\"] /tmp/cv.pdf"]);
    }

    #[test]
    fn upload_without_file_input_fails() {
        let page = Recorder {
            missing: vec![
                "[id=\"resume-input\"]".to_string(),
                "[data-ap-ref=\"7:e3\"] input[type=\"file\"]".to_string(),
            ],
            ..Default::default()
        };
        let err = Executor::new(&page, 0)
            .execute_one(&snapshot(), &Action::upload("@e3", "/tmp/cv.pdf"))
            .unwrap_err();
        assert!(matches!(err, ActionError::NoFileInput(_)));
    }

    #[test]
    fn unknown_ref_fails_the_action_not_the_plan() {
        let page = Recorder::default();
        let exec = Executor::new(&page, 0);
        let snap = snapshot();
        assert!(matches!(
            exec.execute_one(&snap, &Action::click("@e99")),
            Err(ActionError::UnknownRef(_))
        ));

        let report = exec.run(
            &snap,
            &plan(vec![Action::fill("@e99", "x"), Action::click("@e4")]),
        );
        assert!(report.success());
        assert_eq!(report.executed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
    }

    #[test]
    fn hard_failure_stops_the_plan() {
        let page = Recorder {
            fail_fill: true,
            ..Default::default()
        };
        let exec = Executor::new(&page, 0);
        let ok = exec.execute(
            &snapshot(),
            &plan(vec![Action::fill("@e0", "x"), Action::click("@e4")]),
        );
        assert!(!ok);
        assert!(page.calls().is_empty());
    }

    #[test]
    fn wait_never_fails() {
        let page = Recorder::default();
        let exec = Executor::new(&page, 0);
        assert!(exec.execute_one(&snapshot(), &Action::Wait { ms: 5 }).is_ok());
    }
}
