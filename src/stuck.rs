//! Stuck and loop detection over the sequence of processed pages.
//!
//! The detector only looks at URLs, element counts and content hashes. It
//! never inspects page semantics.

use sha2::{Digest, Sha256};

use crate::config::DetectorSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub element_count: usize,
    pub content_hash: String,
    pub actions_executed: usize,
    pub actions_succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StuckReason {
    IdenticalContent(usize),
    SamePage(usize),
    RepeatingPattern(usize),
}

impl std::fmt::Display for StuckReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StuckReason::IdenticalContent(n) => {
                write!(f, "Identical page content {n} times consecutively")
            }
            StuckReason::SamePage(n) => {
                write!(f, "Same page visited {n} times with similar element count")
            }
            StuckReason::RepeatingPattern(period) => {
                write!(f, "Detected repeating {period}-page pattern")
            }
        }
    }
}

/// Per-attempt detector. Call [`StuckDetector::reset`] between attempts.
#[derive(Debug, Clone)]
pub struct StuckDetector {
    settings: DetectorSettings,
    records: Vec<PageRecord>,
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

impl StuckDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            records: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        url: &str,
        element_count: usize,
        content_hash: &str,
        actions_executed: usize,
        actions_succeeded: bool,
    ) {
        self.records.push(PageRecord {
            url: url.to_string(),
            element_count,
            content_hash: content_hash.to_string(),
            actions_executed,
            actions_succeeded,
        });
    }

    /// First matching stuck rule, checked in order.
    pub fn is_stuck(&self) -> Option<StuckReason> {
        self.identical_content()
            .or_else(|| self.same_page())
            .or_else(|| self.repeating_pattern())
    }

    pub fn iterations(&self) -> usize {
        self.records.len()
    }

    pub fn visits(&self, url: &str) -> usize {
        let target = normalize_url(url);
        self.records
            .iter()
            .filter(|r| normalize_url(&r.url) == target)
            .count()
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    fn recent(&self, n: usize) -> Option<&[PageRecord]> {
        (n > 0 && self.records.len() >= n).then(|| &self.records[self.records.len() - n..])
    }

    fn identical_content(&self) -> Option<StuckReason> {
        let n = self.settings.same_content_window;
        let recent = self.recent(n)?;
        let first = &recent[0].content_hash;
        recent
            .iter()
            .all(|r| &r.content_hash == first)
            .then_some(StuckReason::IdenticalContent(n))
    }

    // Success without visible progress is still stuck.
    fn same_page(&self) -> Option<StuckReason> {
        let n = self.settings.same_page_window;
        let recent = self.recent(n)?;
        let url = normalize_url(&recent[0].url);
        let count = recent[0].element_count;
        let tolerance = self.settings.element_tolerance;
        recent
            .iter()
            .all(|r| normalize_url(&r.url) == url && r.element_count.abs_diff(count) <= tolerance)
            .then_some(StuckReason::SamePage(n))
    }

    fn repeating_pattern(&self) -> Option<StuckReason> {
        let repetitions = self.settings.pattern_repetitions;
        [2usize, 3]
            .into_iter()
            .find(|&period| self.repeats(period, repetitions))
            .map(StuckReason::RepeatingPattern)
    }

    fn repeats(&self, period: usize, repetitions: usize) -> bool {
        let Some(recent) = self.recent(period * repetitions) else {
            return false;
        };
        let urls: Vec<String> = recent.iter().map(|r| normalize_url(&r.url)).collect();
        let pattern = &urls[..period];
        urls.chunks(period).all(|chunk| chunk == pattern)
    }
}

/// Strip the fragment and trailing slashes. Idempotent.
pub fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    without_fragment.trim_end_matches('/').to_string()
}

/// Short, stable hash of normalized page text.
pub fn content_hash(content: &str) -> String {
    let normalized = content.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
