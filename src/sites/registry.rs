//! Site detection and handler lookup.

use regex::Regex;
use tracing::{debug, warn};

use super::{
    Site, SiteHandler, SiteSpec, greenhouse, icims, indeed, lever, linkedin, phenom, smartrecruiters,
    workday,
};

pub type HandlerFactory = fn() -> Box<dyn SiteHandler>;

struct Entry {
    site: Site,
    url_patterns: Vec<Regex>,
    dom_signatures: &'static [&'static str],
    factory: HandlerFactory,
}

/// Ordered site registry. URL patterns are tried across every entry before
/// any DOM signature is probed.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| e.site)).finish()
    }
}

const BUILTIN: &[(&SiteSpec, HandlerFactory)] = &[
    (&greenhouse::SPEC, greenhouse::handler),
    (&lever::SPEC, lever::handler),
    (&workday::SPEC, workday::handler),
    (&smartrecruiters::SPEC, smartrecruiters::handler),
    (&icims::SPEC, icims::handler),
    (&phenom::SPEC, phenom::handler),
    (&indeed::SPEC, indeed::handler),
    (&linkedin::SPEC, linkedin::handler),
];

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in site handler.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (spec, factory) in BUILTIN {
            registry.register(spec.site, spec.url_patterns, spec.dom_signatures, *factory);
        }
        registry
    }

    /// Register a handler factory. Re-registering a site replaces it.
    pub fn register(
        &mut self,
        site: Site,
        url_patterns: &[&str],
        dom_signatures: &'static [&'static str],
        factory: HandlerFactory,
    ) {
        let url_patterns = url_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(%site, pattern = p, error = %e, "skipping invalid site pattern");
                    None
                }
            })
            .collect();
        let entry = Entry {
            site,
            url_patterns,
            dom_signatures,
            factory,
        };
        match self.entries.iter_mut().find(|e| e.site == site) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = Site> + '_ {
        self.entries.iter().map(|e| e.site)
    }

    /// Detect the site from the URL, then from DOM signatures.
    ///
    /// `probe` answers whether a CSS selector matches on the live page.
    pub fn detect(&self, url: &str, probe: &dyn Fn(&str) -> bool) -> Option<Site> {
        let url = url.to_lowercase();
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.url_patterns.iter().any(|re| re.is_match(&url)))
        {
            debug!(site = %entry.site, "site detected by URL");
            return Some(entry.site);
        }
        let entry = self
            .entries
            .iter()
            .find(|e| e.dom_signatures.iter().any(|css| probe(css)))?;
        debug!(site = %entry.site, "site detected by DOM signature");
        Some(entry.site)
    }

    pub fn resolve(&self, url: &str, probe: &dyn Fn(&str) -> bool) -> Option<Box<dyn SiteHandler>> {
        let site = self.detect(url, probe)?;
        self.handler(site)
    }

    pub fn handler(&self, site: Site) -> Option<Box<dyn SiteHandler>> {
        self.entries
            .iter()
            .find(|e| e.site == site)
            .map(|e| (e.factory)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_dom(_: &str) -> bool {
        false
    }

    #[test]
    fn detects_builtin_sites_by_url() {
        let registry = HandlerRegistry::with_builtin();
        let cases = [
            ("https://boards.greenhouse.io/acme/jobs/123", Site::Greenhouse),
            ("https://job-boards.greenhouse.io/acme/jobs/123", Site::Greenhouse),
            ("https://jobs.lever.co/acme/abc-def/apply", Site::Lever),
            ("https://acme.wd5.myworkdayjobs.com/en-US/careers/job/x", Site::Workday),
            ("https://jobs.smartrecruiters.com/Acme/123", Site::SmartRecruiters),
            ("https://careers-acme.icims.com/jobs/42/job", Site::Icims),
            ("https://smartapply.indeed.com/beta/indeedapply/form/contact-info", Site::Indeed),
            ("https://www.linkedin.com/jobs/view/3790001234/", Site::LinkedIn),
        ];
        for (url, site) in cases {
            assert_eq!(registry.detect(url, &no_dom), Some(site), "{url}");
        }
        assert_eq!(registry.detect("https://acme.example/careers/1", &no_dom), None);
    }

    #[test]
    fn falls_back_to_dom_signatures() {
        let registry = HandlerRegistry::with_builtin();
        let probe = |css: &str| css.contains("data-ph-at-id");
        assert_eq!(
            registry.detect("https://careers.acme.example/job/1", &probe),
            Some(Site::Phenom)
        );
        let handler = registry.resolve("https://careers.acme.example/job/1", &probe).unwrap();
        assert_eq!(handler.site(), Site::Phenom);
    }

    #[test]
    fn url_match_wins_over_earlier_dom_match() {
        let registry = HandlerRegistry::with_builtin();
        let everything = |_: &str| true;
        assert_eq!(
            registry.detect("https://jobs.lever.co/acme/1", &everything),
            Some(Site::Lever)
        );
    }

    #[test]
    fn register_replaces_existing_site() {
        let mut registry = HandlerRegistry::new();
        registry.register(Site::Lever, &[r"lever\.co"], &[], lever::handler);
        registry.register(Site::Lever, &[r"example\.org"], &[], lever::handler);
        assert_eq!(registry.sites().count(), 1);
        assert_eq!(registry.detect("https://jobs.lever.co/x", &no_dom), None);
        assert_eq!(registry.detect("https://example.org/x", &no_dom), Some(Site::Lever));
    }
}
