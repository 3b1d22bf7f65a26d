//! Locator rules and ordered-fallback resolution.
//!
//! Recorded flows rarely get one durable selector: an id that survives
//! deploys, an XPath that survives nothing, a positional path as a last
//! resort. A [`LocatorSet`] keeps those candidates in priority order and
//! [`Resolver`] walks them strictly sequentially — a lower-priority
//! candidate that would materialize sooner never wins over an earlier one
//! that materializes within its own timeout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::{ElementHandle, UiDriver};
use crate::result::{SondarError, SondarResult};
use crate::wait::{poll_until, probe_present, PollOptions};

/// Default per-candidate presence budget (2 seconds)
pub const DEFAULT_CANDIDATE_TIMEOUT_MS: u64 = 2_000;

/// An identification rule the backend can resolve to zero or more live
/// elements. The engine only orders and compares locators; interpreting the
/// selector text is the backend's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    /// CSS selector (e.g. `button.primary`)
    Css(String),
    /// XPath selector
    XPath(String),
    /// Visible text content
    Text(String),
    /// Test ID selector (`data-testid` attribute)
    TestId(String),
}

impl Locator {
    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath locator
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::XPath(path.into())
    }

    /// Create a text-content locator
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// The raw selector text
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) | Self::Text(s) | Self::TestId(s) => s,
        }
    }

    /// Render a JS expression resolving to the first matching element or
    /// `null`, for backends that query through script evaluation
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelector({s:?})"),
            Self::XPath(s) => {
                format!("document.evaluate({s:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue")
            }
            Self::Text(t) => {
                format!("Array.from(document.querySelectorAll('*')).find(el => el.textContent.includes({t:?})) || null")
            }
            Self::TestId(id) => {
                format!("document.querySelector('[data-testid=' + JSON.stringify({id:?}) + ']')")
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css {s}"),
            Self::XPath(s) => write!(f, "xpath {s}"),
            Self::Text(s) => write!(f, "text {s}"),
            Self::TestId(s) => write!(f, "testid {s}"),
        }
    }
}

/// A non-empty ordered sequence of locator candidates; priority is list
/// order and never changes during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSet {
    candidates: Vec<Locator>,
}

impl LocatorSet {
    /// Build a set from ordered candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SondarError::InvalidSpec`] for an empty candidate list.
    pub fn new(candidates: Vec<Locator>) -> SondarResult<Self> {
        if candidates.is_empty() {
            return Err(SondarError::InvalidSpec {
                message: "locator set must not be empty".to_string(),
            });
        }
        Ok(Self { candidates })
    }

    /// Build a single-candidate set
    #[must_use]
    pub fn single(locator: Locator) -> Self {
        Self {
            candidates: vec![locator],
        }
    }

    /// Number of candidates (always at least one)
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always `false`; present for container-API completeness
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The highest-priority candidate
    #[must_use]
    pub fn first(&self) -> &Locator {
        &self.candidates[0]
    }

    /// The last-resort candidate
    #[must_use]
    pub fn last(&self) -> &Locator {
        &self.candidates[self.candidates.len() - 1]
    }

    /// Iterate candidates in priority order
    pub fn iter(&self) -> std::slice::Iter<'_, Locator> {
        self.candidates.iter()
    }

    /// Candidates as a slice, in priority order
    #[must_use]
    pub fn as_slice(&self) -> &[Locator] {
        &self.candidates
    }
}

impl From<Locator> for LocatorSet {
    fn from(locator: Locator) -> Self {
        Self::single(locator)
    }
}

impl<'a> IntoIterator for &'a LocatorSet {
    type Item = &'a Locator;
    type IntoIter = std::slice::Iter<'a, Locator>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// First-workable-locator resolution over a candidate set.
///
/// Candidates are probed strictly in order, never concurrently: the
/// deterministic "first in priority order" semantic is worth the known
/// limitation that a slow earlier candidate delays a faster later one by up
/// to its own timeout. A non-final candidate's failure is discarded (traced
/// on `debug`); only the final candidate's failure surfaces, as
/// [`SondarError::NotFound`] marking exhaustion of the whole set.
#[derive(Debug, Clone)]
pub struct Resolver {
    per_candidate: PollOptions,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            per_candidate: PollOptions::with_timeout(Duration::from_millis(
                DEFAULT_CANDIDATE_TIMEOUT_MS,
            )),
        }
    }
}

impl Resolver {
    /// Resolver with the given per-candidate presence budget
    #[must_use]
    pub fn new(per_candidate_timeout: Duration) -> Self {
        Self {
            per_candidate: PollOptions::with_timeout(per_candidate_timeout),
        }
    }

    /// Resolver with full per-candidate poll options
    #[must_use]
    pub const fn with_options(per_candidate: PollOptions) -> Self {
        Self { per_candidate }
    }

    /// The per-candidate poll options in effect
    #[must_use]
    pub const fn options(&self) -> &PollOptions {
        &self.per_candidate
    }

    /// Resolve the first candidate whose presence probe succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SondarError::NotFound`] once every candidate is exhausted.
    /// The resolver only queries; it never interacts with the element.
    pub async fn resolve_first<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        candidates: &LocatorSet,
    ) -> SondarResult<ElementHandle> {
        let total = candidates.len();
        for (index, locator) in candidates.iter().enumerate() {
            let found =
                poll_until(&self.per_candidate, move || probe_present(driver, locator)).await;
            if let Some(handle) = found {
                tracing::debug!(%locator, candidate = index + 1, total, "locator resolved");
                return Ok(handle);
            }
            if index + 1 < total {
                tracing::debug!(%locator, candidate = index + 1, total, "candidate failed, trying next");
            }
        }
        Err(SondarError::NotFound {
            candidates: total,
            last: candidates.last().to_string(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};
    use proptest::prelude::*;

    mod locator_tests {
        use super::*;

        #[test]
        fn test_constructors_and_value() {
            assert_eq!(Locator::css("#a").value(), "#a");
            assert_eq!(Locator::xpath("//div").value(), "//div");
            assert_eq!(Locator::text("Save").value(), "Save");
            assert_eq!(Locator::test_id("submit").value(), "submit");
        }

        #[test]
        fn test_display_names_kind() {
            assert_eq!(Locator::css("#a").to_string(), "css #a");
            assert_eq!(Locator::xpath("//div").to_string(), "xpath //div");
        }

        #[test]
        fn test_to_query_renders_js() {
            assert_eq!(
                Locator::css("button.primary").to_query(),
                "document.querySelector(\"button.primary\")"
            );
            assert!(Locator::xpath("//input").to_query().contains("document.evaluate"));
            assert!(Locator::text("psu approver1").to_query().contains("textContent"));
        }

        #[test]
        fn test_equality_and_hashing() {
            use std::collections::HashSet;
            let mut set = HashSet::new();
            set.insert(Locator::css("#a"));
            assert!(set.contains(&Locator::css("#a")));
            assert!(!set.contains(&Locator::xpath("#a")));
        }
    }

    mod locator_set_tests {
        use super::*;

        #[test]
        fn test_empty_set_rejected() {
            let err = LocatorSet::new(vec![]).unwrap_err();
            assert!(matches!(err, SondarError::InvalidSpec { .. }));
        }

        #[test]
        fn test_order_preserved() {
            let set = LocatorSet::new(vec![
                Locator::css("#loginID"),
                Locator::xpath("//*[@id=\"loginID\"]"),
                Locator::xpath("/html/body/div/input"),
            ])
            .unwrap();
            assert_eq!(set.len(), 3);
            assert_eq!(set.first(), &Locator::css("#loginID"));
            assert_eq!(set.last(), &Locator::xpath("/html/body/div/input"));
        }

        #[test]
        fn test_single_and_from() {
            let set: LocatorSet = Locator::css("#a").into();
            assert_eq!(set.len(), 1);
            assert!(!set.is_empty());
        }

        proptest! {
            #[test]
            fn prop_new_preserves_candidates(values in proptest::collection::vec("[a-z#.]{1,12}", 1..8)) {
                let candidates: Vec<Locator> = values.iter().map(|v| Locator::css(v.as_str())).collect();
                let set = LocatorSet::new(candidates.clone()).unwrap();
                prop_assert_eq!(set.as_slice(), candidates.as_slice());
            }
        }
    }

    mod resolver_tests {
        use super::*;
        use std::time::Duration;

        fn fallback_set() -> LocatorSet {
            LocatorSet::new(vec![
                Locator::css("#target"),
                Locator::xpath("//*[@id=\"target\"]"),
            ])
            .unwrap()
        }

        #[tokio::test(start_paused = true)]
        async fn test_sequential_priority_beats_faster_later_candidate() {
            let mut driver = MockDriver::new();
            // A materializes at 400ms, within its own 2s budget; B is already
            // present at 100ms but must never be probed first.
            driver.add_element(
                MockElement::new("a")
                    .matched_by(Locator::css("#target"))
                    .appears_after(Duration::from_millis(400)),
            );
            driver.add_element(
                MockElement::new("b")
                    .matched_by(Locator::xpath("//*[@id=\"target\"]"))
                    .appears_after(Duration::from_millis(100)),
            );

            let resolver = Resolver::new(Duration::from_secs(2));
            let handle = resolver
                .resolve_first(&driver, &fallback_set())
                .await
                .unwrap();
            assert_eq!(handle.id, "a");
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_candidate_skipped_silently() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("b").matched_by(Locator::xpath("//*[@id=\"target\"]")),
            );

            let resolver = Resolver::new(Duration::from_millis(200));
            let handle = resolver
                .resolve_first(&driver, &fallback_set())
                .await
                .unwrap();
            assert_eq!(handle.id, "b");
        }

        #[tokio::test(start_paused = true)]
        async fn test_exhaustion_surfaces_last_candidate() {
            let driver = MockDriver::new();
            let resolver = Resolver::new(Duration::from_millis(150));
            let err = resolver
                .resolve_first(&driver, &fallback_set())
                .await
                .unwrap_err();
            match err {
                SondarError::NotFound { candidates, last } => {
                    assert_eq!(candidates, 2);
                    assert!(last.contains("//*[@id=\"target\"]"));
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_transient_fault_on_candidate_retried() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("a")
                    .matched_by(Locator::css("#target"))
                    .failing_probes(2),
            );

            let resolver =
                Resolver::with_options(PollOptions::new(
                    Duration::from_secs(1),
                    Duration::from_millis(50),
                ));
            let handle = resolver
                .resolve_first(&driver, &fallback_set())
                .await
                .unwrap();
            assert_eq!(handle.id, "a");
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolver_does_not_interact() {
            let mut driver = MockDriver::new();
            driver.add_element(MockElement::new("a").matched_by(Locator::css("#target")));

            let resolver = Resolver::default();
            resolver
                .resolve_first(&driver, &fallback_set())
                .await
                .unwrap();
            assert!(!driver.was_called("activate:"));
            assert!(!driver.was_called("set_scroll_offset:"));
            assert!(!driver.was_called("move_pointer_to:"));
        }
    }
}
