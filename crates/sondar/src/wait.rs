//! Bounded polling over remote UI state.
//!
//! Eventually-consistent UIs answer "not yet" in two ways: a query that
//! returns nothing, and a query that blows up mid-render (stale reference,
//! detached node). Both map to [`Probe::Pending`] here; only the bounded-wait
//! outcome crosses the component boundary, while the absorbed faults are
//! emitted on the `trace` level for an observability subscriber to collect.
//!
//! A wait never errors on expiry: [`wait_for`] returns `false` and the
//! caller decides whether to proceed, retry at a higher level, or abort.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::driver::{ElementHandle, UiDriver};
use crate::locator::Locator;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Offset far beyond any real list; backends clamp scroll assignment to the
/// scrollable extent, so assigning this means "scroll to the end".
const SCROLL_END_OFFSET: f64 = 1_000_000_000.0;

// =============================================================================
// POLL OPTIONS
// =============================================================================

/// Timeout and polling cadence for a single bounded wait.
///
/// Invariants (timeout > 0, 0 < interval <= timeout) are enforced by
/// clamping at construction: zero durations are raised to one millisecond
/// and the interval is capped at the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptions {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl PollOptions {
    /// Create options with the given timeout and poll interval
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
        .clamped()
    }

    /// Create options with the given timeout and the default interval
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
        .clamped()
    }

    /// Replace the poll interval
    #[must_use]
    pub fn poll_every(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.clamped()
    }

    /// The total wait budget
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The pause between probe attempts
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn clamped(mut self) -> Self {
        const MIN: Duration = Duration::from_millis(1);
        if self.timeout < MIN {
            self.timeout = MIN;
        }
        if self.poll_interval < MIN {
            self.poll_interval = MIN;
        }
        if self.poll_interval > self.timeout {
            self.poll_interval = self.timeout;
        }
        self
    }
}

// =============================================================================
// PROBE OUTCOME
// =============================================================================

/// Outcome of a single probe attempt inside a polling loop.
///
/// `Pending` covers both "predicate currently false" and "evaluation faulted
/// transiently" — the distinction never crosses the wait boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<T> {
    /// The probed state is ready; the wait finishes with this value
    Ready(T),
    /// Not yet; the loop sleeps and probes again
    Pending,
}

impl<T> Probe<T> {
    /// Whether this probe finished the wait
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Extract the ready value, if any
    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending => None,
        }
    }
}

/// Poll until the probe reports ready or the budget elapses.
///
/// The probe runs at least once even with a minimal budget; between attempts
/// the flow suspends on the tokio timer, never blocking an OS worker. Each
/// call owns its own deadline — there is no external cancellation mid-wait.
pub async fn poll_until<T, F, Fut>(options: &PollOptions, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let deadline = Instant::now() + options.timeout();
    loop {
        if let Probe::Ready(value) = probe().await {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(options.poll_interval()).await;
    }
}

// =============================================================================
// WAIT CONDITIONS
// =============================================================================

/// A predicate over remote UI state, paired with [`PollOptions`] by the
/// caller of [`wait_for`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// An element matching the locator exists
    Present(Locator),
    /// The element exists, is visible and is not obscured
    Clickable(Locator),
    /// The element's attribute is absent
    AttributeAbsent {
        /// Element to query
        target: Locator,
        /// Attribute name
        attribute: String,
    },
    /// The element's attribute no longer holds the given value
    AttributeNot {
        /// Element to query
        target: Locator,
        /// Attribute name
        attribute: String,
        /// Value the attribute must have moved away from
        value: String,
    },
    /// Scroll a container to its end once, then wait for the target to
    /// become enabled
    EnabledAfterScroll {
        /// The scrollable container
        scroll_area: Locator,
        /// The control whose enablement gates the wait
        target: Locator,
    },
}

impl Condition {
    /// Element presence
    #[must_use]
    pub const fn present(locator: Locator) -> Self {
        Self::Present(locator)
    }

    /// Element clickability
    #[must_use]
    pub const fn clickable(locator: Locator) -> Self {
        Self::Clickable(locator)
    }

    /// Attribute removal (e.g. `disabled` being dropped)
    #[must_use]
    pub fn attribute_absent(target: Locator, attribute: impl Into<String>) -> Self {
        Self::AttributeAbsent {
            target,
            attribute: attribute.into(),
        }
    }

    /// Attribute moving away from a specific value
    #[must_use]
    pub fn attribute_not(
        target: Locator,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::AttributeNot {
            target,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Enablement gated behind scrolling a container to its end
    #[must_use]
    pub const fn enabled_after_scroll(scroll_area: Locator, target: Locator) -> Self {
        Self::EnabledAfterScroll {
            scroll_area,
            target,
        }
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Wait for a condition against the driver.
///
/// Returns `true` as soon as the condition holds, `false` when the budget
/// elapses — without distinguishing "predicate stayed false" from
/// "evaluation kept faulting".
pub async fn wait_for<D: UiDriver + ?Sized>(
    driver: &D,
    condition: &Condition,
    options: &PollOptions,
) -> bool {
    match condition {
        Condition::Present(locator) => poll_until(options, move || probe_present(driver, locator))
            .await
            .is_some(),
        Condition::Clickable(locator) => {
            poll_until(options, move || probe_clickable(driver, locator))
                .await
                .is_some()
        }
        Condition::AttributeAbsent { target, attribute } => {
            poll_until(options, move || {
                probe_attribute(driver, target, attribute, None)
            })
            .await
            .is_some()
        }
        Condition::AttributeNot {
            target,
            attribute,
            value,
        } => {
            poll_until(options, move || {
                probe_attribute(driver, target, attribute, Some(value))
            })
            .await
            .is_some()
        }
        Condition::EnabledAfterScroll {
            scroll_area,
            target,
        } => {
            scroll_to_end(driver, scroll_area, options).await;
            poll_until(options, move || probe_enabled(driver, target))
                .await
                .is_some()
        }
    }
}

/// Wait on an ad hoc predicate with the same absorb-and-retry semantics as
/// [`wait_for`]. The predicate's backend faults count as "not yet".
pub async fn wait_until<F, Fut>(options: &PollOptions, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::result::SondarResult<bool>>,
{
    poll_until(options, || {
        let check = predicate();
        async move {
            match check.await {
                Ok(true) => Probe::Ready(()),
                Ok(false) => Probe::Pending,
                Err(error) => {
                    trace!(%error, "predicate fault absorbed");
                    Probe::Pending
                }
            }
        }
    })
    .await
    .is_some()
}

pub(crate) async fn probe_present<D: UiDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
) -> Probe<ElementHandle> {
    match driver.resolve(locator).await {
        Ok(Some(handle)) => Probe::Ready(handle),
        Ok(None) => Probe::Pending,
        Err(error) => {
            trace!(%locator, %error, "presence probe fault absorbed");
            Probe::Pending
        }
    }
}

async fn probe_clickable<D: UiDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
) -> Probe<ElementHandle> {
    let handle = match probe_present(driver, locator).await {
        Probe::Ready(handle) => handle,
        Probe::Pending => return Probe::Pending,
    };
    match driver.is_clickable(&handle).await {
        Ok(true) => Probe::Ready(handle),
        Ok(false) => Probe::Pending,
        Err(error) => {
            trace!(%locator, %error, "clickability probe fault absorbed");
            Probe::Pending
        }
    }
}

async fn probe_attribute<D: UiDriver + ?Sized>(
    driver: &D,
    target: &Locator,
    attribute: &str,
    moved_from: Option<&str>,
) -> Probe<()> {
    let handle = match probe_present(driver, target).await {
        Probe::Ready(handle) => handle,
        Probe::Pending => return Probe::Pending,
    };
    match driver.attribute(&handle, attribute).await {
        Ok(current) => {
            let satisfied = match moved_from {
                None => current.is_none(),
                Some(value) => current.as_deref() != Some(value),
            };
            if satisfied {
                Probe::Ready(())
            } else {
                Probe::Pending
            }
        }
        Err(error) => {
            trace!(%target, attribute, %error, "attribute probe fault absorbed");
            Probe::Pending
        }
    }
}

async fn probe_enabled<D: UiDriver + ?Sized>(driver: &D, target: &Locator) -> Probe<()> {
    let handle = match probe_present(driver, target).await {
        Probe::Ready(handle) => handle,
        Probe::Pending => return Probe::Pending,
    };
    match driver.is_enabled(&handle).await {
        Ok(true) => Probe::Ready(()),
        Ok(false) => Probe::Pending,
        Err(error) => {
            trace!(%target, %error, "enablement probe fault absorbed");
            Probe::Pending
        }
    }
}

/// One-time side action for [`Condition::EnabledAfterScroll`]: bring the
/// container's scroll position to its end. Failures here do not abort the
/// wait — the enablement poll still runs.
async fn scroll_to_end<D: UiDriver + ?Sized>(driver: &D, area: &Locator, options: &PollOptions) {
    let Some(host) = poll_until(options, move || probe_present(driver, area)).await else {
        debug!(%area, "scroll area never appeared, polling enablement anyway");
        return;
    };
    if let Err(error) = driver.set_scroll_offset(&host, SCROLL_END_OFFSET).await {
        debug!(%area, %error, "scroll-to-end failed, polling enablement anyway");
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

    mod poll_options_tests {
        use super::*;

        #[test]
        fn test_default_options() {
            let opts = PollOptions::default();
            assert_eq!(opts.timeout(), Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS));
            assert_eq!(
                opts.poll_interval(),
                Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
            );
        }

        #[test]
        fn test_interval_capped_at_timeout() {
            let opts = PollOptions::new(Duration::from_millis(200), Duration::from_secs(5));
            assert_eq!(opts.poll_interval(), Duration::from_millis(200));
        }

        #[test]
        fn test_zero_durations_raised() {
            let opts = PollOptions::new(Duration::ZERO, Duration::ZERO);
            assert_eq!(opts.timeout(), Duration::from_millis(1));
            assert_eq!(opts.poll_interval(), Duration::from_millis(1));
        }

        #[test]
        fn test_poll_every_reclamps() {
            let opts =
                PollOptions::with_timeout(Duration::from_millis(50)).poll_every(Duration::from_secs(1));
            assert_eq!(opts.poll_interval(), Duration::from_millis(50));
        }

        proptest! {
            #[test]
            fn prop_clamp_invariants_hold(timeout_ms in 0u64..120_000, interval_ms in 0u64..120_000) {
                let opts = PollOptions::new(
                    Duration::from_millis(timeout_ms),
                    Duration::from_millis(interval_ms),
                );
                prop_assert!(opts.timeout() >= Duration::from_millis(1));
                prop_assert!(opts.poll_interval() >= Duration::from_millis(1));
                prop_assert!(opts.poll_interval() <= opts.timeout());
            }
        }
    }

    mod probe_tests {
        use super::*;

        #[test]
        fn test_probe_ready() {
            let probe = Probe::Ready(7);
            assert!(probe.is_ready());
            assert_eq!(probe.into_ready(), Some(7));
        }

        #[test]
        fn test_probe_pending() {
            let probe: Probe<i32> = Probe::Pending;
            assert!(!probe.is_ready());
            assert_eq!(probe.into_ready(), None);
        }
    }

    mod poll_until_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_immediate_ready_returns_without_sleeping() {
            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(100));
            let started = Instant::now();
            let result = poll_until(&opts, || async { Probe::Ready(42) }).await;
            assert_eq!(result, Some(42));
            assert_eq!(started.elapsed(), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_expiry_returns_none() {
            let opts = PollOptions::new(Duration::from_millis(300), Duration::from_millis(100));
            let result: Option<()> = poll_until(&opts, || async { Probe::Pending }).await;
            assert!(result.is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_runs_at_least_once() {
            let opts = PollOptions::new(Duration::from_millis(1), Duration::from_millis(1));
            let mut attempts = 0;
            let result: Option<()> = poll_until(&opts, || {
                attempts += 1;
                async { Probe::Pending }
            })
            .await;
            assert!(result.is_none());
            assert!(attempts >= 1);
        }
    }

    mod wait_for_tests {
        use super::*;
        use crate::locator::Locator;

        #[tokio::test(start_paused = true)]
        async fn test_present_true_when_element_appears() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("el")
                    .matched_by(Locator::css("#el"))
                    .appears_after(Duration::from_millis(250)),
            );

            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(50));
            assert!(wait_for(&driver, &Condition::present(Locator::css("#el")), &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_returns_false_not_error() {
            let driver = MockDriver::new();
            let opts = PollOptions::new(Duration::from_millis(200), Duration::from_millis(50));
            assert!(!wait_for(&driver, &Condition::present(Locator::css("#never")), &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_attribute_removed_inside_budget() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("btn")
                    .matched_by(Locator::css("#btn"))
                    .with_attribute("disabled", "")
                    .attribute_removed_after("disabled", Duration::from_millis(600)),
            );

            let opts = PollOptions::new(Duration::from_millis(1000), Duration::from_millis(100));
            let cond = Condition::attribute_absent(Locator::css("#btn"), "disabled");
            assert!(wait_for(&driver, &cond, &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_attribute_removed_outside_budget() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("btn")
                    .matched_by(Locator::css("#btn"))
                    .with_attribute("disabled", "")
                    .attribute_removed_after("disabled", Duration::from_millis(1200)),
            );

            let opts = PollOptions::new(Duration::from_millis(1000), Duration::from_millis(100));
            let cond = Condition::attribute_absent(Locator::css("#btn"), "disabled");
            assert!(!wait_for(&driver, &cond, &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_attribute_moves_away_from_value() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("badge")
                    .matched_by(Locator::css(".badge"))
                    .with_attribute("data-state", "loading")
                    .attribute_set_after("data-state", "ready", Duration::from_millis(300)),
            );

            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(50));
            let cond = Condition::attribute_not(Locator::css(".badge"), "data-state", "loading");
            assert!(wait_for(&driver, &cond, &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_clickable_waits_out_obstruction() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("btn")
                    .matched_by(Locator::css("#btn"))
                    .obscured_for(Duration::from_millis(400)),
            );

            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(100));
            assert!(wait_for(&driver, &Condition::clickable(Locator::css("#btn")), &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_transient_faults_never_escape() {
            let mut driver = MockDriver::new();
            driver.add_element(
                MockElement::new("flaky")
                    .matched_by(Locator::css("#flaky"))
                    .failing_probes(3),
            );

            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(50));
            // First three probes fault; the wait absorbs them and succeeds.
            assert!(wait_for(&driver, &Condition::present(Locator::css("#flaky")), &opts).await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_enabled_after_scroll() {
            let mut driver = MockDriver::new();
            driver.add_element(MockElement::new("terms").matched_by(Locator::css(".terms")));
            driver.add_element(
                MockElement::new("accept")
                    .matched_by(Locator::css("#accept"))
                    .enabled_at_offset("terms", 5_000.0),
            );

            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(100));
            let cond =
                Condition::enabled_after_scroll(Locator::css(".terms"), Locator::css("#accept"));
            assert!(wait_for(&driver, &cond, &opts).await);
            assert!(driver.was_called("set_scroll_offset:terms"));
        }
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_predicate_becomes_true() {
            let opts = PollOptions::new(Duration::from_secs(1), Duration::from_millis(10));
            let mut calls = 0;
            let outcome = wait_until(&opts, || {
                calls += 1;
                let ready = calls >= 3;
                async move { Ok(ready) }
            })
            .await;
            assert!(outcome);
            assert_eq!(calls, 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_predicate_faults_count_as_pending() {
            let opts = PollOptions::new(Duration::from_millis(100), Duration::from_millis(10));
            let outcome = wait_until(&opts, || async {
                Err(crate::result::SondarError::backend("boom"))
            })
            .await;
            assert!(!outcome);
        }
    }
}
