//! Windowed-list search by incremental scrolling.
//!
//! Virtualized lists only mount the rows near the viewport, so a straight
//! presence wait on a deep row times out no matter how long the budget is.
//! The search instead alternates short probes with small scroll advances,
//! re-rendering the window until the row mounts. Because the widget
//! implementation is unknown, every advance applies the whole ordered
//! [`ScrollStrategy`] list rather than betting on one mechanism.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace};

use crate::driver::{ElementHandle, UiDriver};
use crate::locator::{Locator, LocatorSet, Resolver};
use crate::result::{SondarError, SondarResult};
use crate::wait::{poll_until, probe_present, PollOptions, Probe};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default scroll advance per attempt, in pixels
pub const DEFAULT_SCROLL_STEP: f64 = 80.0;

/// Default number of scroll attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Default per-attempt, per-candidate probe budget (300ms)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 300;

/// Default pause for the window to re-render after a scroll (100ms)
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Default budget for the container to become visible (3 seconds)
pub const DEFAULT_CONTAINER_TIMEOUT_MS: u64 = 3_000;

// =============================================================================
// SCROLL STRATEGIES
// =============================================================================

/// One mechanism for advancing a scrollable host.
///
/// Both built-in strategies aim at the same cumulative depth for a given
/// attempt, so the documented reachability bound (`max_attempts x step`)
/// holds whichever mechanism the host actually honors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStrategy {
    /// Assign the absolute scroll offset for this attempt
    AssignOffset,
    /// Advance by a relative delta, for hosts that ignore assignment
    RelativeDelta,
}

impl ScrollStrategy {
    /// The default ordered strategy list, applied in full on every attempt
    #[must_use]
    pub const fn defaults() -> [Self; 2] {
        [Self::AssignOffset, Self::RelativeDelta]
    }

    /// Apply this strategy for the attempt whose cumulative depth is
    /// `target_offset` and whose advance is `step`
    pub async fn apply<D: UiDriver + ?Sized>(
        self,
        driver: &D,
        host: &ElementHandle,
        target_offset: f64,
        step: f64,
    ) -> SondarResult<()> {
        match self {
            Self::AssignOffset => driver.set_scroll_offset(host, target_offset).await,
            Self::RelativeDelta => driver.scroll_by(host, step).await,
        }
    }
}

// =============================================================================
// VIRTUAL LIST SEARCH
// =============================================================================

/// Specification and engine for finding an item inside a windowed list.
///
/// Rows farther than `max_attempts x step` from the starting offset are
/// unreachable and yield [`SondarError::NotFound`]; that is the stated
/// capacity limit of the search, not a defect.
#[derive(Debug, Clone)]
pub struct VirtualListSearch {
    container: Locator,
    host: Option<Locator>,
    items: LocatorSet,
    step: f64,
    max_attempts: u32,
    probe: PollOptions,
    settle: Duration,
    container_wait: PollOptions,
    fallback: PollOptions,
    strategies: Vec<ScrollStrategy>,
}

impl VirtualListSearch {
    /// Search for `items` inside the list rooted at `container`
    #[must_use]
    pub fn new(container: Locator, items: LocatorSet) -> Self {
        Self {
            container,
            host: None,
            items,
            step: DEFAULT_SCROLL_STEP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            probe: PollOptions::new(
                Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
                Duration::from_millis(DEFAULT_SETTLE_MS),
            ),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            container_wait: PollOptions::with_timeout(Duration::from_millis(
                DEFAULT_CONTAINER_TIMEOUT_MS,
            )),
            fallback: PollOptions::default(),
            strategies: ScrollStrategy::defaults().to_vec(),
        }
    }

    /// Prefer a dedicated virtualization host over the container itself
    #[must_use]
    pub fn with_host(mut self, host: Locator) -> Self {
        self.host = Some(host);
        self
    }

    /// Scroll advance per attempt, in pixels
    #[must_use]
    pub const fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Maximum scroll attempts; with `step` this bounds the reachable depth
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Per-attempt, per-candidate probe options
    #[must_use]
    pub const fn with_probe(mut self, probe: PollOptions) -> Self {
        self.probe = probe;
        self
    }

    /// Re-render pause after each scroll advance
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Budget for the container to become visible
    #[must_use]
    pub const fn with_container_wait(mut self, options: PollOptions) -> Self {
        self.container_wait = options;
        self
    }

    /// Per-candidate options for the exhaustion fallback pass
    #[must_use]
    pub const fn with_fallback(mut self, options: PollOptions) -> Self {
        self.fallback = options;
        self
    }

    /// Replace the ordered scroll strategy list
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<ScrollStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Run the search.
    ///
    /// # Errors
    ///
    /// [`SondarError::InvalidSpec`] for a non-positive step or zero attempt
    /// budget; [`SondarError::NotFound`] when both the scroll loop and the
    /// plain-resolution fallback exhaust.
    pub async fn run<D: UiDriver + ?Sized>(&self, driver: &D) -> SondarResult<ElementHandle> {
        if self.max_attempts == 0 {
            return Err(SondarError::InvalidSpec {
                message: "virtual list search needs a positive attempt budget".to_string(),
            });
        }
        if self.step <= 0.0 {
            return Err(SondarError::InvalidSpec {
                message: "virtual list search needs a positive scroll step".to_string(),
            });
        }

        let container_locator = &self.container;
        let Some(container) = poll_until(&self.container_wait, move || {
            probe_visible(driver, container_locator)
        })
        .await
        else {
            // Covers non-virtualized lists too: a longer presence timeout may
            // be all that was needed.
            debug!(container = %self.container, "container never became visible, falling back to plain resolution");
            return self.resolve_fallback(driver).await;
        };

        let host = self.resolve_host(driver, &container).await;

        // Some virtualization implementations only mount rows in response to
        // interaction proximity, not geometry alone.
        if let Err(error) = driver.move_pointer_to(&host).await {
            trace!(%error, "pointer priming failed");
        }

        for attempt in 0..self.max_attempts {
            for locator in &self.items {
                if let Some(handle) =
                    poll_until(&self.probe, move || probe_present(driver, locator)).await
                {
                    debug!(%locator, attempt = attempt + 1, "item found in windowed list");
                    return Ok(handle);
                }
            }

            let target_offset = self.step * f64::from(attempt + 1);
            for strategy in &self.strategies {
                if let Err(error) = strategy.apply(driver, &host, target_offset, self.step).await {
                    trace!(?strategy, %error, "scroll strategy failed");
                }
            }
            sleep(self.settle).await;
        }

        debug!(
            attempts = self.max_attempts,
            reachable = self.step * f64::from(self.max_attempts),
            "scroll attempts exhausted, falling back to plain resolution"
        );
        self.resolve_fallback(driver).await
    }

    /// Prefer the dedicated virtualization host when it resolves quickly;
    /// otherwise scroll the container itself.
    async fn resolve_host<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        container: &ElementHandle,
    ) -> ElementHandle {
        let Some(locator) = &self.host else {
            return container.clone();
        };
        match poll_until(&self.probe, move || probe_present(driver, locator)).await {
            Some(host) => host,
            None => {
                trace!(host = %locator, "virtualization host not found, scrolling container");
                container.clone()
            }
        }
    }

    async fn resolve_fallback<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> SondarResult<ElementHandle> {
        Resolver::with_options(self.fallback)
            .resolve_first(driver, &self.items)
            .await
    }
}

async fn probe_visible<D: UiDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
) -> Probe<ElementHandle> {
    let handle = match probe_present(driver, locator).await {
        Probe::Ready(handle) => handle,
        Probe::Pending => return Probe::Pending,
    };
    match driver.is_visible(&handle).await {
        Ok(true) => Probe::Ready(handle),
        Ok(false) => Probe::Pending,
        Err(error) => {
            trace!(%locator, %error, "visibility probe fault absorbed");
            Probe::Pending
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
