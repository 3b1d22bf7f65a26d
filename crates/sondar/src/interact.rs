//! High-level interaction facade.
//!
//! Every recorded step in a resilient flow repeats the same prelude: resolve
//! from a fallback list, bring the target into view, gate on readiness, then
//! act. [`Interactor`] owns the driver and packages that prelude, alongside
//! the four engine operations exposed to orchestration code.

use std::time::Duration;

use tracing::{debug, trace};

use crate::driver::{ElementHandle, UiDriver};
use crate::locator::{LocatorSet, Resolver};
use crate::result::SondarResult;
use crate::scroll::VirtualListSearch;
use crate::toggle::{ToggleReconciler, ToggleResult, ToggleSpec};
use crate::wait::{wait_for, wait_until, Condition, PollOptions};

/// Driver-owning facade for resilient interaction flows.
///
/// One interactor drives one browsing session, and only one operation is
/// ever in flight against it at a time — concurrent actions against a
/// single rendering surface produce non-reproducible UI state.
#[derive(Debug)]
pub struct Interactor<D: UiDriver> {
    driver: D,
    resolver: Resolver,
    ready: PollOptions,
}

impl<D: UiDriver> Interactor<D> {
    /// Wrap a driver with default resolution and readiness budgets
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            resolver: Resolver::default(),
            ready: PollOptions::default(),
        }
    }

    /// Replace the fallback resolver used by prepared actions
    #[must_use]
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the readiness gate budget used before activations
    #[must_use]
    pub fn with_ready(mut self, options: PollOptions) -> Self {
        self.ready = options;
        self
    }

    /// Borrow the underlying driver
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Unwrap back into the driver
    pub fn into_driver(self) -> D {
        self.driver
    }

    // =========================================================================
    // Engine operations
    // =========================================================================

    /// Resolve the first workable candidate with the configured budget
    pub async fn resolve(&self, candidates: &LocatorSet) -> SondarResult<ElementHandle> {
        self.resolver.resolve_first(&self.driver, candidates).await
    }

    /// Resolve with an explicit per-candidate budget
    pub async fn resolve_within(
        &self,
        candidates: &LocatorSet,
        per_candidate_timeout: Duration,
    ) -> SondarResult<ElementHandle> {
        Resolver::new(per_candidate_timeout)
            .resolve_first(&self.driver, candidates)
            .await
    }

    /// Wait for a condition; `false` on expiry, never an error
    pub async fn wait_for(&self, condition: &Condition, options: &PollOptions) -> bool {
        wait_for(&self.driver, condition, options).await
    }

    /// Search a windowed list by incremental scrolling
    pub async fn search_virtual_list(
        &self,
        search: &VirtualListSearch,
    ) -> SondarResult<ElementHandle> {
        search.run(&self.driver).await
    }

    /// Drive a toggle control to its desired state
    pub async fn reconcile_toggle(&self, spec: &ToggleSpec) -> SondarResult<ToggleResult> {
        ToggleReconciler::with_resolver(self.resolver.clone())
            .reconcile(&self.driver, spec)
            .await
    }

    // =========================================================================
    // Prepared actions
    // =========================================================================

    /// Resolve, bring into view, gate on clickability, activate.
    ///
    /// A readiness gate that expires does not abort the click: flows must
    /// continue past cosmetic flakiness, and the activation itself reports
    /// the hard faults.
    pub async fn click(&self, candidates: &LocatorSet) -> SondarResult<ElementHandle> {
        let handle = self.resolve(candidates).await?;
        self.bring_into_view(&handle).await;

        let driver = &self.driver;
        let target = &handle;
        let clickable = wait_until(&self.ready, move || async move {
            driver.is_clickable(target).await
        })
        .await;
        if !clickable {
            debug!(id = %handle.id, "element never reported clickable, activating anyway");
        }

        self.driver.activate(&handle).await?;
        Ok(handle)
    }

    /// Resolve, bring into view, focus, type
    pub async fn fill(&self, candidates: &LocatorSet, text: &str) -> SondarResult<ElementHandle> {
        let handle = self.resolve(candidates).await?;
        self.bring_into_view(&handle).await;
        self.driver.activate(&handle).await?;
        self.driver.type_text(&handle, text).await?;
        Ok(handle)
    }

    /// Resolve and move the pointer onto the element.
    ///
    /// Returns whether the hover actually happened: pointer faults are
    /// absorbed, matching flows where a missed hover is cosmetic.
    pub async fn hover(&self, candidates: &LocatorSet) -> SondarResult<bool> {
        let handle = self.resolve(candidates).await?;
        match self.driver.move_pointer_to(&handle).await {
            Ok(()) => Ok(true),
            Err(error) => {
                debug!(id = %handle.id, %error, "hover skipped");
                Ok(false)
            }
        }
    }

    /// Best-effort scroll-into-view via pointer proximity; failures are
    /// traced and ignored
    async fn bring_into_view(&self, handle: &ElementHandle) {
        if let Err(error) = self.driver.move_pointer_to(handle).await {
            trace!(id = %handle.id, %error, "scroll-into-view skipped");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
