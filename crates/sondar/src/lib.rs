//! Sondar: resilient element interaction for dynamic, virtualized web UIs.
//!
//! Sondar (Spanish: "to sound out/probe") is the small engine a resilient
//! browser-automation layer needs when a single-page UI re-renders, windows
//! its lists, and hides the state its widgets actually hold: ordered-fallback
//! locator resolution, bounded polling for asynchronous state changes,
//! virtual-list search by incremental scrolling, and toggle-state
//! reconciliation through escalating actions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     SONDAR Architecture                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌───────────┐   ┌───────────────┐   ┌────────────────────┐    │
//! │   │ Interactor│──►│ Resolver /    │──►│ UiDriver           │    │
//! │   │ (facade)  │   │ Waiter /      │   │ (MockDriver,       │    │
//! │   │           │   │ Scroll/Toggle │   │  CdpDriver)        │    │
//! │   └───────────┘   └───────────────┘   └────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every wait is a bounded poll on the tokio timer with its own deadline;
//! one flow drives one session, and only one interaction is ever in flight
//! against it at a time. Timeouts and toggle mismatches degrade to typed
//! outcomes (`false`, [`ToggleOutcome::Mismatched`]) — only total locator
//! exhaustion and hard backend faults surface as errors.
//!
//! # Example
//!
//! ```ignore
//! use sondar::prelude::*;
//! use std::time::Duration;
//!
//! let flow = Interactor::new(driver);
//! let submit = LocatorSet::new(vec![
//!     Locator::css("button.btn-primary"),
//!     Locator::xpath("/html/body/div/form/button"),
//! ])?;
//! flow.click(&submit).await?;
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod driver;
mod interact;
mod locator;
mod result;
mod scroll;
mod toggle;
mod wait;

/// Real browser control via the Chrome DevTools Protocol
#[cfg(feature = "browser")]
mod browser;

#[cfg(feature = "browser")]
pub use browser::{Browser, BrowserConfig, CdpDriver};
pub use driver::{ElementHandle, MockDriver, MockElement, UiDriver};
pub use interact::Interactor;
pub use locator::{Locator, LocatorSet, Resolver, DEFAULT_CANDIDATE_TIMEOUT_MS};
pub use result::{SondarError, SondarResult};
pub use scroll::{
    ScrollStrategy, VirtualListSearch, DEFAULT_CONTAINER_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_SCROLL_STEP, DEFAULT_SETTLE_MS,
};
pub use toggle::{
    derive_checkbox_surface, StateProbe, ToggleAction, ToggleOutcome, TogglePhase,
    ToggleReconciler, ToggleResult, ToggleSpec, DEFAULT_RECHECK_DELAY_MS,
};
pub use wait::{
    poll_until, wait_for, wait_until, Condition, PollOptions, Probe, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS,
};

/// Convenience re-exports for interaction flows
pub mod prelude {
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::driver::*;
    pub use super::interact::*;
    pub use super::locator::*;
    pub use super::result::*;
    pub use super::scroll::*;
    pub use super::toggle::*;
    pub use super::wait::*;
}
