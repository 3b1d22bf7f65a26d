//! Toggle state reconciliation.
//!
//! Enhanced widget checkboxes decouple the clickable surface from the
//! semantic state holder (typically a hidden `<input>`), and synthetic and
//! native activation events are not reliably equivalent on them. The
//! reconciler therefore never assumes an action worked: it reads the backing
//! state, escalates through the action list, and re-reads after every
//! attempt. A state that stays wrong is reported as a value, not raised.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::driver::{ElementHandle, UiDriver};
use crate::locator::{Locator, LocatorSet, Resolver};
use crate::result::{SondarError, SondarResult};
use crate::wait::{wait_until, PollOptions};

/// Default pause before re-reading state after an activation (500ms)
pub const DEFAULT_RECHECK_DELAY_MS: u64 = 500;

// =============================================================================
// STATE ACCESS
// =============================================================================

/// How the control's semantic boolean state is read, independently of the
/// surface that takes clicks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateProbe {
    /// A page expression the driver evaluates to a boolean (e.g. reading a
    /// hidden input's `checked` property)
    Expression(String),
    /// Presence of an attribute on an element (present = `true`)
    Attribute {
        /// Element holding the state
        target: Locator,
        /// Attribute whose presence encodes the state
        name: String,
    },
}

impl StateProbe {
    /// State read through a page expression
    #[must_use]
    pub fn expression(expr: impl Into<String>) -> Self {
        Self::Expression(expr.into())
    }

    /// State read as attribute presence
    #[must_use]
    pub fn attribute(target: Locator, name: impl Into<String>) -> Self {
        Self::Attribute {
            target,
            name: name.into(),
        }
    }

    /// Read the current state. Failures here are hard backend faults: a
    /// reconciliation cannot proceed without knowing the state.
    pub async fn read<D: UiDriver + ?Sized>(&self, driver: &D) -> SondarResult<bool> {
        match self {
            Self::Expression(expr) => {
                let value = driver.evaluate(expr).await?;
                value.as_bool().ok_or_else(|| {
                    SondarError::backend(format!(
                        "state expression did not yield a boolean: {value}"
                    ))
                })
            }
            Self::Attribute { target, name } => {
                let handle = driver.resolve(target).await?.ok_or_else(|| {
                    SondarError::backend(format!("state element not found: {target}"))
                })?;
                Ok(driver.attribute(&handle, name).await?.is_some())
            }
        }
    }
}

// =============================================================================
// ACTIONS AND OUTCOMES
// =============================================================================

/// One escalation step against the clickable surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    /// Script-driven activation of the surface
    Synthetic,
    /// Native-style activation via simulated input
    Native,
}

impl ToggleAction {
    /// The default escalation order: synthetic first, native as the more
    /// direct fallback
    #[must_use]
    pub const fn escalation() -> [Self; 2] {
        [Self::Synthetic, Self::Native]
    }

    async fn apply<D: UiDriver + ?Sized>(
        self,
        driver: &D,
        surface: &ElementHandle,
    ) -> SondarResult<()> {
        match self {
            Self::Synthetic => driver.synthetic_activate(surface).await,
            Self::Native => driver.activate(surface).await,
        }
    }
}

/// Where the reconciliation state machine ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogglePhase {
    /// State never read (empty action list on a mismatch)
    Unknown,
    /// A read confirmed the desired state
    Matched,
    /// Still mismatched after the primary action
    MismatchAfterPrimary,
    /// Still mismatched after the secondary action; terminal
    MismatchAfterSecondary,
}

/// Final verdict of a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The backing state equals the desired value
    Matched,
    /// The desired state was not reached after full escalation
    Mismatched,
}

impl ToggleOutcome {
    /// Whether the desired state was reached
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        matches!(self, Self::Matched)
    }
}

/// Reconciliation report: the verdict plus how it was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleResult {
    /// Final verdict
    pub outcome: ToggleOutcome,
    /// Last phase the state machine visited
    pub phase: TogglePhase,
    /// Number of activation actions issued
    pub actions: usize,
}

// =============================================================================
// TOGGLE SPEC
// =============================================================================

/// Everything needed to drive one toggle control to a desired value
#[derive(Debug, Clone)]
pub struct ToggleSpec {
    desired: bool,
    state: StateProbe,
    surface: LocatorSet,
    actions: Vec<ToggleAction>,
    recheck_delay: Duration,
    ready: PollOptions,
}

impl ToggleSpec {
    /// Reconcile towards `desired`, reading state through `state` and
    /// acting on the surface resolved from `surface`
    #[must_use]
    pub fn new(desired: bool, state: StateProbe, surface: impl Into<LocatorSet>) -> Self {
        Self {
            desired,
            state,
            surface: surface.into(),
            actions: ToggleAction::escalation().to_vec(),
            recheck_delay: Duration::from_millis(DEFAULT_RECHECK_DELAY_MS),
            ready: PollOptions::default(),
        }
    }

    /// Replace the escalation list. An empty list reduces reconciliation to
    /// a pure state check.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<ToggleAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Pause before each post-action state re-read
    #[must_use]
    pub const fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    /// Budget for the surface's clickability gate
    #[must_use]
    pub const fn with_ready(mut self, options: PollOptions) -> Self {
        self.ready = options;
        self
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Drives a toggle control to its desired state via escalating actions
#[derive(Debug, Clone, Default)]
pub struct ToggleReconciler {
    resolver: Resolver,
}

impl ToggleReconciler {
    /// Reconciler with the default surface resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciler with a custom surface resolver
    #[must_use]
    pub const fn with_resolver(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Run the reconciliation.
    ///
    /// Returns `Matched`/`Mismatched` as a value; a mismatch is never an
    /// error. Errors are reserved for hard backend faults — a state read or
    /// an activation failing outright.
    ///
    /// # Errors
    ///
    /// [`SondarError::NotFound`] when the surface cannot be resolved on a
    /// mismatch; [`SondarError::Backend`] for state-read and activation
    /// faults.
    pub async fn reconcile<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        spec: &ToggleSpec,
    ) -> SondarResult<ToggleResult> {
        let current = spec.state.read(driver).await?;
        if current == spec.desired {
            // Idempotent no-op: the surface is never resolved, no action runs.
            debug!(desired = spec.desired, "toggle already in desired state");
            return Ok(ToggleResult {
                outcome: ToggleOutcome::Matched,
                phase: TogglePhase::Matched,
                actions: 0,
            });
        }

        let surface = self.resolver.resolve_first(driver, &spec.surface).await?;
        let surface_ref = &surface;
        let clickable = wait_until(&spec.ready, move || async move {
            driver.is_clickable(surface_ref).await
        })
        .await;
        if !clickable {
            debug!("surface never reported clickable, attempting activation anyway");
        }

        let mut phase = TogglePhase::Unknown;
        let mut actions = 0;
        for (index, action) in spec.actions.iter().enumerate() {
            action.apply(driver, &surface).await?;
            actions += 1;
            sleep(spec.recheck_delay).await;

            if spec.state.read(driver).await? == spec.desired {
                return Ok(ToggleResult {
                    outcome: ToggleOutcome::Matched,
                    phase: TogglePhase::Matched,
                    actions,
                });
            }
            phase = if index == 0 {
                TogglePhase::MismatchAfterPrimary
            } else {
                TogglePhase::MismatchAfterSecondary
            };
            debug!(?action, "activation did not reach desired state");
        }

        // Terminal: no escalation beyond the configured list.
        Ok(ToggleResult {
            outcome: ToggleOutcome::Mismatched,
            phase,
            actions,
        })
    }
}

// =============================================================================
// SURFACE DERIVATION
// =============================================================================

/// Derive the clickable wrapper for a custom checkbox recorded as a bare
/// `<input>` XPath.
///
/// Enhanced widgets hide the input and take clicks on a styled ancestor;
/// a recorded XPath ending in `/input` (or `/input[n]`) is trimmed to its
/// parent. Every other locator is returned unchanged.
#[must_use]
pub fn derive_checkbox_surface(locator: &Locator) -> Locator {
    let Locator::XPath(path) = locator else {
        return locator.clone();
    };
    match trim_input_segment(path) {
        Some(parent) => Locator::XPath(parent),
        None => locator.clone(),
    }
}

fn trim_input_segment(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    let segment = &path[idx + 1..];
    let indexed_input = segment
        .strip_prefix("input[")
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if (segment == "input" || indexed_input) && idx > 0 {
        Some(path[..idx].to_string())
    } else {
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};

    const CHECKED_EXPR: &str = "document.querySelector('#cb').checked";

    /// Hidden input plus its styled wrapper; `on_synthetic`/`on_native`
    /// select which activation kinds actually flip the backing state.
    fn checkbox_fixture(initial: bool, on_synthetic: bool, on_native: bool) -> MockDriver {
        let mut driver = MockDriver::new();
        driver.add_element(
            MockElement::new("cb")
                .matched_by(Locator::xpath("//table//label/span/input"))
                .checked(initial),
        );
        driver.add_element(
            MockElement::new("wrapper")
                .matched_by(Locator::xpath("//table//label/span"))
                .toggles("cb", on_synthetic, on_native),
        );
        driver.bind_checked_expression(CHECKED_EXPR, "cb");
        driver
    }

    fn spec() -> ToggleSpec {
        ToggleSpec::new(
            true,
            StateProbe::expression(CHECKED_EXPR),
            Locator::xpath("//table//label/span"),
        )
        .with_recheck_delay(Duration::from_millis(50))
        .with_ready(PollOptions::new(
            Duration::from_millis(200),
            Duration::from_millis(50),
        ))
    }

    mod reconcile_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_primary_action_flips_state() {
            let driver = checkbox_fixture(false, true, true);
            let result = ToggleReconciler::new()
                .reconcile(&driver, &spec())
                .await
                .unwrap();

            assert_eq!(result.outcome, ToggleOutcome::Matched);
            assert_eq!(result.actions, 1);
            assert_eq!(driver.calls_matching("synthetic_activate:wrapper"), 1);
            assert_eq!(driver.calls_matching("activate:wrapper"), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_secondary_action_flips_when_primary_does_not() {
            let driver = checkbox_fixture(false, false, true);
            let result = ToggleReconciler::new()
                .reconcile(&driver, &spec())
                .await
                .unwrap();

            assert_eq!(result.outcome, ToggleOutcome::Matched);
            assert_eq!(result.actions, 2);
            assert_eq!(driver.calls_matching("synthetic_activate:wrapper"), 1);
            assert_eq!(driver.calls_matching("activate:wrapper"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unresponsive_control_is_mismatched_not_error() {
            let driver = checkbox_fixture(false, false, false);
            let result = ToggleReconciler::new()
                .reconcile(&driver, &spec())
                .await
                .unwrap();

            assert_eq!(result.outcome, ToggleOutcome::Mismatched);
            assert_eq!(result.phase, TogglePhase::MismatchAfterSecondary);
            assert_eq!(result.actions, 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_already_matched_is_idempotent_noop() {
            let driver = checkbox_fixture(true, true, true);
            let result = ToggleReconciler::new()
                .reconcile(&driver, &spec())
                .await
                .unwrap();

            assert_eq!(result.outcome, ToggleOutcome::Matched);
            assert_eq!(result.actions, 0);
            assert!(!driver.was_called("synthetic_activate:"));
            assert!(!driver.was_called("activate:"));
            // The surface is never even resolved when already matched.
            assert!(!driver.was_called("resolve:"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_consecutive_reconciles_act_once() {
            let driver = checkbox_fixture(false, true, true);
            let reconciler = ToggleReconciler::new();

            let first = reconciler.reconcile(&driver, &spec()).await.unwrap();
            let second = reconciler.reconcile(&driver, &spec()).await.unwrap();

            assert_eq!(first.outcome, ToggleOutcome::Matched);
            assert_eq!(second.outcome, ToggleOutcome::Matched);
            assert_eq!(second.actions, 0);
            assert_eq!(driver.calls_matching("synthetic_activate:wrapper"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_attribute_state_probe() {
            let driver = checkbox_fixture(false, true, false);
            let spec = ToggleSpec::new(
                true,
                StateProbe::attribute(Locator::xpath("//table//label/span/input"), "checked"),
                Locator::xpath("//table//label/span"),
            )
            .with_recheck_delay(Duration::from_millis(50))
            .with_ready(PollOptions::new(
                Duration::from_millis(100),
                Duration::from_millis(50),
            ));

            let result = ToggleReconciler::new()
                .reconcile(&driver, &spec)
                .await
                .unwrap();
            assert_eq!(result.outcome, ToggleOutcome::Matched);
            assert_eq!(driver.checked_state_of("cb"), Some(true));
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_state_element_is_hard_fault() {
            let driver = MockDriver::new();
            let spec = ToggleSpec::new(
                true,
                StateProbe::attribute(Locator::css("#gone"), "checked"),
                Locator::css(".wrapper"),
            );
            let err = ToggleReconciler::new()
                .reconcile(&driver, &spec)
                .await
                .unwrap_err();
            assert!(matches!(err, SondarError::Backend { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_non_boolean_expression_is_hard_fault() {
            let mut driver = MockDriver::new();
            driver.script_eval("window.state", serde_json::json!("yes"));
            let spec = ToggleSpec::new(
                true,
                StateProbe::expression("window.state"),
                Locator::css(".wrapper"),
            );
            let err = ToggleReconciler::new()
                .reconcile(&driver, &spec)
                .await
                .unwrap_err();
            assert!(matches!(err, SondarError::Backend { .. }));
        }
    }

    mod surface_derivation_tests {
        use super::*;

        #[test]
        fn test_trailing_input_segment_trimmed() {
            let recorded = Locator::xpath("/html/body/table/tbody/tr/td[1]/label/span/input");
            assert_eq!(
                derive_checkbox_surface(&recorded),
                Locator::xpath("/html/body/table/tbody/tr/td[1]/label/span")
            );
        }

        #[test]
        fn test_indexed_input_segment_trimmed() {
            let recorded = Locator::xpath("/html/body/form/span/input[2]");
            assert_eq!(
                derive_checkbox_surface(&recorded),
                Locator::xpath("/html/body/form/span")
            );
        }

        #[test]
        fn test_non_input_xpath_unchanged() {
            let recorded = Locator::xpath("/html/body/div/button");
            assert_eq!(derive_checkbox_surface(&recorded), recorded);
        }

        #[test]
        fn test_css_locator_unchanged() {
            let recorded = Locator::css("label.checkbox input");
            assert_eq!(derive_checkbox_surface(&recorded), recorded);
        }

        #[test]
        fn test_bare_root_input_unchanged() {
            let recorded = Locator::xpath("/input");
            assert_eq!(derive_checkbox_surface(&recorded), recorded);
        }
    }
}
