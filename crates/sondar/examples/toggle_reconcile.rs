//! Toggle Reconciliation Example
//!
//! Demonstrates driving an enhanced-widget checkbox (hidden input + styled
//! wrapper) to a desired state:
//! - idempotent no-op when already matched
//! - synthetic-then-native escalation with state re-reads
//! - `Mismatched` as a value when the control never responds
//!
//! # Running
//!
//! ```bash
//! cargo run --example toggle_reconcile -p sondar
//! ```

use sondar::prelude::*;
use std::time::Duration;

const CHECKED_EXPR: &str = "document.querySelector('input.hidden-checkbox').checked";

#[tokio::main]
async fn main() -> SondarResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sondar=debug".into()),
        )
        .init();

    println!("=== Sondar Toggle Reconciliation Example ===\n");

    demo_surface_derivation();
    demo_escalation(true, true, "responds to synthetic clicks").await?;
    demo_escalation(false, true, "only responds to native input").await?;
    demo_escalation(false, false, "never responds").await?;
    demo_idempotence().await?;

    println!("\n=== Toggle Reconciliation Example Complete ===");
    Ok(())
}

fn checkbox_page(on_synthetic: bool, on_native: bool, initial: bool) -> MockDriver {
    let mut driver = MockDriver::new();
    driver.add_element(
        MockElement::new("hidden-input")
            .matched_by(Locator::css("input.hidden-checkbox"))
            .checked(initial),
    );
    driver.add_element(
        MockElement::new("wrapper")
            .matched_by(Locator::css("label.checkbox-wrapper"))
            .toggles("hidden-input", on_synthetic, on_native),
    );
    driver.bind_checked_expression(CHECKED_EXPR, "hidden-input");
    driver
}

fn spec() -> ToggleSpec {
    ToggleSpec::new(
        true,
        StateProbe::expression(CHECKED_EXPR),
        Locator::css("label.checkbox-wrapper"),
    )
    .with_recheck_delay(Duration::from_millis(50))
    .with_ready(PollOptions::new(
        Duration::from_millis(200),
        Duration::from_millis(50),
    ))
}

fn demo_surface_derivation() {
    println!("--- Demo 1: clickable surface derivation ---\n");

    let recorded = Locator::xpath("/html/body/table/tbody/tr/td[1]/label/span/input");
    let surface = derive_checkbox_surface(&recorded);
    println!("Recorded locator: {recorded}");
    println!("Derived surface:  {surface}\n");
}

async fn demo_escalation(
    on_synthetic: bool,
    on_native: bool,
    description: &str,
) -> SondarResult<()> {
    println!("--- Control that {description} ---\n");

    let driver = checkbox_page(on_synthetic, on_native, false);
    let result = ToggleReconciler::new().reconcile(&driver, &spec()).await?;

    println!("Outcome: {:?}", result.outcome);
    println!("Phase:   {:?}", result.phase);
    println!("Actions: {}", result.actions);
    println!(
        "Backing state now: {:?}\n",
        driver.checked_state_of("hidden-input")
    );
    Ok(())
}

async fn demo_idempotence() -> SondarResult<()> {
    println!("--- Consecutive reconciles are idempotent ---\n");

    let driver = checkbox_page(true, true, false);
    let reconciler = ToggleReconciler::new();

    let first = reconciler.reconcile(&driver, &spec()).await?;
    let second = reconciler.reconcile(&driver, &spec()).await?;

    println!("First run:  {:?} after {} action(s)", first.outcome, first.actions);
    println!("Second run: {:?} after {} action(s)", second.outcome, second.actions);
    println!(
        "Total activations issued: {}",
        driver.calls_matching("synthetic_activate:wrapper")
            + driver.calls_matching("activate:wrapper")
    );
    Ok(())
}
