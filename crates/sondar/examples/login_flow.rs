//! Login Flow Example
//!
//! Drives a simulated single-page app through the [`Interactor`] facade the
//! way a recorded flow would: fallback locator lists around every step,
//! readiness gates before each action, a virtualized assignee dropdown and
//! a custom checkbox at the end.
//!
//! # Running
//!
//! ```bash
//! cargo run --example login_flow -p sondar
//! ```

use sondar::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> SondarResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sondar=info".into()),
        )
        .init();

    println!("=== Sondar Login Flow Example ===\n");

    let flow = Interactor::new(build_page())
        .with_resolver(Resolver::with_options(PollOptions::new(
            Duration::from_millis(500),
            Duration::from_millis(50),
        )))
        .with_ready(PollOptions::new(
            Duration::from_millis(500),
            Duration::from_millis(50),
        ));

    // Step 1 - user name, id selector first, positional XPath as last resort
    let user_field = LocatorSet::new(vec![
        Locator::css("#loginID"),
        Locator::xpath("//*[@id=\"loginID\"]"),
        Locator::xpath("/html/body/div/div/form/div[1]/input"),
    ])?;
    flow.fill(&user_field, "demo-user").await?;
    println!("Step 1 - Input  | user name field");

    // Step 2 - password
    let password_field = LocatorSet::new(vec![
        Locator::css("#loginPassword"),
        Locator::xpath("//*[@id=\"loginPassword\"]"),
    ])?;
    flow.fill(&password_field, "demo-pass").await?;
    println!("Step 2 - Input  | password field");

    // Step 3 - hover the submit button; a missed hover is cosmetic
    let submit = LocatorSet::new(vec![
        Locator::css("button.btn-primary"),
        Locator::xpath("/html/body/div/div/form/button"),
    ])?;
    let hovered = flow.hover(&submit).await?;
    println!("Step 3 - Hover  | performed: {hovered}");

    // Step 4 - submit stays obscured by a spinner briefly; the readiness
    // gate waits it out
    flow.click(&submit).await?;
    println!("Step 4 - Click  | submit");

    // Step 5 - pick an assignee from a virtualized dropdown
    let option = flow
        .search_virtual_list(
            &VirtualListSearch::new(
                Locator::css("div.select-dropdown"),
                LocatorSet::new(vec![
                    Locator::text("approver one"),
                    Locator::xpath("//*[@title='approver one']"),
                ])?,
            )
            .with_host(Locator::css("div.virtual-list-holder"))
            .with_settle(Duration::from_millis(20))
            .with_probe(PollOptions::new(
                Duration::from_millis(50),
                Duration::from_millis(25),
            )),
        )
        .await?;
    println!("Step 5 - Search | found {}", option.id);

    // Step 6 - accept-terms checkbox: hidden input, styled wrapper
    let recorded = Locator::xpath("/html/body/div/form/table/tbody/tr/td[1]/label/span/input");
    let surface = derive_checkbox_surface(&recorded);
    let result = flow
        .reconcile_toggle(
            &ToggleSpec::new(
                true,
                StateProbe::attribute(Locator::css("input.accept-terms"), "checked"),
                surface,
            )
            .with_recheck_delay(Duration::from_millis(50))
            .with_ready(PollOptions::new(
                Duration::from_millis(200),
                Duration::from_millis(50),
            )),
        )
        .await?;
    println!(
        "Step 6 - Toggle | {:?} after {} action(s)",
        result.outcome, result.actions
    );

    println!("\n*** Flow complete ***");
    Ok(())
}

/// A small fake page with the shapes this flow needs: delayed enablement on
/// the submit button, a windowed dropdown, and a checkbox whose state lives
/// on a hidden input.
fn build_page() -> MockDriver {
    let mut driver = MockDriver::new();

    driver.add_element(
        MockElement::new("user")
            .matched_by(Locator::css("#loginID"))
            .with_tag("input"),
    );
    driver.add_element(
        MockElement::new("password")
            .matched_by(Locator::css("#loginPassword"))
            .with_tag("input"),
    );
    driver.add_element(
        MockElement::new("submit")
            .matched_by(Locator::css("button.btn-primary"))
            .with_tag("button")
            .obscured_for(Duration::from_millis(150)),
    );

    driver.add_element(
        MockElement::new("dropdown").matched_by(Locator::css("div.select-dropdown")),
    );
    driver.add_element(
        MockElement::new("holder").matched_by(Locator::css("div.virtual-list-holder")),
    );
    driver.add_element(
        MockElement::new("assignee-option")
            .matched_by(Locator::text("approver one"))
            .mounts_at_offset("holder", 640.0),
    );

    driver.add_element(
        MockElement::new("terms-input")
            .matched_by(Locator::css("input.accept-terms"))
            .checked(false),
    );
    driver.add_element(
        MockElement::new("terms-wrapper")
            .matched_by(Locator::xpath(
                "/html/body/div/form/table/tbody/tr/td[1]/label/span",
            ))
            .toggles("terms-input", true, true),
    );

    driver
}
