//! Virtual List Search Example
//!
//! Demonstrates finding an option inside a windowed (virtualized) dropdown:
//! - container visibility wait
//! - dedicated scroll-host resolution
//! - pointer priming before scrolling
//! - dual scroll strategies applied every attempt
//! - fallback to plain resolution on exhaustion
//!
//! # Running
//!
//! ```bash
//! cargo run --example virtual_list -p sondar
//! ```

use sondar::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> SondarResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sondar=debug".into()),
        )
        .init();

    println!("=== Sondar Virtual List Search Example ===\n");

    demo_deep_item().await?;
    demo_capacity_limit().await;

    println!("\n=== Virtual List Search Example Complete ===");
    Ok(())
}

/// A dropdown whose 40th row only mounts after ~12 scroll increments.
fn windowed_dropdown(option_offset: f64) -> MockDriver {
    let mut driver = MockDriver::new();
    driver.add_element(
        MockElement::new("dropdown").matched_by(Locator::css("div.select-dropdown")),
    );
    driver.add_element(
        MockElement::new("holder").matched_by(Locator::css("div.virtual-list-holder")),
    );
    driver.add_element(
        MockElement::new("target-option")
            .matched_by(Locator::text("approver one"))
            .mounts_at_offset("holder", option_offset),
    );
    driver
}

fn option_candidates() -> LocatorSet {
    LocatorSet::new(vec![
        Locator::text("approver one"),
        Locator::xpath("//*[@title='approver one']"),
    ])
    .expect("non-empty candidates")
}

async fn demo_deep_item() -> SondarResult<()> {
    println!("--- Demo 1: item twelve increments deep ---\n");

    let driver = windowed_dropdown(960.0);
    let search = VirtualListSearch::new(Locator::css("div.select-dropdown"), option_candidates())
        .with_host(Locator::css("div.virtual-list-holder"))
        .with_step(80.0)
        .with_max_attempts(20)
        .with_settle(Duration::from_millis(20))
        .with_probe(PollOptions::new(
            Duration::from_millis(50),
            Duration::from_millis(25),
        ));

    let handle = search.run(&driver).await?;
    println!("Found element: {}", handle.id);
    println!(
        "Holder scrolled to: {:?}px",
        driver.scroll_offset_of("holder")
    );
    println!(
        "Scroll assignments issued: {}",
        driver.calls_matching("set_scroll_offset:holder")
    );
    println!(
        "Relative scrolls issued:   {}\n",
        driver.calls_matching("scroll_by:holder")
    );
    Ok(())
}

async fn demo_capacity_limit() {
    println!("--- Demo 2: item beyond max_attempts x step ---\n");

    // 2000px deep, but 20 attempts x 80px only reach ~1600px.
    let driver = windowed_dropdown(2_000.0);
    let search = VirtualListSearch::new(Locator::css("div.select-dropdown"), option_candidates())
        .with_host(Locator::css("div.virtual-list-holder"))
        .with_settle(Duration::from_millis(10))
        .with_probe(PollOptions::new(
            Duration::from_millis(30),
            Duration::from_millis(15),
        ))
        .with_fallback(PollOptions::new(
            Duration::from_millis(200),
            Duration::from_millis(50),
        ));

    match search.run(&driver).await {
        Ok(handle) => println!("Unexpectedly found: {}", handle.id),
        Err(error) => println!("Search exhausted as documented: {error}"),
    }
}
