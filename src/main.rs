//! Sheetquote binary
//!
//! Runs one price calculation against a live browser: loads a configuration
//! document from disk, attaches to the DevTools endpoint from the engine
//! config, and prints the outcome as JSON.
//!
//! Usage:
//!   sheetquote <config.json> <url> <thickness_mm> <length_mm> <width_mm> <quantity> [country] [category]
//!
//! Environment:
//!   SHEETQUOTE_CDP_ENDPOINT   DevTools endpoint (default ws://localhost:9222)
//!   SHEETQUOTE_CAPTCHA_API_KEY  enables the external captcha solver
//!   RUST_LOG                  log filter, e.g. sheetquote=debug

use anyhow::{bail, Context};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sheetquote::cdp::CdpDriverFactory;
use sheetquote::collaborators::{
    CaptchaSolver, HttpCaptchaSolver, InMemoryConfigStore, StaticCountryRates, UnsolvableCaptcha,
};
use sheetquote::model::ConfigDocument;
use sheetquote::stealth::{HumanPacing, NoPacing, PacingPolicy};
use sheetquote::{CalculationRequest, EngineConfig, JobCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Sheetquote v{}", sheetquote::VERSION);

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 7 {
        bail!(
            "usage: {} <config.json> <url> <thickness_mm> <length_mm> <width_mm> <quantity> [country] [category]",
            args[0]
        );
    }

    let config = EngineConfig::from_env()?;

    let raw = std::fs::read_to_string(&args[1])
        .with_context(|| format!("reading config document {}", args[1]))?;
    let document = ConfigDocument::from_json(&raw)?;

    let request = CalculationRequest {
        url: args[2].clone(),
        thickness_mm: args[3].parse().context("thickness_mm")?,
        length_mm: args[4].parse().context("length_mm")?,
        width_mm: args[5].parse().context("width_mm")?,
        quantity: args[6].parse().context("quantity")?,
        country: args.get(7).cloned().unwrap_or_else(|| "nl".to_string()),
        category: args
            .get(8)
            .cloned()
            .unwrap_or_else(|| "square_meter_price".to_string()),
    };

    let store = Arc::new(InMemoryConfigStore::new());
    store.put(document);

    let pacing: Arc<dyn PacingPolicy> = if config.humanize {
        Arc::new(HumanPacing::new())
    } else {
        Arc::new(NoPacing)
    };
    let factory = Arc::new(CdpDriverFactory::new(
        config.cdp_endpoint.clone(),
        pacing,
        config.default_timeout(),
    ));
    let solver: Arc<dyn CaptchaSolver> = match &config.captcha_api_key {
        Some(key) => Arc::new(HttpCaptchaSolver::new(key.clone())),
        None => Arc::new(UnsolvableCaptcha),
    };

    let coordinator = JobCoordinator::new(
        config,
        factory,
        store,
        Arc::new(StaticCountryRates),
        solver,
    );

    let outcome = coordinator.calculate(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
