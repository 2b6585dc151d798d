//! Shared fixtures for integration tests

use std::sync::Arc;

use sheetquote::collaborators::{InMemoryConfigStore, StaticCountryRates, UnsolvableCaptcha};
use sheetquote::model::ConfigDocument;
use sheetquote::session::mock::{MockDriverFactory, MockPage};
use sheetquote::{CalculationRequest, EngineConfig, JobCoordinator};

/// Engine config tuned so tests run in milliseconds.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        selector_wait_ms: 20,
        wait_short_ms: 1,
        wait_default_ms: 1,
        wait_long_ms: 1,
        wait_longest_ms: 1,
        backoff_base_ms: 1,
        transient_retries: 2,
        max_step_retries: 3,
        session_failure_threshold: 2,
        session_reuse_secs: 0,
        run_timeout_secs: 30,
        humanize: false,
        ..EngineConfig::default()
    }
}

/// Build a config document for `example.com` from category JSON fragments.
pub fn document(categories: &[(&str, &str)]) -> ConfigDocument {
    let body = categories
        .iter()
        .map(|(name, steps)| format!(r#""{}": {{ "steps": {} }}"#, name, steps))
        .collect::<Vec<_>>()
        .join(",");
    let raw = format!(
        r#"{{
            "domain": "example.com",
            "config": {{ "categories": {{ {} }}, "domain": "example.com" }},
            "createdAt": "2025-03-01T10:00:00Z",
            "updatedAt": "2025-03-02T10:00:00Z"
        }}"#,
        body
    );
    ConfigDocument::from_json(&raw).expect("test document is valid")
}

/// Coordinator wired to a shared mock page, plus the factory for recreation
/// assertions.
pub fn harness(
    config: EngineConfig,
    page: Arc<MockPage>,
    doc: ConfigDocument,
) -> (JobCoordinator, Arc<MockDriverFactory>) {
    let factory = Arc::new(MockDriverFactory::shared(page));
    let store = Arc::new(InMemoryConfigStore::new());
    store.put(doc);

    let coordinator = JobCoordinator::new(
        config,
        factory.clone(),
        store,
        Arc::new(StaticCountryRates),
        Arc::new(UnsolvableCaptcha),
    );
    (coordinator, factory)
}

/// Standard request: 2x500x300 mm, four pieces, Dutch VAT.
pub fn request() -> CalculationRequest {
    CalculationRequest {
        url: "https://www.example.com/sheet/acrylic".to_string(),
        thickness_mm: 2.0,
        length_mm: 500.0,
        width_mm: 300.0,
        quantity: 4,
        country: "nl".to_string(),
        category: "square_meter_price".to_string(),
    }
}
