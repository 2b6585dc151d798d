//! Collaborator boundaries
//!
//! The engine consumes configuration storage, country VAT data and captcha
//! solving through these traits; it owns none of them. Reference
//! implementations live here for embedding and tests: an in-memory config
//! store with snapshot semantics, a static VAT table, an HTTP client for a
//! 2Captcha-style solving service, and a solver that always refuses.

use async_trait::async_trait;
use phf::phf_map;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::model::ConfigDocument;
use crate::{Error, Result};

/// VAT rate and currency for one country.
#[derive(Debug, Clone, PartialEq)]
pub struct VatInfo {
    /// Rate as a fraction, e.g. 0.21 for 21%
    pub rate: f64,
    /// ISO currency code
    pub currency: String,
}

/// Versioned configuration storage; the engine only ever reads the active
/// snapshot and holds no mutation rights.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_active_config(&self, domain: &str) -> Result<ConfigDocument>;
}

/// Country VAT rates and currencies.
#[async_trait]
pub trait CountryRates: Send + Sync {
    async fn vat_rate(&self, country: &str) -> Result<VatInfo>;
}

/// A captcha challenge encountered mid-run.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// URL of the page presenting the challenge
    pub page_url: String,
    /// reCAPTCHA site key, when one could be read off the page
    pub site_key: Option<String>,
}

/// External captcha solving. The run suspends while a solve is in flight;
/// implementations may take arbitrarily long (paid service, manual operator).
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String>;
}

/// In-memory config store. `get_active_config` hands out a clone, so an
/// in-flight run keeps its snapshot even when the stored document is replaced.
#[derive(Default)]
pub struct InMemoryConfigStore {
    documents: RwLock<HashMap<String, ConfigDocument>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the document for its domain.
    pub fn put(&self, document: ConfigDocument) {
        if let Ok(mut documents) = self.documents.write() {
            documents.insert(document.domain.clone(), document);
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_active_config(&self, domain: &str) -> Result<ConfigDocument> {
        self.documents
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .get(domain)
            .cloned()
            .ok_or_else(|| {
                Error::config_invalid(format!("no configuration found for domain: {}", domain))
            })
    }
}

/// Standard VAT rate (percent) and currency per country code.
static VAT_TABLE: phf::Map<&'static str, (f64, &'static str)> = phf_map! {
    "nl" => (21.0, "EUR"),
    "be" => (21.0, "EUR"),
    "de" => (19.0, "EUR"),
    "fr" => (20.0, "EUR"),
    "at" => (20.0, "EUR"),
    "es" => (21.0, "EUR"),
    "it" => (22.0, "EUR"),
    "pl" => (23.0, "PLN"),
    "se" => (25.0, "SEK"),
    "dk" => (25.0, "DKK"),
    "gb" => (20.0, "GBP"),
};

/// Compile-time VAT table for the countries the scraper serves.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCountryRates;

#[async_trait]
impl CountryRates for StaticCountryRates {
    async fn vat_rate(&self, country: &str) -> Result<VatInfo> {
        let key = country.to_ascii_lowercase();
        VAT_TABLE
            .get(key.as_str())
            .map(|(percent, currency)| VatInfo {
                rate: percent / 100.0,
                currency: (*currency).to_string(),
            })
            .ok_or_else(|| {
                Error::config_invalid(format!("no VAT configuration for country: {}", country))
            })
    }
}

/// HTTP client for a 2Captcha-compatible solving service.
pub struct HttpCaptchaSolver {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl HttpCaptchaSolver {
    pub fn new(api_key: String) -> Self {
        Self::with_base("https://2captcha.com".to_string(), api_key)
    }

    pub fn with_base(api_base: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
        }
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String> {
        let site_key = challenge
            .site_key
            .as_deref()
            .ok_or_else(|| Error::captcha("challenge without a site key"))?;

        let submit_url = format!(
            "{}/in.php?key={}&method=userrecaptcha&googlekey={}&pageurl={}&json=1",
            self.api_base, self.api_key, site_key, challenge.page_url
        );
        let submitted: serde_json::Value = self
            .client
            .get(&submit_url)
            .send()
            .await
            .map_err(|e| Error::captcha(format!("solver submit failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::captcha(format!("solver submit response invalid: {}", e)))?;

        if submitted.get("status").and_then(|s| s.as_i64()) != Some(1) {
            return Err(Error::captcha(format!(
                "solver rejected challenge: {}",
                submitted
            )));
        }
        let request_id = submitted
            .get("request")
            .and_then(|r| r.as_str())
            .ok_or_else(|| Error::captcha("solver returned no request id"))?
            .to_string();

        debug!(request_id, "Captcha submitted, polling for solution");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let poll_url = format!(
                "{}/res.php?key={}&action=get&id={}&json=1",
                self.api_base, self.api_key, request_id
            );
            let polled: serde_json::Value = self
                .client
                .get(&poll_url)
                .send()
                .await
                .map_err(|e| Error::captcha(format!("solver poll failed: {}", e)))?
                .json()
                .await
                .map_err(|e| Error::captcha(format!("solver poll response invalid: {}", e)))?;

            if polled.get("status").and_then(|s| s.as_i64()) == Some(1) {
                if let Some(token) = polled.get("request").and_then(|r| r.as_str()) {
                    return Ok(token.to_string());
                }
            }
        }

        Err(Error::captcha("solver did not answer within the poll budget"))
    }
}

/// A solver that always refuses. Wired in when no solving service is
/// configured, so blocked runs surface `CaptchaRequired` instead of hanging.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsolvableCaptcha;

#[async_trait]
impl CaptchaSolver for UnsolvableCaptcha {
    async fn solve(&self, challenge: &CaptchaChallenge) -> Result<String> {
        Err(Error::captcha(format!(
            "no captcha solver configured for {}",
            challenge.page_url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_rates_known_country() {
        let rates = StaticCountryRates;
        let info = rates.vat_rate("nl").await.unwrap();
        assert!((info.rate - 0.21).abs() < 1e-9);
        assert_eq!(info.currency, "EUR");

        // Case-insensitive lookup
        let info = rates.vat_rate("DE").await.unwrap();
        assert!((info.rate - 0.19).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_static_rates_unknown_country() {
        let err = StaticCountryRates.vat_rate("xx").await.unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn test_in_memory_store_snapshot_isolation() {
        let store = InMemoryConfigStore::new();
        let raw = r#"{
            "domain": "example.com",
            "config": {
                "categories": {
                    "square_meter_price": {
                        "steps": [{"type": "read_price", "selector": ".price"}]
                    }
                }
            }
        }"#;
        store.put(ConfigDocument::from_json(raw).unwrap());

        let snapshot = store.get_active_config("example.com").await.unwrap();

        // Replace the stored document; the snapshot must be unaffected.
        let replaced = r#"{
            "domain": "example.com",
            "config": {
                "categories": {
                    "shipping": {
                        "steps": [{"type": "read_price", "selector": ".shipping"}]
                    }
                }
            }
        }"#;
        store.put(ConfigDocument::from_json(replaced).unwrap());

        assert!(snapshot.category("square_meter_price").is_ok());
        let current = store.get_active_config("example.com").await.unwrap();
        assert!(current.category("square_meter_price").is_err());
    }

    #[tokio::test]
    async fn test_unsolvable_refuses() {
        let challenge = CaptchaChallenge {
            page_url: "https://example.com".to_string(),
            site_key: None,
        };
        let err = UnsolvableCaptcha.solve(&challenge).await.unwrap_err();
        assert!(matches!(err, Error::CaptchaRequired(_)));
    }
}
