//! Step and configuration document model
//!
//! A configuration is an ordered sequence of steps per pricing category of one
//! domain. Steps are immutable once a run starts; validation here is
//! structural only — whether a selector exists on the live page surfaces at
//! execution time.

use crate::model::dimensions::Unit;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

/// Symbolic wait duration; concrete intervals come from `EngineConfig` so
/// configurations never encode raw millisecond values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitDuration {
    Short,
    #[default]
    Default,
    Long,
    Longest,
}

/// One declarative unit of page interaction or price extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Locate an element and click it.
    Click {
        selector: String,
        #[serde(default)]
        continue_on_error: bool,
        #[serde(default)]
        skip_on_failure: bool,
    },

    /// Resolve the value template and type it into an input field.
    Input {
        selector: String,
        value: String,
        #[serde(default)]
        unit: Unit,
        #[serde(default = "default_true")]
        clear_first: bool,
        #[serde(default)]
        continue_on_error: bool,
        #[serde(default)]
        skip_on_failure: bool,
    },

    /// Resolve the value template and choose a matching option.
    Select {
        selector: String,
        value: String,
        #[serde(default)]
        unit: Unit,
        #[serde(default)]
        continue_on_error: bool,
        #[serde(default)]
        skip_on_failure: bool,
    },

    /// Suspend for a symbolic duration.
    Wait {
        #[serde(default)]
        duration: WaitDuration,
        #[serde(default)]
        continue_on_error: bool,
    },

    /// Read a price from the page, optionally post-processing it with a
    /// calculation expression, and record whether VAT is included.
    ReadPrice {
        selector: String,
        #[serde(default)]
        includes_vat: bool,
        #[serde(default)]
        calculation: Option<String>,
        #[serde(default)]
        continue_on_error: bool,
        #[serde(default)]
        skip_on_failure: bool,
    },

    /// Defocus the last interacted element (or a named one) so page-side
    /// recalculation handlers fire.
    Blur {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        continue_on_error: bool,
    },

    /// Run a script against the selected element, with substituted variables
    /// in scope.
    Modify {
        selector: String,
        script: String,
        #[serde(default)]
        continue_on_error: bool,
        #[serde(default)]
        skip_on_failure: bool,
    },

    /// Change page location. Relative URLs resolve against the current origin.
    Navigate {
        url: String,
        #[serde(default = "default_true")]
        wait_for_load: bool,
        /// Seconds; falls back to the engine default when absent
        #[serde(default)]
        timeout: Option<u64>,
        #[serde(default)]
        continue_on_error: bool,
    },

    /// Reload the current page.
    Reload {
        #[serde(default = "default_true")]
        wait_for_load: bool,
        #[serde(default)]
        timeout: Option<u64>,
        #[serde(default)]
        continue_on_error: bool,
    },

    /// Probe for a selector; when it is absent within the timeout, the run
    /// switches to the named fallback category.
    DecideConfig {
        selector: String,
        /// Seconds to wait for the probe selector
        #[serde(default)]
        timeout: Option<u64>,
        fallback_config: String,
    },

    /// Clear a captcha challenge through the configured solver.
    Captcha {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default = "default_true")]
        skip_on_failure: bool,
    },
}

impl Step {
    /// Step type name for logging and progress messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Click { .. } => "click",
            Step::Input { .. } => "input",
            Step::Select { .. } => "select",
            Step::Wait { .. } => "wait",
            Step::ReadPrice { .. } => "read_price",
            Step::Blur { .. } => "blur",
            Step::Modify { .. } => "modify",
            Step::Navigate { .. } => "navigate",
            Step::Reload { .. } => "reload",
            Step::DecideConfig { .. } => "decide_config",
            Step::Captcha { .. } => "captcha",
        }
    }

    /// Whether a recoverable failure of this step is tolerated.
    pub fn continue_on_error(&self) -> bool {
        match self {
            Step::Click {
                continue_on_error, ..
            }
            | Step::Input {
                continue_on_error, ..
            }
            | Step::Select {
                continue_on_error, ..
            }
            | Step::Wait {
                continue_on_error, ..
            }
            | Step::ReadPrice {
                continue_on_error, ..
            }
            | Step::Blur {
                continue_on_error, ..
            }
            | Step::Modify {
                continue_on_error, ..
            }
            | Step::Navigate {
                continue_on_error, ..
            }
            | Step::Reload {
                continue_on_error, ..
            } => *continue_on_error,
            Step::DecideConfig { .. } => false,
            Step::Captcha { .. } => false,
        }
    }

    /// Whether a failure skips the step's side effect entirely. Distinct from
    /// `continue_on_error`: a skipped step contributes nothing to later
    /// calculations, a tolerated one merely does not abort the run.
    pub fn skip_on_failure(&self) -> bool {
        match self {
            Step::Click {
                skip_on_failure, ..
            }
            | Step::Input {
                skip_on_failure, ..
            }
            | Step::Select {
                skip_on_failure, ..
            }
            | Step::ReadPrice {
                skip_on_failure, ..
            }
            | Step::Modify {
                skip_on_failure, ..
            }
            | Step::Captcha {
                skip_on_failure, ..
            } => *skip_on_failure,
            _ => false,
        }
    }

    /// Selectors must be non-empty and explicit timeouts positive.
    fn validate(&self, index: usize) -> Result<()> {
        let check_selector = |selector: &str| -> Result<()> {
            if selector.trim().is_empty() {
                return Err(Error::config_invalid(format!(
                    "step {} ({}): empty selector",
                    index,
                    self.kind_name()
                )));
            }
            Ok(())
        };

        match self {
            Step::Click { selector, .. }
            | Step::Input { selector, .. }
            | Step::Select { selector, .. }
            | Step::ReadPrice { selector, .. } => check_selector(selector)?,
            Step::Modify {
                selector, script, ..
            } => {
                check_selector(selector)?;
                if script.trim().is_empty() {
                    return Err(Error::config_invalid(format!(
                        "step {}: modify without script",
                        index
                    )));
                }
            }
            Step::Blur {
                selector: Some(selector),
                ..
            }
            | Step::Captcha {
                selector: Some(selector),
                ..
            } => check_selector(selector)?,
            Step::Navigate { url, timeout, .. } => {
                if url.trim().is_empty() {
                    return Err(Error::config_invalid(format!(
                        "step {}: navigate without url",
                        index
                    )));
                }
                if timeout == &Some(0) {
                    return Err(Error::config_invalid(format!(
                        "step {}: zero navigate timeout",
                        index
                    )));
                }
            }
            Step::DecideConfig {
                selector,
                timeout,
                fallback_config,
            } => {
                check_selector(selector)?;
                if fallback_config.trim().is_empty() {
                    return Err(Error::config_invalid(format!(
                        "step {}: decide_config without fallback_config",
                        index
                    )));
                }
                if timeout == &Some(0) {
                    return Err(Error::config_invalid(format!(
                        "step {}: zero decide_config timeout",
                        index
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Ordered step sequence for one pricing category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub steps: Vec<Step>,
}

/// Category map of one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub categories: HashMap<String, StepConfig>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Stored configuration document, one per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub domain: String,
    pub config: DomainConfig,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConfigDocument {
    /// Parse a raw JSON document into the typed model. Unknown step types and
    /// missing required fields per type are rejected here.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(raw)
            .map_err(|e| Error::config_invalid(format!("invalid config document: {}", e)))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Structural validation of every category.
    pub fn validate(&self) -> Result<()> {
        if self.config.categories.is_empty() {
            return Err(Error::config_invalid(format!(
                "domain '{}' declares no categories",
                self.domain
            )));
        }

        for (category, steps) in &self.config.categories {
            if steps.steps.is_empty() {
                return Err(Error::config_invalid(format!(
                    "category '{}' has no steps",
                    category
                )));
            }

            for (index, step) in steps.steps.iter().enumerate() {
                step.validate(index)?;

                // Fallback references must resolve within this document.
                if let Step::DecideConfig {
                    fallback_config, ..
                } = step
                {
                    if !self.config.categories.contains_key(fallback_config) {
                        return Err(Error::config_invalid(format!(
                            "category '{}' step {}: unknown fallback_config '{}'",
                            category, index, fallback_config
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Steps of the given category.
    pub fn category(&self, name: &str) -> Result<&StepConfig> {
        self.config.categories.get(name).ok_or_else(|| {
            Error::config_invalid(format!(
                "category '{}' not configured for domain '{}'",
                name, self.domain
            ))
        })
    }
}
