//! Run results and step outcomes

use crate::error::{Error, ErrorKind};
use serde::Serialize;

/// Price extracted by a run, with VAT normalization applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceResult {
    /// The reading after any per-item calculation, as extracted
    pub amount: f64,
    /// ISO currency code from the country configuration
    pub currency: String,
    /// Whether the source reading included VAT
    pub includes_vat: bool,
    /// Price excluding VAT
    pub net: f64,
    /// Price including VAT
    pub gross: f64,
}

/// Result of executing a single step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step completed
    Ok,
    /// The step failed in a way per-step policy may tolerate
    Recoverable(Error),
    /// The step failed in a way that must abort the run
    Fatal(Error),
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok)
    }
}

/// Terminal state of one calculation run.
#[derive(Debug, Clone, Serialize)]
pub enum ExecutionOutcome {
    /// A `read_price` step produced a value and the sequence completed
    Succeeded(PriceResult),
    /// A step failed fatally or retries were exhausted
    Failed {
        step_index: usize,
        kind: ErrorKind,
        message: String,
    },
    /// The run was cancelled at a suspension point
    Aborted { reason: String },
}

impl ExecutionOutcome {
    pub fn failed(step_index: usize, error: &Error) -> Self {
        ExecutionOutcome::Failed {
            step_index,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded(_))
    }

    pub fn price(&self) -> Option<&PriceResult> {
        match self {
            ExecutionOutcome::Succeeded(price) => Some(price),
            _ => None,
        }
    }
}
