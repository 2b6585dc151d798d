//! Per-run mutable state

use std::sync::Arc;

use crate::model::{DimensionInput, PriceResult};
use crate::runner::progress::StepStatus;
use crate::session::{BrowserSession, PageDriver};

/// Outcome of one executed step, kept in the run's append-only log.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub kind: &'static str,
    pub status: StepStatus,
    pub message: Option<String>,
}

/// The mutable state threaded through one run.
///
/// Everything a step may read or leave behind lives here: resolved dimension
/// bindings, the active session, the last-focused element (for `blur`), the
/// accumulated price, a pending config-switch request, and the step log.
pub struct ExecutionContext {
    pub dims: DimensionInput,
    pub country: String,
    pub session: Arc<BrowserSession>,
    pub last_focused: Option<String>,
    pub price: Option<PriceResult>,
    /// Set by `decide_config` when the run must continue on another category
    pub switch_request: Option<String>,
    pub log: Vec<StepRecord>,
}

impl ExecutionContext {
    pub fn new(dims: DimensionInput, country: String, session: Arc<BrowserSession>) -> Self {
        Self {
            dims,
            country,
            session,
            last_focused: None,
            price: None,
            switch_request: None,
            log: Vec::new(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        self.session.driver()
    }

    pub fn record(
        &mut self,
        index: usize,
        kind: &'static str,
        status: StepStatus,
        message: Option<String>,
    ) {
        self.log.push(StepRecord {
            index,
            kind,
            status,
            message,
        });
    }
}
