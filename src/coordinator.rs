//! Job coordinator
//!
//! Accepts calculation requests, snapshots the relevant configuration,
//! allocates workflow runners under a bounded concurrency pool, enforces the
//! per-run overall timeout, and exposes each run's ordered progress stream.
//! It never inspects step semantics.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::collaborators::{CaptchaSolver, ConfigStore, CountryRates};
use crate::config::EngineConfig;
use crate::executor::ActionExecutor;
use crate::model::{DimensionInput, ExecutionOutcome};
use crate::runner::{ProgressEvent, ProgressSink, RunRequest, WorkflowRunner};
use crate::session::{DriverFactory, SessionManager};
use crate::stealth::{HumanPacing, NoPacing, PacingPolicy};
use crate::{Error, Result};

fn default_category() -> String {
    "square_meter_price".to_string()
}

/// One price calculation request.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CalculationRequest {
    pub url: String,
    #[serde(rename = "thicknessMm")]
    pub thickness_mm: f64,
    #[serde(rename = "lengthMm")]
    pub length_mm: f64,
    #[serde(rename = "widthMm")]
    pub width_mm: f64,
    pub quantity: u32,
    pub country: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl CalculationRequest {
    pub fn dimensions(&self) -> DimensionInput {
        DimensionInput::new(
            self.thickness_mm,
            self.length_mm,
            self.width_mm,
            self.quantity,
        )
    }
}

/// Handle to a submitted run: its ordered progress stream, its outcome, and a
/// cancellation lever.
pub struct CalculationTicket {
    pub run_id: String,
    events: ReceiverStream<ProgressEvent>,
    outcome: oneshot::Receiver<ExecutionOutcome>,
    cancel: CancellationToken,
}

impl CalculationTicket {
    /// Next progress event, `None` once the run is over.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.next().await
    }

    /// The remaining progress events as a stream.
    pub fn events(&mut self) -> &mut ReceiverStream<ProgressEvent> {
        &mut self.events
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> ExecutionOutcome {
        self.outcome.await.unwrap_or(ExecutionOutcome::Aborted {
            reason: "runner dropped".to_string(),
        })
    }
}

/// Strip scheme and `www.` down to the bare domain a configuration is keyed
/// by. Scheme-less input is tolerated.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let parsed = Url::parse(&with_scheme)
        .map_err(|e| Error::config_invalid(format!("invalid url '{}': {}", raw, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::config_invalid(format!("url '{}' has no host", raw)))?;
    Ok(host
        .strip_prefix("www.")
        .unwrap_or(host)
        .to_ascii_lowercase())
}

/// Thin scheduler over workflow runners.
pub struct JobCoordinator {
    config: EngineConfig,
    sessions: Arc<SessionManager>,
    executor: Arc<ActionExecutor>,
    store: Arc<dyn ConfigStore>,
    permits: Arc<Semaphore>,
}

impl JobCoordinator {
    /// Wire up a coordinator. All collaborators are injected; nothing is read
    /// from ambient state.
    pub fn new(
        config: EngineConfig,
        factory: Arc<dyn DriverFactory>,
        store: Arc<dyn ConfigStore>,
        rates: Arc<dyn CountryRates>,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        let pacing: Arc<dyn PacingPolicy> = if config.humanize {
            Arc::new(HumanPacing::new())
        } else {
            Arc::new(NoPacing)
        };
        let sessions = Arc::new(SessionManager::from_config(factory, &config));
        let executor = Arc::new(ActionExecutor::new(
            config.clone(),
            pacing,
            rates,
            solver,
        ));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs));

        Self {
            config,
            sessions,
            executor,
            store,
            permits,
        }
    }

    /// Submit a run. Returns immediately with a ticket; the run executes in
    /// the background once a pool permit is free.
    pub fn submit(&self, request: CalculationRequest) -> CalculationTicket {
        let run_id = Uuid::new_v4().to_string();
        let (event_tx, event_rx) = mpsc::channel(64);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let config = self.config.clone();
        let sessions = self.sessions.clone();
        let executor = self.executor.clone();
        let store = self.store.clone();
        let permits = self.permits.clone();
        let token = cancel.clone();
        let id = run_id.clone();

        tokio::spawn(async move {
            let outcome = Self::execute(
                config, sessions, executor, store, permits, token, &id, request, event_tx,
            )
            .await;
            let _ = outcome_tx.send(outcome);
        });

        CalculationTicket {
            run_id,
            events: ReceiverStream::new(event_rx),
            outcome: outcome_rx,
            cancel,
        }
    }

    /// Submit and wait, draining progress into the log.
    pub async fn calculate(&self, request: CalculationRequest) -> ExecutionOutcome {
        let mut ticket = self.submit(request);
        while let Some(event) = ticket.next_event().await {
            info!(
                step = event.step_index,
                status = ?event.status,
                message = event.message.as_deref().unwrap_or(""),
                "progress"
            );
        }
        ticket.outcome().await
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        config: EngineConfig,
        sessions: Arc<SessionManager>,
        executor: Arc<ActionExecutor>,
        store: Arc<dyn ConfigStore>,
        permits: Arc<Semaphore>,
        cancel: CancellationToken,
        run_id: &str,
        request: CalculationRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) -> ExecutionOutcome {
        let _permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return ExecutionOutcome::Aborted {
                    reason: "coordinator shut down".to_string(),
                }
            }
        };

        let domain = match normalize_domain(&request.url) {
            Ok(domain) => domain,
            Err(error) => return ExecutionOutcome::failed(0, &error),
        };

        // One immutable snapshot per run; concurrent edits to the stored
        // configuration never touch this run.
        let document = match store.get_active_config(&domain).await {
            Ok(document) => document,
            Err(error) => return ExecutionOutcome::failed(0, &error),
        };

        info!(run_id, domain = %domain, category = %request.category, "Run accepted");

        let run_request = RunRequest {
            document,
            category: request.category.clone(),
            dims: request.dimensions(),
            country: request.country.clone(),
            domain: domain.clone(),
            start_url: request.url.clone(),
        };

        let runner = WorkflowRunner::new(
            config.clone(),
            executor,
            sessions.clone(),
            ProgressSink::new(events),
            cancel.clone(),
        );

        let deadline = std::time::Duration::from_secs(config.run_timeout_secs);
        match tokio::time::timeout(deadline, runner.run(run_request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Deadline passed: cancel, then force teardown instead of
                // waiting for graceful completion.
                warn!(run_id, domain = %domain, "Run overran its deadline, forcing teardown");
                cancel.cancel();
                if let Err(error) = sessions.teardown_domain(&domain).await {
                    warn!("Forced teardown failed: {}", error);
                }
                ExecutionOutcome::Aborted {
                    reason: format!("run exceeded {}s deadline", config.run_timeout_secs),
                }
            }
        }
    }

    /// Sessions tracked right now (owned and parked).
    pub fn active_sessions(&self) -> usize {
        self.sessions.session_count()
    }
}
