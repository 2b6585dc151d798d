//! The per-run state machine
//!
//! `Pending → Running → {Succeeded, Failed, Aborted}`. Steps execute strictly
//! sequentially; the only branching construct is `decide_config`, which swaps
//! the active step sequence for the fallback category's and restarts at its
//! first step. Cancellation is cooperative and honored at every suspension
//! point.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::executor::ActionExecutor;
use crate::model::{
    ConfigDocument, DimensionInput, ExecutionOutcome, Step, StepOutcome,
};
use crate::runner::context::ExecutionContext;
use crate::runner::progress::{ProgressSink, StepStatus};
use crate::session::SessionManager;
use crate::{Error, Result};

/// Everything one run needs, snapshotted before it starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub document: ConfigDocument,
    pub category: String,
    pub dims: DimensionInput,
    pub country: String,
    pub domain: String,
    pub start_url: String,
}

/// How one attempt at a step resolved inside the recovery loop.
enum StepResolution {
    Done(StepOutcome),
    Aborted,
}

/// Upper bound on configuration switches per run. Categories that probe each
/// other back and forth would otherwise loop until the outer deadline.
const MAX_CONFIG_SWITCHES: u32 = 4;

/// Drives one calculation run to a terminal outcome.
pub struct WorkflowRunner {
    config: EngineConfig,
    executor: Arc<ActionExecutor>,
    sessions: Arc<SessionManager>,
    progress: ProgressSink,
    cancel: CancellationToken,
}

impl WorkflowRunner {
    pub fn new(
        config: EngineConfig,
        executor: Arc<ActionExecutor>,
        sessions: Arc<SessionManager>,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            executor,
            sessions,
            progress,
            cancel,
        }
    }

    /// Run to completion. The session is released on every exit path.
    pub async fn run(&self, request: RunRequest) -> ExecutionOutcome {
        if let Err(error) = request.dims.validate() {
            return ExecutionOutcome::failed(0, &error);
        }

        let initial_steps = match request.document.category(&request.category) {
            Ok(config) => config.steps.clone(),
            Err(error) => return ExecutionOutcome::failed(0, &error),
        };

        let session = match self.sessions.acquire(&request.domain).await {
            Ok(session) => session,
            Err(error) => return ExecutionOutcome::failed(0, &error),
        };

        info!(
            domain = %request.domain,
            category = %request.category,
            session = session.id(),
            "Run started"
        );

        let mut ctx = ExecutionContext::new(
            request.dims,
            request.country.clone(),
            session,
        );

        let outcome = self.drive(&request, initial_steps, &mut ctx).await;

        if let Err(error) = self.sessions.release(&ctx.session).await {
            warn!("Session release failed: {}", error);
        }

        info!(domain = %request.domain, success = outcome.is_success(), "Run finished");
        outcome
    }

    async fn drive(
        &self,
        request: &RunRequest,
        initial_steps: Vec<Step>,
        ctx: &mut ExecutionContext,
    ) -> ExecutionOutcome {
        // The landing navigation behaves like an implicit first step: same
        // retry policy, same challenge detection.
        let landing = Step::Navigate {
            url: request.start_url.clone(),
            wait_for_load: true,
            timeout: None,
            continue_on_error: false,
        };
        match self.attempt(&landing, 0, request, ctx).await {
            StepResolution::Done(StepOutcome::Ok) => {}
            StepResolution::Done(StepOutcome::Recoverable(error))
            | StepResolution::Done(StepOutcome::Fatal(error)) => {
                return ExecutionOutcome::failed(0, &error);
            }
            StepResolution::Aborted => return self.aborted(),
        }

        let mut steps = initial_steps;
        let mut index = 0usize;
        let mut switches = 0u32;

        while index < steps.len() {
            if self.cancel.is_cancelled() {
                return self.aborted();
            }

            let step = steps[index].clone();
            let kind = step.kind_name();
            self.progress
                .emit(index, StepStatus::Started, Some(kind.to_string()))
                .await;

            let resolution = self.attempt(&step, index, request, ctx).await;
            let outcome = match resolution {
                StepResolution::Done(outcome) => outcome,
                StepResolution::Aborted => return self.aborted(),
            };

            match outcome {
                StepOutcome::Ok => {
                    // The one branching construct: swap the remaining
                    // sequence for the fallback category's steps.
                    if let Some(target) = ctx.switch_request.take() {
                        switches += 1;
                        if switches > MAX_CONFIG_SWITCHES {
                            let error = Error::config_invalid(format!(
                                "configuration switched more than {} times",
                                MAX_CONFIG_SWITCHES
                            ));
                            self.progress
                                .emit(index, StepStatus::Failed, Some(error.to_string()))
                                .await;
                            return ExecutionOutcome::failed(index, &error);
                        }
                        match request.document.category(&target) {
                            Ok(config) => {
                                self.progress
                                    .emit(
                                        index,
                                        StepStatus::ConfigSwitched,
                                        Some(target.clone()),
                                    )
                                    .await;
                                ctx.record(index, kind, StepStatus::ConfigSwitched, Some(target));
                                steps = config.steps.clone();
                                index = 0;
                                continue;
                            }
                            Err(error) => {
                                self.progress
                                    .emit(index, StepStatus::Failed, Some(error.to_string()))
                                    .await;
                                return ExecutionOutcome::failed(index, &error);
                            }
                        }
                    }

                    self.progress.emit(index, StepStatus::Succeeded, None).await;
                    ctx.record(index, kind, StepStatus::Succeeded, None);
                    index += 1;
                }
                StepOutcome::Recoverable(error) => {
                    if step.skip_on_failure() {
                        debug!(index, %error, "Step failed, side effect skipped");
                        self.progress
                            .emit(index, StepStatus::Skipped, Some(error.to_string()))
                            .await;
                        ctx.record(index, kind, StepStatus::Skipped, Some(error.to_string()));
                        index += 1;
                    } else if step.continue_on_error() {
                        debug!(index, %error, "Step failed, tolerated");
                        self.progress
                            .emit(index, StepStatus::Tolerated, Some(error.to_string()))
                            .await;
                        ctx.record(index, kind, StepStatus::Tolerated, Some(error.to_string()));
                        index += 1;
                    } else {
                        self.progress
                            .emit(index, StepStatus::Failed, Some(error.to_string()))
                            .await;
                        ctx.record(index, kind, StepStatus::Failed, Some(error.to_string()));
                        return ExecutionOutcome::failed(index, &error);
                    }
                }
                StepOutcome::Fatal(error) => {
                    self.progress
                        .emit(index, StepStatus::Failed, Some(error.to_string()))
                        .await;
                    ctx.record(index, kind, StepStatus::Failed, Some(error.to_string()));
                    return ExecutionOutcome::failed(index, &error);
                }
            }
        }

        // Partial progress is never presented as a price.
        match ctx.price.take() {
            Some(price) => ExecutionOutcome::Succeeded(price),
            None => {
                let error = Error::config_invalid("no read_price step produced a value");
                ExecutionOutcome::failed(steps.len().saturating_sub(1), &error)
            }
        }
    }

    /// Execute one step with transient retries and session recovery. The
    /// cancellation token is raced against every attempt, so waits,
    /// navigations and solver calls all honor it.
    async fn attempt(
        &self,
        step: &Step,
        index: usize,
        request: &RunRequest,
        ctx: &mut ExecutionContext,
    ) -> StepResolution {
        let mut transient_attempts = 0u32;
        let mut session_retries = 0u32;

        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return StepResolution::Aborted,
                outcome = self.executor.execute(step, ctx) => outcome,
            };

            match outcome {
                StepOutcome::Ok => {
                    self.sessions.report_success(&ctx.session);
                    return StepResolution::Done(StepOutcome::Ok);
                }
                StepOutcome::Recoverable(error) if error.is_session_fatal() => {
                    warn!(index, %error, "Session-level failure");

                    if session_retries >= self.config.max_step_retries {
                        return StepResolution::Done(StepOutcome::Fatal(
                            Error::session_crashed(format!(
                                "step {} still failing after {} session retries: {}",
                                index, session_retries, error
                            )),
                        ));
                    }
                    session_retries += 1;

                    match self.recover_session(request, ctx).await {
                        Ok(()) => {
                            self.progress
                                .emit(index, StepStatus::Retrying, Some(error.to_string()))
                                .await;
                            continue;
                        }
                        Err(recovery_error) => {
                            return StepResolution::Done(StepOutcome::Fatal(recovery_error));
                        }
                    }
                }
                StepOutcome::Recoverable(error)
                    if error.is_transient() && transient_attempts < self.config.transient_retries =>
                {
                    let delay = self.config.backoff_delay(transient_attempts);
                    transient_attempts += 1;
                    debug!(index, %error, ?delay, "Transient failure, backing off");
                    self.progress
                        .emit(index, StepStatus::Retrying, Some(error.to_string()))
                        .await;

                    tokio::select! {
                        _ = self.cancel.cancelled() => return StepResolution::Aborted,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                other => return StepResolution::Done(other),
            }
        }
    }

    /// Report the failure; when the session died, acquire a fresh one and
    /// redo the landing navigation so the retried step sees the page again.
    async fn recover_session(
        &self,
        request: &RunRequest,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let state = self.sessions.report_failure(&ctx.session).await?;

        if state == crate::session::SessionState::Dead {
            info!(domain = %request.domain, "Recreating session after failure threshold");
            ctx.session = self.sessions.acquire(&request.domain).await?;
            ctx.last_focused = None;
            ctx.driver()
                .navigate(
                    &request.start_url,
                    true,
                    self.config.default_timeout(),
                )
                .await?;
        }
        Ok(())
    }

    fn aborted(&self) -> ExecutionOutcome {
        ExecutionOutcome::Aborted {
            reason: "cancelled".to_string(),
        }
    }
}
