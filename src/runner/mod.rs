//! Workflow runner
//!
//! The interpreter driving one calculation run: steps in declared order,
//! per-step error policy, transient retries with backoff, session recovery,
//! `decide_config` branching, and cooperative cancellation.

pub mod context;
pub mod progress;
pub mod workflow;

pub use context::{ExecutionContext, StepRecord};
pub use progress::{ProgressEvent, ProgressSink, StepStatus};
pub use workflow::{RunRequest, WorkflowRunner};
