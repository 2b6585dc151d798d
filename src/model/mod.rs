//! Typed configuration and result model
//!
//! The immutable representation of a scraping configuration (steps, categories,
//! documents), the dimension inputs driving variable substitution, and the
//! result types handed back to callers.

pub mod dimensions;
pub mod outcome;
pub mod step;

pub use dimensions::{DimensionInput, DimensionVar, Unit};
pub use outcome::{ExecutionOutcome, PriceResult, StepOutcome};
pub use step::{ConfigDocument, DomainConfig, Step, StepConfig, WaitDuration};
