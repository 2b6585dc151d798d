//! Anti-detection support
//!
//! Session camouflage (randomized user agents, fingerprint masking, storage
//! clearing) and the pluggable humanization policy that paces page
//! interactions. Both are independent of step semantics so tests can disable
//! them without touching the interpreter.

pub mod pacing;
pub mod profile;

pub use pacing::{HumanPacing, InteractionKind, NoPacing, PacingPolicy};
pub use profile::{bootstrap_scripts, random_user_agent};
