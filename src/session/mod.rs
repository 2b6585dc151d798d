//! Browser session management
//!
//! Owns the lifecycle of browser automation sessions: creation with
//! anti-detection defaults, failure accounting, forced recreation, and
//! teardown. A session is exclusively owned by at most one in-flight run.

pub mod manager;
pub mod mock;
pub mod traits;

pub use manager::{BrowserSession, SessionManager, SessionState};
pub use traits::{DriverFactory, PageDriver, SelectOption};
