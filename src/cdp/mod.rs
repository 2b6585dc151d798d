//! Chrome DevTools Protocol transport
//!
//! WebSocket connection with command/response correlation plus the page
//! driver implementation the engine runs against in production. Tests use
//! `session::mock` instead; nothing above this module knows which one it got.

pub mod client;
pub mod connection;
pub mod types;

pub use client::{CdpDriverFactory, CdpPage};
pub use connection::CdpConnection;
