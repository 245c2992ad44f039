//! # relay-server
//!
//! WebSocket fan-out for chat and agent payloads, plus the HTTP intake that
//! feeds agent events to the chat dispatcher in arrival order.

pub mod client;
pub mod errors;
pub mod event_bridge;
pub mod health;
pub mod server;

pub use client::{ClientHub, ClientId, ClientQueue};
pub use errors::ServerError;
pub use event_bridge::{BridgeCommand, EventBridge};
pub use server::{start, RelayServices, ServerConfig, ServerHandle};
