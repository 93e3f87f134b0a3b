//! ChatRelay Gateway HTTP Server
//!
//! Hosts the channel webhooks and the health API, and pumps verified
//! inbound messages into the per-conversation mailbox.

pub mod health_api;
pub mod inbound;
pub mod server;

pub use inbound::spawn_inbound_pump;
pub use server::{build_router, start_server, GatewayState};
