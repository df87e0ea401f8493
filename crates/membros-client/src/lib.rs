//! # membros-client
//!
//! The high-level facade a UI talks to: login bootstrap, catalog and feed
//! reads off the cached snapshot, optimistic writes, and per-table change
//! watches.  Everything network-shaped goes through the injected
//! [`membros_gateway::RemoteGateway`].

pub mod catalog;
pub mod client;
pub mod config;
pub mod feed;
pub mod offers;
pub mod profile;
pub mod progress;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::{Client, ClientError, Result};
pub use config::ClientConfig;

/// Install the process-wide tracing subscriber.  Call once, at startup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("membros_client=debug,membros_store=debug,membros_gateway=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
