//! # membros-gateway
//!
//! The remote data boundary of the membros client.
//!
//! All persistence, authentication and real-time notification live in a
//! hosted backend; this crate defines the abstract contract the rest of the
//! client programs against ([`RemoteGateway`]) plus an in-memory
//! implementation ([`MemoryGateway`]) used by tests and offline development.
//!
//! Rows cross this boundary as raw `serde_json::Value` objects in the
//! backend's snake_case shape; translating them into canonical entities is
//! the job of `membros-store`'s mappers.

pub mod gateway;
pub mod memory;
pub mod tables;

pub use gateway::{AuthIdentity, GatewayError, Order, Query, RemoteGateway, Row};
pub use memory::MemoryGateway;
pub use tables::{ChangeEvent, ChangeKind, Table};
