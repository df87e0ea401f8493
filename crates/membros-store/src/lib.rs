//! # membros-store
//!
//! The client-side data core: one consistent in-memory snapshot of all
//! catalog and per-user entities, kept coherent across batch refreshes,
//! real-time change notifications and optimistic local mutations.
//!
//! The store never talks to a concrete backend; it drives the injected
//! [`membros_gateway::RemoteGateway`] and translates wire rows through the
//! [`mappers`] into the canonical shapes from `membros-shared`.  Readers get
//! synchronous access to an `Arc<Snapshot>` that is only ever replaced
//! wholesale, never mutated in place, so a reference held across an await
//! point stays internally consistent (stale at worst, torn never).

pub mod cache;
pub mod mappers;
pub mod mutation;
pub mod router;
pub mod session;
pub mod snapshot;

mod error;

pub use cache::{CacheState, SnapshotCache};
pub use error::{MappingError, Result, StoreError};
pub use mutation::{Mutation, Op};
pub use router::{ChangeRouter, WatchHandle};
pub use session::SessionHolder;
pub use snapshot::Snapshot;
