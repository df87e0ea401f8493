use membros_gateway::{GatewayError, Table};
use thiserror::Error;

/// A wire row is missing a field the mapper cannot default: its identity.
///
/// Raised locally, never sent to the network.  During a batch fetch the
/// offending row is logged and skipped; inside a mutation payload it aborts
/// the mutation before anything is applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("row in {table} is missing required field `{field}`")]
pub struct MappingError {
    pub table: Table,
    pub field: &'static str,
}

/// Errors produced by the store layer.
///
/// All variants are cloneable so the outcome of a coalesced refresh can be
/// handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A row could not be mapped into its canonical entity.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A required sub-fetch of a refresh failed.  The previous snapshot is
    /// retained; the caller may retry `refresh` idempotently.
    #[error("fetch of {table} failed: {source}")]
    Fetch { table: Table, source: GatewayError },

    /// The remote write confirming an optimistic mutation failed.  The
    /// snapshot has been rolled back to its pre-mutation value.
    #[error("mutation on {table} failed: {source}")]
    Mutation { table: Table, source: GatewayError },

    /// An update or delete targeted an entity absent from the snapshot.
    #[error("no {table} entity with identity {key}")]
    NotFound { table: Table, key: String },

    /// A refresh task went away without reporting a result.
    #[error("refresh was canceled")]
    Canceled,

    /// The session slot could not be read or written.
    #[error("session storage error: {0}")]
    Session(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
