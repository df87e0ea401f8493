//! The [`RemoteGateway`] trait: everything the client asks of the hosted
//! backend, expressed as a request/response + subscribe/callback contract.
//!
//! The trait is object-safe so the store can hold an `Arc<dyn RemoteGateway>`
//! injected at construction time.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::tables::{ChangeEvent, Table};

/// A raw wire row: a snake_case JSON object as stored by the backend.
pub type Row = Value;

/// Errors produced at the remote boundary.
///
/// Variants carry owned strings so results can be cloned to every waiter of
/// a coalesced refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The backend rejected or failed the request.
    #[error("backend error: {0}")]
    Backend(String),

    /// No valid session / the row is not visible to the caller.
    #[error("unauthorized")]
    Unauthorized,

    /// A keyed operation targeted a row that does not exist.
    #[error("no row with id {id} in {table}")]
    NotFound { table: Table, id: String },

    /// The backend returned a payload that could not be decoded.
    #[error("malformed response: {0}")]
    Serde(String),
}

/// Sort direction for a [`Query`] order clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Filter and ordering for a table fetch.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Equality filters, ANDed together.
    pub filters: Vec<(String, Value)>,
    /// Optional `(column, direction)` ordering.
    pub order: Option<(String, Order)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter on `column`.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    /// Order results by `column`.
    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }
}

/// The authenticated identity reported by the backend's auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub id: String,
    pub email: String,
}

/// Abstract contract of the hosted backend.
///
/// Every method is a suspension point; none of them block the caller's
/// event loop.  Timeouts and retries are the implementation's concern, not
/// the store's.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch rows from `table`, filtered and ordered server-side.
    async fn fetch_table(&self, table: Table, query: Query) -> Result<Vec<Row>, GatewayError>;

    /// Insert a row.  The backend assigns the id when the row has none and
    /// returns the canonical stored row.
    async fn insert(&self, table: Table, row: Row) -> Result<Row, GatewayError>;

    /// Patch the row with primary key `id` and return the updated row.
    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row, GatewayError>;

    /// Insert-or-replace keyed on `conflict_keys` and return the stored row.
    async fn upsert(
        &self,
        table: Table,
        row: Row,
        conflict_keys: &[&str],
    ) -> Result<Row, GatewayError>;

    /// Delete the row with primary key `id`.
    async fn delete(&self, table: Table, id: &str) -> Result<(), GatewayError>;

    /// Subscribe to change notifications for `table`.
    ///
    /// Dropping the receiver is the unsubscribe; there is no separate handle
    /// to leak.
    fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent>;

    /// The currently authenticated identity, if any.
    async fn authenticated_identity(&self) -> Result<Option<AuthIdentity>, GatewayError>;
}
