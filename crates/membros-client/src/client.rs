//! The [`Client`]: one object wiring gateway, cache, router and session
//! together.  The domain-specific operations live in the sibling modules
//! (`catalog`, `progress`, `feed`, `offers`, `profile`) as further `impl
//! Client` blocks.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use membros_gateway::{GatewayError, Query, RemoteGateway, Table};
use membros_shared::models::{User, UserRole};
use membros_store::{
    mappers, CacheState, ChangeRouter, SessionHolder, Snapshot, SnapshotCache, StoreError,
    WatchHandle,
};

use crate::config::ClientConfig;

/// Errors surfaced to the UI layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// The operation needs a logged-in user.
    #[error("no user is logged in")]
    NotAuthenticated,

    /// The operation needs the admin role.
    #[error("administrator role required")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// The application facade.
pub struct Client {
    pub(crate) gateway: Arc<dyn RemoteGateway>,
    pub(crate) cache: SnapshotCache,
    pub(crate) router: ChangeRouter,
    pub(crate) session: SessionHolder,
}

impl Client {
    pub fn new(gateway: Arc<dyn RemoteGateway>, config: ClientConfig) -> Self {
        let cache = SnapshotCache::new(gateway.clone());
        let router = ChangeRouter::new(gateway.clone(), cache.clone(), config.debounce);
        let session = match &config.session_dir {
            Some(dir) => SessionHolder::open_at(dir),
            None => SessionHolder::in_memory(),
        };
        Self {
            gateway,
            cache,
            router,
            session,
        }
    }

    /// Adopt the backend's authenticated identity (if any), load or create
    /// its profile, and fill the cache.
    ///
    /// With no identity the cache is filled with the guest view: public
    /// catalog and feed, no per-user rows.
    pub async fn bootstrap(&self) -> Result<()> {
        match self.gateway.authenticated_identity().await? {
            Some(identity) => {
                let user = self.load_profile(&identity.id, &identity.email).await?;
                tracing::info!(user = %user.id, "session established");
                self.session.set_current_user(Some(user.clone()))?;
                self.cache.refresh(Some(&user.id)).await?;
            }
            None => {
                self.session.set_current_user(None)?;
                self.cache.refresh(None).await?;
            }
        }
        Ok(())
    }

    async fn load_profile(&self, id: &str, email: &str) -> Result<User> {
        let rows = self
            .gateway
            .fetch_table(Table::Profiles, Query::new().eq("id", id))
            .await?;

        let user = match rows.first() {
            Some(row) => mappers::user_from_row(row).map_err(StoreError::from)?,
            None => {
                // First login: create the profile row from the identity.
                let name = email.split('@').next().unwrap_or(email).to_string();
                let row = self
                    .gateway
                    .insert(
                        Table::Profiles,
                        json!({ "id": id, "name": name, "email": email, "login_count": 0 }),
                    )
                    .await?;
                mappers::user_from_row(&row).map_err(StoreError::from)?
            }
        };

        // Count the login.  Purely informational; failure is not fatal.
        match self
            .gateway
            .update(
                Table::Profiles,
                id,
                json!({ "login_count": user.login_count + 1 }),
            )
            .await
        {
            Ok(row) => Ok(mappers::user_from_row(&row).map_err(StoreError::from)?),
            Err(err) => {
                tracing::warn!(%err, "could not bump login counter");
                Ok(user)
            }
        }
    }

    /// Refetch everything for the current session scope.
    pub async fn refresh_all(&self) -> Result<()> {
        let scope = self.session.current_user().map(|user| user.id);
        self.cache.refresh(scope.as_deref()).await?;
        Ok(())
    }

    /// The current consistent snapshot; cheap, synchronous.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.snapshot()
    }

    pub fn state(&self) -> CacheState {
        self.cache.state()
    }

    /// Keep `table` fresh from the backend's change stream for as long as
    /// the returned handle lives.
    pub fn watch(&self, table: Table) -> WatchHandle {
        self.router.watch(table)
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    /// Clear the session.  The public catalog stays cached; the logged-out
    /// user's rows are dropped at once and the remaining user-scoped slices
    /// empty on the next refresh.  The gateway's own sign-out is the
    /// caller's concern.
    pub fn logout(&self) -> Result<()> {
        self.session.set_current_user(None)?;
        self.cache.update_local(|snapshot| snapshot.progress.clear());
        Ok(())
    }

    pub(crate) fn require_user(&self) -> Result<User> {
        self.session
            .current_user()
            .ok_or(ClientError::NotAuthenticated)
    }

    pub(crate) fn require_admin(&self) -> Result<User> {
        let user = self.require_user()?;
        if user.role == UserRole::Admin {
            Ok(user)
        } else {
            Err(ClientError::Forbidden)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::logged_in_client;
    use super::*;
    use membros_gateway::{AuthIdentity, MemoryGateway};

    #[tokio::test]
    async fn test_bootstrap_establishes_session_and_fills_cache() {
        let (_gateway, client) = logged_in_client(false).await;

        let user = client.current_user().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.login_count, 2);
        assert_eq!(client.state(), CacheState::Ready);
        assert_eq!(client.snapshot().profile("u1").unwrap().login_count, 2);
    }

    #[tokio::test]
    async fn test_bootstrap_without_identity_is_guest() {
        let gateway = Arc::new(MemoryGateway::new());
        let client = Client::new(
            gateway.clone() as Arc<dyn RemoteGateway>,
            ClientConfig::default(),
        );
        client.bootstrap().await.unwrap();

        assert!(client.current_user().is_none());
        assert_eq!(client.state(), CacheState::Ready);
        assert_eq!(gateway.fetch_count(Table::UserProgress), 0);
    }

    #[tokio::test]
    async fn test_first_login_creates_profile_row() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_identity(Some(AuthIdentity {
            id: "novo".into(),
            email: "novo@example.com".into(),
        }));
        let client = Client::new(
            gateway.clone() as Arc<dyn RemoteGateway>,
            ClientConfig::default(),
        );

        client.bootstrap().await.unwrap();

        let user = client.current_user().unwrap();
        assert_eq!(user.name, "novo");
        assert_eq!(user.login_count, 1);
        assert!(client.snapshot().profile("novo").is_some());
    }

    #[tokio::test]
    async fn test_logout_keeps_catalog_but_drops_user_rows() {
        let (gateway, client) = logged_in_client(false).await;
        gateway.seed(
            Table::Courses,
            vec![json!({ "id": "c1", "title": "Rust" })],
        );
        gateway.seed(
            Table::UserProgress,
            vec![json!({ "user_id": "u1", "lesson_id": "l1", "completed": true })],
        );
        client.refresh_all().await.unwrap();
        assert_eq!(client.snapshot().progress.len(), 1);

        client.logout().unwrap();

        assert!(client.current_user().is_none());
        assert_eq!(client.state(), CacheState::Ready);
        assert!(client.snapshot().progress.is_empty());
        assert_eq!(client.snapshot().courses.len(), 1);

        // The next refresh runs in guest scope and empties the rest.
        client.refresh_all().await.unwrap();
        assert!(client.snapshot().profiles.is_empty());
        assert_eq!(client.snapshot().courses.len(), 1);
    }

    #[tokio::test]
    async fn test_session_dir_resumes_across_clients() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            session_dir: Some(dir.path().to_path_buf()),
            ..ClientConfig::default()
        };

        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Table::Profiles,
            vec![json!({ "id": "u1", "name": "Ana", "email": "ana@example.com" })],
        );
        gateway.set_identity(Some(AuthIdentity {
            id: "u1".into(),
            email: "ana@example.com".into(),
        }));

        let client = Client::new(
            gateway.clone() as Arc<dyn RemoteGateway>,
            config.clone(),
        );
        client.bootstrap().await.unwrap();

        // A new client over the same directory resumes the session before
        // any network round-trip.
        let resumed = Client::new(gateway as Arc<dyn RemoteGateway>, config);
        assert_eq!(resumed.current_user().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_admin_gate() {
        let (_gateway, client) = logged_in_client(false).await;
        assert_eq!(client.require_admin().unwrap_err(), ClientError::Forbidden);

        let (_gateway, admin) = logged_in_client(true).await;
        assert!(admin.require_admin().is_ok());
    }
}
