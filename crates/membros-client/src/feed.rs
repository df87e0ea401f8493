//! Social feed operations: posting, editing, liking.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use membros_gateway::Table;
use membros_shared::models::{Post, PostStatus};
use membros_store::{mappers, Mutation, StoreError};

use crate::client::{Client, ClientError, Result};

/// What a user types into the composer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub allow_comments: bool,
    pub status: PostStatus,
}

impl Default for PostDraft {
    fn default() -> Self {
        Self {
            title: None,
            content: String::new(),
            image_url: None,
            allow_comments: true,
            status: PostStatus::Published,
        }
    }
}

impl Client {
    /// Publish a post as the logged-in user.  The author's name and avatar
    /// are denormalized onto the post at creation time.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post> {
        let user = self.require_user()?;
        let row = json!({
            "user_id": user.id,
            "user_name": user.name,
            "user_avatar": user.avatar,
            "title": draft.title,
            "content": draft.content,
            "image_url": draft.image_url,
            "likes_count": 0,
            "allow_comments": draft.allow_comments,
            "status": draft.status,
            "created_at": Utc::now().to_rfc3339(),
        });

        let stored = self
            .cache
            .apply(Mutation::insert(Table::Posts, row))
            .await?
            .unwrap_or_default();
        Ok(mappers::post_from_row(&stored).map_err(StoreError::from)?)
    }

    /// Edit a post.  Authors may edit their own posts; admins may edit any.
    pub async fn update_post(&self, id: &str, draft: PostDraft) -> Result<Post> {
        self.require_post_access(id)?;
        let patch = json!({
            "title": draft.title,
            "content": draft.content,
            "image_url": draft.image_url,
            "allow_comments": draft.allow_comments,
            "status": draft.status,
        });

        let stored = self
            .cache
            .apply(Mutation::update(Table::Posts, id, patch))
            .await?
            .unwrap_or_default();
        Ok(mappers::post_from_row(&stored).map_err(StoreError::from)?)
    }

    /// Delete a post.  Same access rule as [`Client::update_post`].
    pub async fn delete_post(&self, id: &str) -> Result<()> {
        self.require_post_access(id)?;
        self.cache.apply(Mutation::delete(Table::Posts, id)).await?;
        Ok(())
    }

    /// Count a like.  The counter on the post row is the source of truth;
    /// the server's canonical value replaces the optimistic one.
    pub async fn like_post(&self, id: &str) -> Result<Post> {
        self.bump_likes(id, 1).await
    }

    /// Take a like back.  The counter never goes below zero.
    pub async fn unlike_post(&self, id: &str) -> Result<Post> {
        self.bump_likes(id, -1).await
    }

    async fn bump_likes(&self, id: &str, delta: i64) -> Result<Post> {
        self.require_user()?;
        let snapshot = self.cache.snapshot();
        let post = snapshot.post(id).ok_or(StoreError::NotFound {
            table: Table::Posts,
            key: id.to_string(),
        })?;

        let next = (i64::from(post.likes_count) + delta).max(0);
        let stored = self
            .cache
            .apply(Mutation::update(
                Table::Posts,
                id,
                json!({ "likes_count": next }),
            ))
            .await?
            .unwrap_or_default();
        Ok(mappers::post_from_row(&stored).map_err(StoreError::from)?)
    }

    fn require_post_access(&self, id: &str) -> Result<()> {
        let user = self.require_user()?;
        if user.role == membros_shared::models::UserRole::Admin {
            return Ok(());
        }
        let snapshot = self.cache.snapshot();
        match snapshot.post(id) {
            Some(post) if post.user_id == user.id => Ok(()),
            Some(_) => Err(ClientError::Forbidden),
            // Let the mutation surface its own not-found.
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::logged_in_client;

    #[tokio::test]
    async fn test_create_post_lands_newest_first() {
        let (_gateway, client) = logged_in_client(false).await;

        let post = client
            .create_post(PostDraft {
                content: "primeiro".into(),
                ..PostDraft::default()
            })
            .await
            .unwrap();
        assert!(!post.id.is_empty());
        assert_eq!(post.user_name, "Ana");
        assert_eq!(post.user_avatar, "https://a/ana.png");

        client
            .create_post(PostDraft {
                content: "segundo".into(),
                ..PostDraft::default()
            })
            .await
            .unwrap();

        let snapshot = client.snapshot();
        let feed = snapshot.published_posts();
        assert_eq!(feed.len(), 2);
    }

    #[tokio::test]
    async fn test_like_and_unlike_floor_at_zero() {
        let (_gateway, client) = logged_in_client(false).await;
        let post = client
            .create_post(PostDraft {
                content: "olá".into(),
                ..PostDraft::default()
            })
            .await
            .unwrap();

        let liked = client.like_post(&post.id).await.unwrap();
        assert_eq!(liked.likes_count, 1);

        let unliked = client.unlike_post(&post.id).await.unwrap();
        assert_eq!(unliked.likes_count, 0);

        let floored = client.unlike_post(&post.id).await.unwrap();
        assert_eq!(floored.likes_count, 0);
    }

    #[tokio::test]
    async fn test_only_author_or_admin_edits() {
        let (gateway, client) = logged_in_client(false).await;
        gateway.seed(
            membros_gateway::Table::Posts,
            vec![json!({
                "id": "alheio",
                "user_id": "u2",
                "content": "de outra pessoa",
                "status": "published",
                "created_at": "2024-01-01T00:00:00Z",
            })],
        );
        client.refresh_all().await.unwrap();

        let err = client.delete_post("alheio").await.unwrap_err();
        assert_eq!(err, ClientError::Forbidden);

        let (gateway, admin) = logged_in_client(true).await;
        gateway.seed(
            membros_gateway::Table::Posts,
            vec![json!({
                "id": "alheio",
                "user_id": "u2",
                "content": "de outra pessoa",
                "status": "published",
                "created_at": "2024-01-01T00:00:00Z",
            })],
        );
        admin.refresh_all().await.unwrap();
        admin.delete_post("alheio").await.unwrap();
        assert!(admin.snapshot().post("alheio").is_none());
    }

    #[tokio::test]
    async fn test_guest_cannot_post() {
        use crate::config::ClientConfig;
        use membros_gateway::{MemoryGateway, RemoteGateway};
        use std::sync::Arc;

        let gateway = Arc::new(MemoryGateway::new());
        let client = crate::Client::new(
            gateway as Arc<dyn RemoteGateway>,
            ClientConfig::default(),
        );
        client.bootstrap().await.unwrap();

        let err = client.create_post(PostDraft::default()).await.unwrap_err();
        assert_eq!(err, ClientError::NotAuthenticated);
    }
}
