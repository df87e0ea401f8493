//! Profile editing.
//!
//! A profile edit touches three places: the profile row itself, the session
//! copy of the user, and the denormalized author fields on the user's cached
//! posts.  The last is a local re-join; the server's own rows are repaired
//! by its triggers and picked up on the next posts refresh.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use membros_gateway::Table;
use membros_shared::models::User;
use membros_store::{mappers, Mutation, StoreError};

use crate::client::{Client, Result};

/// Fields a user can edit on their own profile.  `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

impl Client {
    /// Patch a profile.  Users edit their own; admins may edit anyone's.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let user = self.require_user()?;
        if user.id != user_id {
            self.require_admin()?;
        }

        let mut patch = Map::new();
        if let Some(name) = update.name {
            patch.insert("name".into(), name.into());
        }
        if let Some(avatar) = update.avatar {
            patch.insert("avatar".into(), avatar.into());
        }
        if let Some(bio) = update.bio {
            patch.insert("bio".into(), bio.into());
        }
        if patch.is_empty() {
            return if user.id == user_id {
                Ok(user)
            } else {
                self.cache
                    .snapshot()
                    .profile(user_id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::NotFound {
                            table: Table::Profiles,
                            key: user_id.to_string(),
                        }
                        .into()
                    })
            };
        }

        let stored = self
            .cache
            .apply(Mutation::update(
                Table::Profiles,
                user_id,
                Value::Object(patch),
            ))
            .await?
            .unwrap_or_default();
        let updated = mappers::user_from_row(&stored).map_err(StoreError::from)?;

        if updated.id == user.id {
            self.session.set_current_user(Some(updated.clone()))?;
        }

        // Re-join the author fields on this user's cached posts.
        let author = updated.clone();
        self.cache.update_local(move |snapshot| {
            for post in snapshot
                .posts
                .iter_mut()
                .filter(|post| post.user_id == author.id)
            {
                post.user_name = author.name.clone();
                post.user_avatar = author.avatar.clone();
            }
        });

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::logged_in_client;
    use crate::feed::PostDraft;

    #[tokio::test]
    async fn test_update_profile_patches_session_and_posts() {
        let (_gateway, client) = logged_in_client(false).await;
        client
            .create_post(PostDraft {
                content: "antes".into(),
                ..PostDraft::default()
            })
            .await
            .unwrap();

        let updated = client
            .update_profile(
                "u1",
                ProfileUpdate {
                    name: Some("Ana Clara".into()),
                    avatar: Some("https://a/nova.png".into()),
                    bio: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Ana Clara");
        assert_eq!(client.current_user().unwrap().name, "Ana Clara");

        let snapshot = client.snapshot();
        assert_eq!(snapshot.profile("u1").unwrap().name, "Ana Clara");
        let post = &snapshot.posts[0];
        assert_eq!(post.user_name, "Ana Clara");
        assert_eq!(post.user_avatar, "https://a/nova.png");
    }

    #[tokio::test]
    async fn test_empty_update_is_a_no_op() {
        let (gateway, client) = logged_in_client(false).await;
        let before = client.current_user().unwrap();

        let after = client
            .update_profile("u1", ProfileUpdate::default())
            .await
            .unwrap();

        assert_eq!(before, after);
        // Only bootstrap touched profiles: its lookup plus the full refresh.
        assert_eq!(gateway.fetch_count(membros_gateway::Table::Profiles), 2);
    }

    #[tokio::test]
    async fn test_editing_another_profile_requires_admin() {
        use crate::client::ClientError;
        use membros_gateway::Table;
        use serde_json::json;

        let rename = ProfileUpdate {
            name: Some("Renomeada".into()),
            avatar: None,
            bio: None,
        };

        let (_gateway, client) = logged_in_client(false).await;
        let err = client.update_profile("u2", rename.clone()).await.unwrap_err();
        assert_eq!(err, ClientError::Forbidden);

        let (gateway, admin) = logged_in_client(true).await;
        gateway.seed(
            Table::Profiles,
            vec![
                json!({ "id": "u1", "name": "Ana", "email": "ana@example.com", "role": "admin" }),
                json!({ "id": "u2", "name": "Bia", "email": "bia@example.com" }),
            ],
        );
        admin.refresh_all().await.unwrap();

        let edited = admin.update_profile("u2", rename).await.unwrap();
        assert_eq!(edited.name, "Renomeada");
        // The admin's own session is untouched.
        assert_eq!(admin.current_user().unwrap().name, "Ana");
    }
}
