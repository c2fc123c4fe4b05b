//! User deletion with cascading post removal.
//!
//! The store does not enforce the link between a post and its author, so
//! every deletion pathway removes the posts of the departing user itself,
//! before the user record goes away.

use crate::config::CascadePolicy;
use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::id::UserId;
use crate::user::{User, UserFilter};

#[derive(Clone)]
pub struct UserRepository {
    db: Database,
    policy: CascadePolicy,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(db: Database, policy: CascadePolicy) -> Self {
        Self { db, policy }
    }

    /// Remove one known user instance.
    pub async fn remove(&self, user: &User) -> Result<u64> {
        tracing::debug!(user_id = %user.id, "removing user");

        self.cascade(&user.id).await?;
        Ok(self.db.users.delete_by_id(&user.id).await?)
    }

    /// Delete the first user matching `filter`.
    ///
    /// Returns the number of deleted users (0 or 1).
    pub async fn delete_one(&self, filter: &UserFilter) -> Result<u64> {
        Ok(self.find_one_and_delete(filter).await?.map_or(0, |_| 1))
    }

    /// Delete the first user matching `filter` and return it.
    pub async fn find_one_and_delete(&self, filter: &UserFilter) -> Result<Option<User>> {
        let Some(user) = self.db.users.find_one(filter).await? else {
            tracing::warn!(?filter, "no user found with the provided filter");
            return Ok(None);
        };

        self.cascade(&user.id).await?;
        match self.db.users.delete_by_id(&user.id).await? {
            0 => Ok(None),
            _ => Ok(Some(user)),
        }
    }

    /// Delete every user matching `filter`.
    pub async fn delete_many(&self, filter: &UserFilter) -> Result<u64> {
        let ids = self.db.users.find_ids(filter).await?;
        tracing::info!(users = ids.len(), "deleting users");

        match self.policy {
            CascadePolicy::BestEffort => {
                for id in &ids {
                    self.cascade(id).await?;
                }
                Ok(self.db.users.delete_many(filter).await?)
            },
            // Only users whose posts are gone may go.
            CascadePolicy::Abort => {
                let mut deleted = 0;
                let mut failure = None;
                for id in &ids {
                    match self.cascade(id).await {
                        Ok(_) => deleted += self.db.users.delete_by_id(id).await?,
                        Err(err) => {
                            failure.get_or_insert(err);
                        },
                    }
                }

                match failure {
                    Some(err) => Err(err),
                    None => Ok(deleted),
                }
            },
        }
    }

    /// Delete posts owned by `user_id`, following the [`CascadePolicy`].
    async fn cascade(&self, user_id: &UserId) -> Result<u64> {
        match self.db.posts.delete_by_author(user_id).await {
            Ok(deleted) => {
                tracing::info!(%user_id, deleted, "deleted posts of user");
                metrics::counter!("cascade_posts_deleted_total").increment(deleted);
                Ok(deleted)
            },
            Err(source) => match self.policy {
                CascadePolicy::BestEffort => {
                    tracing::error!(%user_id, error = %source, "posts of user could not be deleted, leaving orphans");
                    Ok(0)
                },
                CascadePolicy::Abort => {
                    tracing::error!(%user_id, error = %source, "posts of user could not be deleted, user kept");
                    Err(ServerError::Cascade {
                        user_id: user_id.clone(),
                        source,
                    })
                },
            },
        }
    }
}
