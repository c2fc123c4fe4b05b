//! Document store access for users and posts.
//!
//! The store has no notion of foreign keys: posts reference users by
//! identifier only and nothing stops that reference from going stale.
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::id::{PostId, UserId};
use crate::post::Post;
use crate::user::{User, UserFilter};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "quire";
pub const DEFAULT_POOL_SIZE: u32 = 10;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("{field} is already used")]
    Duplicate { field: &'static str },
    #[error("stored document is corrupted: {0}")]
    Corrupted(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence port for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with [`StoreError::Duplicate`] when the email
    /// is already taken.
    async fn insert(&self, user: &User) -> Result<()>;

    /// Find a user by identifier.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>>;

    /// Find the first user matching `filter`.
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>>;

    /// Identifiers of every user matching `filter`.
    async fn find_ids(&self, filter: &UserFilter) -> Result<Vec<UserId>>;

    /// Replace a stored user. Returns `false` when it does not exist.
    async fn update(&self, user: &User) -> Result<bool>;

    /// Delete the user with identifier `id`. Returns the deleted count.
    async fn delete_by_id(&self, id: &UserId) -> Result<u64>;

    /// Delete every user matching `filter`. Returns the deleted count.
    async fn delete_many(&self, filter: &UserFilter) -> Result<u64>;
}

/// Persistence port for posts.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a new post.
    async fn insert(&self, post: &Post) -> Result<()>;

    /// Find a post by identifier.
    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>>;

    /// Every post, newest first.
    async fn find_all(&self) -> Result<Vec<Post>>;

    /// Posts owned by `author`, newest first.
    async fn find_by_author(&self, author: &UserId) -> Result<Vec<Post>>;

    /// Replace a stored post. Returns `false` when it does not exist.
    async fn update(&self, post: &Post) -> Result<bool>;

    /// Delete one post. Returns the deleted count.
    async fn delete_by_id(&self, id: &PostId) -> Result<u64>;

    /// Delete every post owned by `author`. Returns the deleted count.
    async fn delete_by_author(&self, author: &UserId) -> Result<u64>;

    /// Count posts whose author is missing or not in `valid`.
    async fn count_orphans(&self, valid: &HashSet<UserId>) -> Result<u64>;

    /// Delete posts whose author is missing or not in `valid` in a single
    /// store operation. Returns the deleted count.
    async fn delete_orphans(&self, valid: &HashSet<UserId>) -> Result<u64>;
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
}

impl Database {
    /// Init PostgreSQL connections and run migrations.
    pub async fn postgres(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        // execute migrations scripts on start.
        sqlx::migrate!().run(&postgres).await?;

        let store = Arc::new(PostgresStore::new(postgres));
        Ok(Self {
            users: store.clone(),
            posts: store,
        })
    }

    /// Volatile store kept in process memory.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::default()))
    }

    /// Use one backend for both collections.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore + PostStore + 'static,
    {
        Self {
            users: store.clone(),
            posts: store,
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
