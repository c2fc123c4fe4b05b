//! PostgreSQL implementation for user and post stores.
//!
//! `posts.author_id` carries no foreign key constraint, like a reference
//! between two collections of a document store. It is compared in lowercase,
//! the form identifiers take once parsed.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{PostStore, Result, StoreError, UserStore};
use crate::id::{Id, PostId, UserId};
use crate::post::Post;
use crate::user::{User, UserFilter};

const USER_COLUMNS: &str = "id, name, email, password, image, created_at, updated_at";
const POST_COLUMNS: &str = "id, title, content, published, author_id, created_at, updated_at";

/// User record as stored in the database.
#[derive(Debug, Clone, FromRow)]
struct UserRecord {
    id: String,
    name: String,
    email: Option<String>,
    password: Option<String>,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Post record as stored in the database.
#[derive(Debug, Clone, FromRow)]
struct PostRecord {
    id: String,
    title: String,
    content: String,
    published: bool,
    author_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_id(id: String) -> Result<Id> {
    Id::parse(&id).map_err(|err| StoreError::Corrupted(format!("{id}: {err}")))
}

impl TryFrom<UserRecord> for User {
    type Error = StoreError;

    fn try_from(record: UserRecord) -> Result<Self> {
        Ok(Self {
            id: parse_id(record.id)?,
            name: record.name,
            email: record.email,
            password: record.password,
            image: record.image,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = StoreError;

    fn try_from(record: PostRecord) -> Result<Self> {
        // An unparsable author is as good as a missing one: nothing can
        // reference it, so the post is an orphan.
        let author_id = record.author_id.and_then(|id| Id::parse(id).ok());

        Ok(Self {
            id: parse_id(record.id)?,
            title: record.title,
            content: record.content,
            published: record.published,
            author_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Translate unique violations into [`StoreError::Duplicate`].
fn map_write_error(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            let field = match db.constraint() {
                Some(constraint) if constraint.contains("email") => "email",
                _ => "id",
            };
            StoreError::Duplicate { field }
        },
        _ => StoreError::Sql(err),
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = &filter.id {
        builder.push(" AND id = ").push_bind(id.to_string());
    }
    if let Some(email) = &filter.email {
        builder.push(" AND email = ").push_bind(email.clone());
    }
    if let Some(name) = &filter.name {
        builder.push(" AND name = ").push_bind(name.clone());
    }
}

fn valid_ids(valid: &HashSet<UserId>) -> Vec<String> {
    valid.iter().map(ToString::to_string).collect()
}

/// PostgreSQL store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new [`PostgresStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, name, email, password, image, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.image)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(User::try_from).transpose()
    }

    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>> {
        let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY created_at, id LIMIT 1");

        let record = builder
            .build_query_as::<UserRecord>()
            .fetch_optional(&self.pool)
            .await?;

        record.map(User::try_from).transpose()
    }

    async fn find_ids(&self, filter: &UserFilter) -> Result<Vec<UserId>> {
        let mut builder = QueryBuilder::new("SELECT id FROM users");
        push_filter(&mut builder, filter);

        let ids = builder
            .build_query_as::<(String,)>()
            .fetch_all(&self.pool)
            .await?;

        ids.into_iter().map(|(id,)| parse_id(id)).collect()
    }

    async fn update(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE users
                SET name = $2, email = $3, password = $4, image = $5, updated_at = $6
                WHERE id = $1"#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.image)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_id(&self, id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_many(&self, filter: &UserFilter) -> Result<u64> {
        let mut builder = QueryBuilder::new("DELETE FROM users");
        push_filter(&mut builder, filter);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PostStore for PostgresStore {
    async fn insert(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO posts (id, title, content, published, author_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(post.id.as_str())
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.published)
        .bind(post.author_id.as_ref().map(Id::as_str))
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        let record = sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Post::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Post>> {
        sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Post::try_from)
        .collect()
    }

    async fn find_by_author(&self, author: &UserId) -> Result<Vec<Post>> {
        sqlx::query_as::<_, PostRecord>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE lower(author_id) = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(author.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Post::try_from)
        .collect()
    }

    async fn update(&self, post: &Post) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE posts
                SET title = $2, content = $3, published = $4, updated_at = $5
                WHERE id = $1"#,
        )
        .bind(post.id.as_str())
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.published)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_id(&self, id: &PostId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_author(&self, author: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posts WHERE lower(author_id) = $1")
            .bind(author.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_orphans(&self, valid: &HashSet<UserId>) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts WHERE author_id IS NULL OR NOT (lower(author_id) = ANY($1))",
        )
        .bind(valid_ids(valid))
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn delete_orphans(&self, valid: &HashSet<UserId>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM posts WHERE author_id IS NULL OR NOT (lower(author_id) = ANY($1))",
        )
        .bind(valid_ids(valid))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sqlx::{Pool, Postgres};

    use super::*;
    use crate::config::CascadePolicy;
    use crate::database::Database;
    use crate::reconcile::{ReconcileMode, ReconcileReport, Reconciler};
    use crate::user::UserRepository;

    /// Posts of `fixtures/blog.sql` whose author exists.
    const KEPT: [&str; 4] = [
        "000000000000000000000001",
        "000000000000000000000002",
        "000000000000000000000003",
        "000000000000000000000006",
    ];

    fn database(pool: Pool<Postgres>) -> Database {
        Database::from_store(Arc::new(PostgresStore::new(pool)))
    }

    async fn post_ids(db: &Database) -> Vec<String> {
        let mut ids: Vec<String> = db
            .posts
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.id.to_string())
            .collect();
        ids.sort();
        ids
    }

    async fn valid_users(db: &Database) -> HashSet<UserId> {
        db.users
            .find_ids(&UserFilter::default())
            .await
            .unwrap()
            .into_iter()
            .collect()
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_delete_orphans(pool: Pool<Postgres>) {
        let db = database(pool);
        let valid = valid_users(&db).await;

        assert_eq!(db.posts.count_orphans(&valid).await.unwrap(), 3);
        assert_eq!(db.posts.delete_orphans(&valid).await.unwrap(), 3);
        assert_eq!(post_ids(&db).await, KEPT);
        assert_eq!(db.posts.delete_orphans(&valid).await.unwrap(), 0);
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_delete_orphans_without_users(pool: Pool<Postgres>) {
        let db = database(pool);

        assert_eq!(db.posts.count_orphans(&HashSet::new()).await.unwrap(), 7);
        assert_eq!(db.posts.delete_orphans(&HashSet::new()).await.unwrap(), 7);
        assert!(post_ids(&db).await.is_empty());
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_ownerless_posts_are_read(pool: Pool<Postgres>) {
        let db = database(pool);
        let posts = db.posts.find_all().await.unwrap();

        let ownerless: Vec<String> = posts
            .iter()
            .filter(|post| post.author_id.is_none())
            .map(|post| post.id.to_string())
            .collect();
        assert_eq!(ownerless.len(), 2);
        assert!(ownerless.contains(&"000000000000000000000005".to_owned()));
        assert!(ownerless.contains(&"000000000000000000000007".to_owned()));
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_user_filters(pool: Pool<Postgres>) {
        let db = database(pool);

        assert_eq!(db.users.find_ids(&UserFilter::by_name("Bob")).await.unwrap().len(), 2);
        let bob = db
            .users
            .find_one(&UserFilter::by_email("bob.second@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.id.as_str(), "cccccccccccccccccccccccc");
        assert!(db.users.find_one(&UserFilter::by_name("Eve")).await.unwrap().is_none());
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_delete_many_cascades(pool: Pool<Postgres>) {
        let db = database(pool);
        let repository = UserRepository::new(db.clone(), CascadePolicy::Abort);

        assert_eq!(repository.delete_many(&UserFilter::by_name("Bob")).await.unwrap(), 2);
        assert_eq!(db.users.find_ids(&UserFilter::default()).await.unwrap().len(), 1);
        for bob in ["bbbbbbbbbbbbbbbbbbbbbbbb", "cccccccccccccccccccccccc"] {
            let id = UserId::parse(bob).unwrap();
            assert!(db.posts.find_by_author(&id).await.unwrap().is_empty());
        }
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_remove_matches_uppercase_reference(pool: Pool<Postgres>) {
        let db = database(pool);
        let ada = db
            .users
            .find_one(&UserFilter::by_email("ada@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(db.posts.find_by_author(&ada.id).await.unwrap().len(), 2);
        UserRepository::new(db.clone(), CascadePolicy::Abort)
            .remove(&ada)
            .await
            .unwrap();
        assert!(db.posts.find_by_author(&ada.id).await.unwrap().is_empty());
        assert_eq!(post_ids(&db).await.len(), 5);
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_scan_reconcile(pool: Pool<Postgres>) {
        let db = database(pool);
        let report = Reconciler::new(db.clone()).run(ReconcileMode::Scan).await.unwrap();

        assert_eq!(report, ReconcileReport::Scan { deleted: 3, total: 7 });
        assert_eq!(post_ids(&db).await, KEPT);
    }

    #[sqlx::test(fixtures("../../fixtures/blog.sql"))]
    async fn test_bulk_reconcile(pool: Pool<Postgres>) {
        let db = database(pool);
        let report = Reconciler::new(db.clone()).run(ReconcileMode::Bulk).await.unwrap();

        assert_eq!(report, ReconcileReport::Bulk { deleted: 3 });
        assert_eq!(post_ids(&db).await, KEPT);
    }
}
