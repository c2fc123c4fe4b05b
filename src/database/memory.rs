//! In-memory store, used for development and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PostStore, Result, StoreError, UserStore};
use crate::id::{PostId, UserId};
use crate::post::Post;
use crate::user::{User, UserFilter};

/// Both collections kept in process memory.
///
/// Each collection is guarded by its own lock, so like a real document
/// store, a sequence of calls on users and posts is not atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    posts: RwLock<HashMap<PostId, Post>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    posts
}

fn is_orphan(post: &Post, valid: &HashSet<UserId>) -> bool {
    post.author_id
        .as_ref()
        .is_none_or(|author| !valid.contains(author))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;

        if let Some(email) = &user.email {
            if users.values().any(|u| u.email.as_ref() == Some(email)) {
                return Err(StoreError::Duplicate { field: "email" });
            }
        }
        if users.contains_key(&user.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }

        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>> {
        let users = self.users.read().await;
        let mut matching: Vec<&User> = users.values().filter(|u| filter.matches(u)).collect();
        // Oldest first, so that the answer is stable across calls.
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching.first().map(|u| (*u).clone()))
    }

    async fn find_ids(&self, filter: &UserFilter) -> Result<Vec<UserId>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| filter.matches(u))
            .map(|u| u.id.clone())
            .collect())
    }

    async fn update(&self, user: &User) -> Result<bool> {
        let mut users = self.users.write().await;

        if let Some(email) = &user.email {
            if users
                .values()
                .any(|u| u.id != user.id && u.email.as_ref() == Some(email))
            {
                return Err(StoreError::Duplicate { field: "email" });
            }
        }

        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: &UserId) -> Result<u64> {
        Ok(self.users.write().await.remove(id).map_or(0, |_| 1))
    }

    async fn delete_many(&self, filter: &UserFilter) -> Result<u64> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|_, u| !filter.matches(u));
        Ok((before - users.len()) as u64)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert(&self, post: &Post) -> Result<()> {
        let mut posts = self.posts.write().await;
        if posts.contains_key(&post.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }

        posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        Ok(self.posts.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Post>> {
        Ok(newest_first(
            self.posts.read().await.values().cloned().collect(),
        ))
    }

    async fn find_by_author(&self, author: &UserId) -> Result<Vec<Post>> {
        Ok(newest_first(
            self.posts
                .read()
                .await
                .values()
                .filter(|p| p.is_owned_by(author))
                .cloned()
                .collect(),
        ))
    }

    async fn update(&self, post: &Post) -> Result<bool> {
        match self.posts.write().await.get_mut(&post.id) {
            Some(stored) => {
                *stored = post.clone();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: &PostId) -> Result<u64> {
        Ok(self.posts.write().await.remove(id).map_or(0, |_| 1))
    }

    async fn delete_by_author(&self, author: &UserId) -> Result<u64> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|_, p| !p.is_owned_by(author));
        Ok((before - posts.len()) as u64)
    }

    async fn count_orphans(&self, valid: &HashSet<UserId>) -> Result<u64> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .filter(|p| is_orphan(p, valid))
            .count() as u64)
    }

    async fn delete_orphans(&self, valid: &HashSet<UserId>) -> Result<u64> {
        let mut posts = self.posts.write().await;
        let before = posts.len();
        posts.retain(|_, p| !is_orphan(p, valid));
        Ok((before - posts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User::builder().name("user").email(email).build()
    }

    #[tokio::test]
    async fn test_unique_email() {
        let store = MemoryStore::new();
        UserStore::insert(&store, &user("a@example.com")).await.unwrap();

        let err = UserStore::insert(&store, &user("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));

        // Users without email never collide.
        let anonymous = User::builder().name("a").build();
        let other = User::builder().name("b").build();
        UserStore::insert(&store, &anonymous).await.unwrap();
        UserStore::insert(&store, &other).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_orphans_includes_ownerless_posts() {
        let store = MemoryStore::new();
        let alice = user("alice@example.com");
        UserStore::insert(&store, &alice).await.unwrap();

        let kept = Post::new(alice.id.clone(), "kept", "body", true);
        let stale = Post::new(UserId::generate(), "stale", "body", true);
        let mut ownerless = Post::new(alice.id.clone(), "ownerless", "body", true);
        ownerless.author_id = None;
        for post in [&kept, &stale, &ownerless] {
            PostStore::insert(&store, post).await.unwrap();
        }

        let valid = HashSet::from([alice.id.clone()]);
        assert_eq!(store.count_orphans(&valid).await.unwrap(), 2);
        assert_eq!(store.delete_orphans(&valid).await.unwrap(), 2);
        assert_eq!(store.find_all().await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn test_find_all_newest_first() {
        let store = MemoryStore::new();
        let author = UserId::generate();
        let mut old = Post::new(author.clone(), "old", "body", true);
        old.created_at -= chrono::Duration::days(1);
        let new = Post::new(author.clone(), "new", "body", true);

        PostStore::insert(&store, &old).await.unwrap();
        PostStore::insert(&store, &new).await.unwrap();

        let titles: Vec<String> = store
            .find_by_author(&author)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["new", "old"]);
    }
}
