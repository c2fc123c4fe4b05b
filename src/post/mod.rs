//! Blog posts and their (unenforced) link to an author.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{PostId, UserId};
use crate::user::User;

/// Maximum title length, in characters.
pub const TITLE_MAX_LENGTH: u64 = 100;
/// Length of the content excerpt shown in listings, in characters.
pub const EXCERPT_LENGTH: usize = 100;

/// Post as saved on database.
///
/// `author_id` references a [`User`] by identifier only. Nothing in the store
/// enforces it: the reference may be stale (the user was deleted) or, for
/// records written by older clients, missing altogether. Such posts are
/// orphans and are removed by [`crate::reconcile::Reconciler`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub author_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new post owned by `author`. The title is trimmed.
    pub fn new(
        author: UserId,
        title: impl Into<String>,
        content: impl Into<String>,
        published: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PostId::generate(),
            title: title.into().trim().to_owned(),
            content: content.into(),
            published,
            author_id: Some(author),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this post.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.author_id.as_ref() == Some(user_id)
    }

    /// Whether `viewer` may read this post.
    ///
    /// Published posts are public, drafts are only visible to their owner.
    pub fn is_visible_to(&self, viewer: Option<&UserId>) -> bool {
        self.published || viewer.is_some_and(|id| self.is_owned_by(id))
    }

    /// Apply a partial update and bump `updated_at`.
    pub fn apply(&mut self, patch: PostPatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_owned();
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(published) = patch.published {
            self.published = published;
        }
        self.updated_at = Utc::now();
    }

    /// First characters of the content, suffixed with an ellipsis.
    pub fn excerpt(&self) -> String {
        if self.content.is_empty() {
            return String::default();
        }

        let mut excerpt: String = self.content.chars().take(EXCERPT_LENGTH).collect();
        excerpt.push_str("...");
        excerpt
    }
}

/// Fields a post owner may change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
}

/// Author fields substituted into a post on read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub image: Option<String>,
}

impl From<User> for Author {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

/// A post with its author dereferenced.
///
/// `author` is `None` when the reference is dangling.
#[derive(Clone, Debug, PartialEq)]
pub struct PopulatedPost {
    pub post: Post,
    pub author: Option<Author>,
}
