mod builder;
mod repository;

pub use builder::*;
pub use repository::*;
#[cfg(test)]
pub(crate) use repository::tests::{ReadOnlyPosts, seed_user};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    /// Argon2id PHC string. Accounts created through an external identity
    /// have none.
    #[serde(skip)]
    pub password: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Start a typed [`UserBuilder`].
    pub fn builder() -> UserBuilder<Missing, Missing> {
        UserBuilder::new()
    }
}

/// Selects users the way a document store query filter would.
///
/// Every field set must match. An empty filter matches every user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserFilter {
    pub id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl UserFilter {
    /// Filter matching every user.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on the user identifier.
    pub fn by_id(id: UserId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Filter on the user email.
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Filter on the display name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Whether `user` is selected by this filter.
    pub fn matches(&self, user: &User) -> bool {
        self.id.as_ref().is_none_or(|id| *id == user.id)
            && self
                .email
                .as_ref()
                .is_none_or(|email| user.email.as_ref() == Some(email))
            && self.name.as_ref().is_none_or(|name| *name == user.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let user = User::builder()
            .name("Ada")
            .email("ada@example.com")
            .build();

        assert!(UserFilter::all().matches(&user));
        assert!(UserFilter::by_id(user.id.clone()).matches(&user));
        assert!(UserFilter::by_email("ada@example.com").matches(&user));
        assert!(!UserFilter::by_email("bob@example.com").matches(&user));

        let filter = UserFilter {
            name: Some("Ada".into()),
            email: Some("other@example.com".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&user));
    }

    #[test]
    fn test_password_is_never_serialized() {
        let user = User::builder()
            .name("Ada")
            .email("ada@example.com")
            .password_hash("$argon2id$v=19$secret")
            .build();

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }
}
