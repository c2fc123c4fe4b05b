//! Typed builder for User.

use chrono::Utc;

use crate::id::UserId;
use crate::user::User;

/// [`User`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Name, Email> {
    name: Name,
    email: Email,
    password: Option<String>,
    image: Option<String>,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            name: Missing,
            email: Missing,
            password: None,
            image: None,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Email> UserBuilder<Missing, Email> {
    /// Update `name` field on [`UserBuilder`].
    pub fn name(self, name: impl Into<String>) -> UserBuilder<Present<String>, Email> {
        UserBuilder {
            name: Present(name.into().trim().to_owned()),
            email: self.email,
            password: self.password,
            image: self.image,
        }
    }
}

impl<Name> UserBuilder<Name, Missing> {
    /// Update `email` field on [`UserBuilder`].
    pub fn email(self, email: impl Into<String>) -> UserBuilder<Name, Present<String>> {
        UserBuilder {
            name: self.name,
            email: Present(email.into().trim().to_lowercase()),
            password: self.password,
            image: self.image,
        }
    }
}

impl<Name, Email> UserBuilder<Name, Email> {
    /// Update `password` field on [`UserBuilder`].
    ///
    /// Expects an already hashed credential.
    pub fn password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password = Some(hash.into());
        self
    }

    /// Update `image` field on [`UserBuilder`].
    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    fn into_user(self, name: String, email: Option<String>) -> User {
        let now = Utc::now();
        User {
            id: UserId::generate(),
            name,
            email,
            password: self.password,
            image: self.image,
            created_at: now,
            updated_at: now,
        }
    }
}

impl UserBuilder<Present<String>, Missing> {
    /// Build a [`User`] without `email`.
    pub fn build(self) -> User {
        let name = self.name.0.clone();
        self.into_user(name, None)
    }
}

impl UserBuilder<Present<String>, Present<String>> {
    /// Build a [`User`] with `name` and `email`.
    pub fn build(self) -> User {
        let name = self.name.0.clone();
        let email = self.email.0.clone();
        self.into_user(name, Some(email))
    }
}
