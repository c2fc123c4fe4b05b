//! Request authentication and authorization.

use std::collections::HashSet;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header;
use axum::http::request::Parts;

use crate::AppState;
use crate::config::Admin;
use crate::error::ServerError;
use crate::id::UserId;

const BEARER: &str = "Bearer ";

/// Caller identified by a session token.
///
/// Only the token is checked: the user it names may have been deleted since
/// it was issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl Identity {
    fn from_parts(parts: &Parts, state: &AppState) -> Result<Self, ServerError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;
        let token = token.strip_prefix(BEARER).unwrap_or(token).trim();

        let claims = state
            .token
            .decode(token)
            .map_err(|_| ServerError::Unauthorized)?;
        let user_id = UserId::parse(&claims.sub).map_err(|err| {
            tracing::warn!(error = %err, "invalid user id in session token");
            ServerError::Unauthorized
        })?;

        Ok(Self {
            user_id,
            email: claims.email,
        })
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts, state)
    }
}

/// Anonymous callers and callers with an unusable token both get `None`.
impl OptionalFromRequestParts<AppState> for Identity {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(None);
        }

        match Self::from_parts(parts, state) {
            Ok(identity) => Ok(Some(identity)),
            Err(_) => {
                tracing::debug!("ignoring invalid session token");
                Ok(None)
            },
        }
    }
}

/// Decides who may run maintenance actions.
#[async_trait]
pub trait AdminPolicy: Send + Sync {
    async fn is_admin(&self, identity: &Identity) -> bool;
}

/// Administrators listed by email in configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticAdmins {
    emails: HashSet<String>,
}

impl StaticAdmins {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|email| email.as_ref().trim().to_lowercase())
                .collect(),
        }
    }
}

impl From<&Admin> for StaticAdmins {
    fn from(config: &Admin) -> Self {
        Self::new(&config.emails)
    }
}

#[async_trait]
impl AdminPolicy for StaticAdmins {
    async fn is_admin(&self, identity: &Identity) -> bool {
        identity
            .email
            .as_ref()
            .is_some_and(|email| self.emails.contains(&email.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>) -> Identity {
        Identity {
            user_id: UserId::generate(),
            email: email.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn test_static_admins() {
        let admins = StaticAdmins::new([" Admin@Example.com"]);

        assert!(admins.is_admin(&identity(Some("admin@example.com"))).await);
        assert!(admins.is_admin(&identity(Some("ADMIN@example.com"))).await);
        assert!(!admins.is_admin(&identity(Some("user@example.com"))).await);
        assert!(!admins.is_admin(&identity(None)).await);
    }

    #[tokio::test]
    async fn test_no_admin_by_default() {
        let admins = StaticAdmins::from(&Admin::default());
        assert!(!admins.is_admin(&identity(Some("admin@example.com"))).await);
    }
}
