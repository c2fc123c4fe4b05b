//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::user::User;

const DEFAULT_AUDIENCE: &str = "quire";
pub const TOKEN_TYPE: &str = "Bearer";

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// User email, when the account has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    name: String,
    audience: String,
    expires_in: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance signing with HMAC-SHA256.
    pub fn new(name: &str, secret: &[u8], expires_in: u64) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            expires_in,
        }
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Lifetime of created tokens, in seconds.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Create a new [`jsonwebtoken`] for `user`.
    pub fn create(&self, user: &User) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::Internal {
                details: "system time before Unix epoch".into(),
                source: Some(Box::new(err)),
            })?
            .as_secs();
        let header = Header::new(self.algorithm);
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expires_in,
            iat: time,
            iss: self.name.clone(),
            sub: user.id.to_string(),
            email: user.email.clone(),
        };

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_decode() {
        let manager = TokenManager::new("quire", b"secret", 60);
        let user = User::builder().name("Ada").email("ada@example.com").build();

        let token = manager.create(&user).unwrap();
        let claims = manager.decode(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert_eq!(claims.exp, claims.iat + 60);
    }

    #[test]
    fn test_reject_foreign_tokens() {
        let user = User::builder().name("Ada").build();
        let token = TokenManager::new("quire", b"other", 60).create(&user).unwrap();

        assert!(TokenManager::new("quire", b"secret", 60).decode(&token).is_err());

        let mut manager = TokenManager::new("quire", b"secret", 60);
        let token = manager.create(&user).unwrap();
        manager.audience("someone-else");
        assert!(manager.decode(&token).is_err());
    }
}
