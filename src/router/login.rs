use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::token::TOKEN_TYPE;
use crate::user::UserFilter;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
}

/// Handler to open a session.
pub async fn handler(State(state): State<AppState>, Valid(body): Valid<Body>) -> Result<Json<Response>> {
    let email = body.email.trim().to_lowercase();
    let user = state
        .db
        .users
        .find_one(&UserFilter::by_email(email))
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    // Accounts linked to an external identity have no password.
    let hash = user.password.as_deref().ok_or(ServerError::InvalidCredentials)?;
    state
        .crypto
        .verify_password(&body.password, hash)
        .map_err(|_| ServerError::InvalidCredentials)?;

    tracing::debug!(user_id = %user.id, "session opened");

    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token: state.token.create(&user)?,
        expires_in: state.token.expires_in(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::user::User;
    use crate::*;

    #[tokio::test]
    async fn test_login_handler() {
        let state = state();
        let user = create_user(&state, "Ada", "ada@example.com", "StRong_PaÂ§$W0rD").await;
        let app = app(state.clone());

        let response = make_request(
            None,
            app,
            Method::POST,
            "/login",
            json!({ "email": "ADA@example.com", "password": "StRong_PaÂ§$W0rD" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.token_type, TOKEN_TYPE);
        assert_eq!(body.expires_in, state.token.expires_in());

        let claims = state.token.decode(&body.token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(claims.exp > time);
    }

    #[tokio::test]
    async fn test_login_with_invalid_credentials() {
        let state = state();
        create_user(&state, "Ada", "ada@example.com", "StRong_PaÂ§$W0rD").await;
        let external = User::builder().name("Bob").email("bob@example.com").build();
        state.db.users.insert(&external).await.unwrap();
        let app = app(state);

        for (email, password) in [
            ("ada@example.com", "wrong password"),
            ("nobody@example.com", "StRong_PaÂ§$W0rD"),
            ("bob@example.com", "anything"),
        ] {
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/login",
                json!({ "email": email, "password": password }).to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{email}");
        }
    }
}
