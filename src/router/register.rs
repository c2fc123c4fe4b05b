use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::User;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(custom(function = "crate::router::not_blank", message = "Name is required."))]
    pub name: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub user: User,
    pub message: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Response>)> {
    let hash = state.crypto.hash_password(&body.password)?;
    let user = User::builder()
        .name(body.name)
        .email(body.email)
        .password_hash(hash)
        .build();

    // Unique email is enforced by the store.
    state.db.users.insert(&user).await?;
    tracing::info!(user_id = %user.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(Response {
            user,
            message: "User created successfully".to_owned(),
        }),
    ))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::*;

    #[tokio::test]
    async fn test_register_handler() {
        let state = state();
        let app = app(state.clone());

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/register",
            json!({
                "name": "Ada",
                "email": "Ada@Example.com",
                "password": "StRong_PaÂ§$W0rD",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert!(body["user"].get("password").is_none());

        // Same email again.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/register",
            json!({
                "name": "Ada bis",
                "email": "ada@example.com",
                "password": "password",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let app = app(state());

        for body in [
            json!({ "email": "ada@example.com", "password": "password" }),
            json!({ "name": " ", "email": "ada@example.com", "password": "password" }),
            json!({ "name": "Ada", "email": "not-an-email", "password": "password" }),
            json!({ "name": "Ada", "email": "ada@example.com", "password": "" }),
        ] {
            let response =
                make_request(None, app.clone(), Method::POST, "/register", body.to_string()).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }
}
