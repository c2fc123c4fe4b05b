//! Orphaned posts maintenance endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ServerError;
use crate::middleware::Identity;
use crate::reconcile::ReconcileMode;

/// Failures of the maintenance endpoints.
///
/// Their bodies are `{message}` or `{message, error}` rather than problem
/// details, as cleanup scripts read them.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("Unauthorized - Must be logged in")]
    Unauthenticated,
    #[error("Forbidden - Admin access required")]
    Forbidden,
    #[error("{message}")]
    Failed {
        message: &'static str,
        #[source]
        source: ServerError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntoResponse for MaintenanceError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            MaintenanceError::Unauthenticated => (StatusCode::UNAUTHORIZED, None),
            MaintenanceError::Forbidden => (StatusCode::FORBIDDEN, None),
            MaintenanceError::Failed { source, .. } => {
                tracing::error!(error = %source, "orphaned posts cleanup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(source.to_string()))
            },
        };

        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
                error,
            }),
        )
            .into_response()
    }
}

/// Check that the caller is an administrator.
async fn authorize(
    state: &AppState,
    identity: Option<Identity>,
) -> Result<Identity, MaintenanceError> {
    let identity = identity.ok_or(MaintenanceError::Unauthenticated)?;

    if !state.admins.is_admin(&identity).await {
        tracing::warn!(user_id = %identity.user_id, "maintenance refused to non-admin");
        return Err(MaintenanceError::Forbidden);
    }
    Ok(identity)
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupBody {
    pub mode: Option<ReconcileMode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub message: String,
    pub deleted_posts: u64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_posts: Option<u64>,
}

/// `POST /admin/cleanup`.
///
/// The body is optional; a missing or unreadable one selects the configured
/// default mode.
pub async fn cleanup(
    State(state): State<AppState>,
    identity: Option<Identity>,
    body: Bytes,
) -> Result<Json<CleanupResponse>, MaintenanceError> {
    let identity = authorize(&state, identity).await?;

    let mode = serde_json::from_slice::<CleanupBody>(&body)
        .ok()
        .and_then(|body| body.mode)
        .unwrap_or(state.config.maintenance.default_mode);
    tracing::info!(user_id = %identity.user_id, %mode, "cleanup requested");

    let report = state
        .reconciler
        .run(mode)
        .await
        .map_err(|source| MaintenanceError::Failed {
            message: "Internal server error",
            source,
        })?;

    Ok(Json(CleanupResponse {
        message: "Cleanup completed successfully".to_owned(),
        deleted_posts: report.deleted(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        total_posts: report.total(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualResponse {
    pub message: String,
    pub total_users: u64,
    pub orphaned_posts_found: u64,
    pub posts_deleted: u64,
}

/// `GET /admin/cleanup/manual`.
pub async fn manual(
    State(state): State<AppState>,
    identity: Option<Identity>,
) -> Result<Json<ManualResponse>, MaintenanceError> {
    if state.config.maintenance.open_manual_cleanup {
        tracing::debug!("manual cleanup is open, skipping authorization");
    } else {
        authorize(&state, identity).await?;
    }

    let audit = state
        .reconciler
        .audit()
        .await
        .map_err(|source| MaintenanceError::Failed {
            message: "Error cleaning up orphaned posts",
            source,
        })?;

    Ok(Json(ManualResponse {
        message: "Cleanup completed successfully".to_owned(),
        total_users: audit.total_users,
        orphaned_posts_found: audit.orphans_found,
        posts_deleted: audit.deleted,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::database::{Database, MemoryStore};
    use crate::id::UserId;
    use crate::post::Post;
    use crate::user::ReadOnlyPosts;
    use crate::*;

    async fn body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    /// Ada is an administrator, Bob is not. Three posts are orphans.
    async fn seeded(state: &AppState) -> (String, String) {
        let ada = create_user(state, "Ada", "admin@example.com", "password").await;
        let bob = create_user(state, "Bob", "bob@example.com", "password").await;
        create_post(state, &ada, true).await;
        create_post(state, &bob, false).await;

        let ghost = UserId::generate();
        for title in ["one", "two", "three"] {
            let post = Post::new(ghost.clone(), title, "content", true);
            state.db.posts.insert(&post).await.unwrap();
        }

        (session(state, &ada), session(state, &bob))
    }

    #[tokio::test]
    async fn test_cleanup_requires_admin() {
        let state = state();
        let (_, bob) = seeded(&state).await;
        let app = app(state.clone());

        let response =
            make_request(None, app.clone(), Method::POST, "/admin/cleanup", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let error: ErrorBody = body(response).await;
        assert_eq!(error.message, "Unauthorized - Must be logged in");

        let response =
            make_request(Some(&bob), app, Method::POST, "/admin/cleanup", String::default()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let error: ErrorBody = body(response).await;
        assert_eq!(error.message, "Forbidden - Admin access required");

        assert_eq!(state.db.posts.find_all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cleanup_bulk_by_default() {
        let state = state();
        let (ada, _) = seeded(&state).await;
        let app = app(state.clone());

        let response =
            make_request(Some(&ada), app.clone(), Method::POST, "/admin/cleanup", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: CleanupResponse = body(response).await;
        assert_eq!(report.message, "Cleanup completed successfully");
        assert_eq!(report.deleted_posts, 3);
        assert_eq!(report.total_posts, None);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
        assert_eq!(state.db.posts.find_all().await.unwrap().len(), 2);

        // Idempotent.
        let response =
            make_request(Some(&ada), app, Method::POST, "/admin/cleanup", "not json".into()).await;
        let report: CleanupResponse = body(response).await;
        assert_eq!(report.deleted_posts, 0);
    }

    #[tokio::test]
    async fn test_cleanup_scan_mode() {
        let state = state();
        let (ada, _) = seeded(&state).await;

        let response = make_request(
            Some(&ada),
            app(state),
            Method::POST,
            "/admin/cleanup",
            json!({ "mode": "scan" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: CleanupResponse = body(response).await;
        assert_eq!(report.deleted_posts, 3);
        assert_eq!(report.total_posts, Some(5));
    }

    #[tokio::test]
    async fn test_manual_requires_admin_by_default() {
        let state = state();
        let (ada, bob) = seeded(&state).await;
        let app = app(state);

        let response =
            make_request(None, app.clone(), Method::GET, "/admin/cleanup/manual", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some(&bob),
            app.clone(),
            Method::GET,
            "/admin/cleanup/manual",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response =
            make_request(Some(&ada), app, Method::GET, "/admin/cleanup/manual", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: ManualResponse = body(response).await;
        assert_eq!(report.total_users, 2);
        assert_eq!(report.orphaned_posts_found, 3);
        assert_eq!(report.posts_deleted, 3);
    }

    #[tokio::test]
    async fn test_manual_can_be_opened() {
        let mut config = test_config();
        config.maintenance.open_manual_cleanup = true;
        let state = state_with(config, Database::memory());
        seeded(&state).await;

        let response = make_request(
            None,
            app(state),
            Method::GET,
            "/admin/cleanup/manual",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: ManualResponse = body(response).await;
        assert_eq!(report.posts_deleted, 3);
    }

    #[tokio::test]
    async fn test_cleanup_failure() {
        let db = Database {
            users: Arc::new(MemoryStore::new()),
            posts: Arc::new(ReadOnlyPosts(MemoryStore::new())),
        };
        let state = state_with(test_config(), db);
        let (ada, _) = seeded(&state).await;
        let app = app(state);

        let response =
            make_request(Some(&ada), app.clone(), Method::POST, "/admin/cleanup", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = body(response).await;
        assert_eq!(error.message, "Internal server error");
        assert!(error.error.is_some());

        let response =
            make_request(Some(&ada), app, Method::GET, "/admin/cleanup/manual", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorBody = body(response).await;
        assert_eq!(error.message, "Error cleaning up orphaned posts");
    }
}
