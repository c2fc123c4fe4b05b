//! Error handler for quire.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::database::StoreError;
use crate::id::{IdError, UserId};

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("posts of user {user_id} could not be deleted")]
    Cascade {
        user_id: UserId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Whether the error comes from the server rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ServerError::Store(_)
                | ServerError::Cascade { .. }
                | ServerError::Crypto(_)
                | ServerError::Token(_)
                | ServerError::Internal { .. }
        ) && !matches!(self, ServerError::Store(StoreError::Duplicate { .. }))
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response.errors(validation_errors),

            ServerError::InvalidId(_) => response.title("Invalid post ID."),

            ServerError::Store(StoreError::Duplicate { field }) => response
                .title("Email already in use.")
                .details(&format!("{field} is already used"))
                .status(StatusCode::CONFLICT),

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::InvalidCredentials => response
                .title("Invalid email or password.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden(message) => response
                .title(message)
                .status(StatusCode::FORBIDDEN),

            ServerError::NotFound(message) => response
                .title(message)
                .status(StatusCode::NOT_FOUND),

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },

            err if err.is_internal() => {
                tracing::error!(error = %err, "server returned 500 status");

                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
