//! Delete the current user and every post they own.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::user::User;
use crate::{AppState, ServerError};

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Response>, ServerError> {
    state.users.remove(&user).await?;

    Ok(Json(Response {
        message: "User deleted successfully".to_owned(),
    }))
}
