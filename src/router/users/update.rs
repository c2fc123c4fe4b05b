//! Update user profile.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Profile;
use crate::router::Valid;
use crate::user::User;
use crate::{AppState, ServerError};

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    #[validate(custom(function = "crate::router::not_blank", message = "Name is required."))]
    name: String,
    #[validate(url(message = "Image must be an URL."))]
    image: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<Json<Profile>, ServerError> {
    let previous = std::mem::replace(&mut user.name, body.name.trim().to_owned());
    user.image = body.image;
    user.updated_at = Utc::now();

    if !state.db.users.update(&user).await? {
        return Err(ServerError::NotFound("User not found"));
    }
    tracing::info!(user_id = %user.id, name = %user.name, %previous, "user profile updated");

    Ok(Json(user.into()))
}
