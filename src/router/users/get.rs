use axum::{Extension, Json};

use super::Profile;
use crate::user::User;

pub async fn handler(Extension(user): Extension<User>) -> Json<Profile> {
    Json(user.into())
}
