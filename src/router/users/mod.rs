//! Users-related HTTP API.
mod delete;
mod get;
mod update;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Router, middleware};
use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::middleware::Identity;
use crate::user::User;
use crate::{AppState, ServerError};

/// Public profile of a user.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub image: Option<String>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
        }
    }
}

/// Custom middleware for authentification.
///
/// Loads the session's user, which may have been deleted since the token was
/// issued.
async fn auth(
    State(state): State<AppState>,
    identity: Identity,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let user = state
        .db
        .users
        .find_by_id(&identity.user_id)
        .await?
        .ok_or(ServerError::NotFound("User not found"))?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `get`.
        // `PATCH /users/@me` goes to `update`.
        // `DELETE /users/@me` goes to `delete`.
        .route(
            "/@me",
            get(get::handler)
                .patch(update::handler)
                .delete(delete::handler),
        )
        .route_layer(middleware::from_fn_with_state(state, auth))
}
