//! Posts-related HTTP API.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::database::Database;
use crate::error::{Result, ServerError};
use crate::id::{PostId, UserId};
use crate::middleware::Identity;
use crate::post::{Author, PopulatedPost, Post, PostPatch, TITLE_MAX_LENGTH};
use crate::router::Valid;
use crate::AppState;

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Post as listed, with a content excerpt.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Option<UserId>,
    pub author_name: String,
}

impl From<PopulatedPost> for Summary {
    fn from(PopulatedPost { post, author }: PopulatedPost) -> Self {
        Self {
            content: post.excerpt(),
            id: post.id,
            title: post.title,
            published: post.published,
            created_at: post.created_at,
            updated_at: post.updated_at,
            author_id: post.author_id,
            author_name: author.map_or_else(|| UNKNOWN_AUTHOR.to_owned(), |a| a.name),
        }
    }
}

/// Full post with its author.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Option<UserId>,
    pub author: Option<Author>,
}

impl From<PopulatedPost> for Response {
    fn from(PopulatedPost { post, author }: PopulatedPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            published: post.published,
            created_at: post.created_at,
            updated_at: post.updated_at,
            author_id: post.author_id,
            author,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    author: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(
        custom(function = "crate::router::not_blank", message = "Title is required."),
        length(max = TITLE_MAX_LENGTH, message = "Title is too long.")
    )]
    pub title: String,
    #[validate(custom(function = "crate::router::not_blank", message = "Content is required."))]
    pub content: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateBody {
    #[validate(
        custom(function = "crate::router::not_blank", message = "Title is required."),
        length(max = TITLE_MAX_LENGTH, message = "Title is too long.")
    )]
    pub title: Option<String>,
    #[validate(custom(function = "crate::router::not_blank", message = "Content is required."))]
    pub content: Option<String>,
    pub published: Option<bool>,
}

impl From<UpdateBody> for PostPatch {
    fn from(body: UpdateBody) -> Self {
        Self {
            title: body.title,
            content: body.content,
            published: body.published,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /posts` goes to `list`, `POST /posts` to `create`.
        .route("/", get(list).post(create))
        .route("/{id}", get(find).patch(update).delete(delete))
}

/// Dereference the author of each post, sharing lookups between posts of
/// the same author.
async fn populate(db: &Database, posts: Vec<Post>) -> Result<Vec<PopulatedPost>> {
    let mut authors: HashMap<UserId, Option<Author>> = HashMap::new();
    let mut populated = Vec::with_capacity(posts.len());

    for post in posts {
        let author = match &post.author_id {
            Some(id) => match authors.get(id) {
                Some(author) => author.clone(),
                None => {
                    let author = db.users.find_by_id(id).await?.map(Author::from);
                    if author.is_none() {
                        tracing::debug!(post_id = %post.id, author_id = %id, "post author not found");
                    }
                    authors.insert(id.clone(), author.clone());
                    author
                },
            },
            None => None,
        };
        populated.push(PopulatedPost { post, author });
    }

    Ok(populated)
}

async fn populate_one(db: &Database, post: Post) -> Result<PopulatedPost> {
    let mut populated = populate(db, vec![post]).await?;
    populated
        .pop()
        .ok_or_else(|| ServerError::Internal {
            details: "post lost while populating".into(),
            source: None,
        })
}

/// Load a post `identity` may modify.
async fn owned_post(
    state: &AppState,
    identity: &Identity,
    id: &str,
    forbidden: &'static str,
) -> Result<Post> {
    let id = PostId::parse(id)?;
    let post = state
        .db
        .posts
        .find_by_id(&id)
        .await?
        .ok_or(ServerError::NotFound("Post not found"))?;

    if !post.is_owned_by(&identity.user_id) {
        return Err(ServerError::Forbidden(forbidden));
    }
    Ok(post)
}

async fn list(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Summary>>> {
    let posts = match query.author {
        Some(author) => match UserId::parse(&author) {
            Ok(author) => state.db.posts.find_by_author(&author).await?,
            // No user can own it.
            Err(_) => Vec::new(),
        },
        None => state.db.posts.find_all().await?,
    };

    let viewer = identity.as_ref().map(|i| &i.user_id);
    let posts: Vec<Post> = posts
        .into_iter()
        .filter(|post| post.is_visible_to(viewer))
        .collect();
    tracing::debug!(total = posts.len(), "listing posts");

    let posts = populate(&state.db, posts).await?;
    Ok(Json(posts.into_iter().map(Summary::from).collect()))
}

async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<Response>)> {
    // A token may outlive its user: never write a stale owner.
    let user = state
        .db
        .users
        .find_by_id(&identity.user_id)
        .await?
        .ok_or(ServerError::Unauthorized)?;

    let post = Post::new(user.id.clone(), body.title, body.content, body.published);
    state.db.posts.insert(&post).await?;
    tracing::info!(post_id = %post.id, author_id = %user.id, "post created");

    Ok((
        StatusCode::CREATED,
        Json(Response::from(PopulatedPost {
            post,
            author: Some(user.into()),
        })),
    ))
}

async fn find(
    State(state): State<AppState>,
    identity: Option<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Response>> {
    let id = PostId::parse(&id)?;
    let post = state
        .db
        .posts
        .find_by_id(&id)
        .await?
        .filter(|post| post.is_visible_to(identity.as_ref().map(|i| &i.user_id)))
        .ok_or(ServerError::NotFound("Post not found"))?;

    Ok(Json(populate_one(&state.db, post).await?.into()))
}

async fn update(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<Response>> {
    let mut post = owned_post(&state, &identity, &id, "You can only edit your own posts").await?;

    post.apply(body.into());
    if !state.db.posts.update(&post).await? {
        return Err(ServerError::NotFound("Post not found"));
    }
    tracing::info!(post_id = %post.id, "post updated");

    Ok(Json(populate_one(&state.db, post).await?.into()))
}

async fn delete(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Deleted>> {
    let post = owned_post(&state, &identity, &id, "You can only delete your own posts").await?;

    state.db.posts.delete_by_id(&post.id).await?;
    tracing::info!(post_id = %post.id, "post deleted");

    Ok(Json(Deleted {
        message: "Post deleted successfully".to_owned(),
    }))
}
