//! Posts API.
//!
//! Reading is public. Creating requires a bearer token, and only a post's
//! author may update or delete it.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiJson, ResultExt, page, parse_id};
use super::{ContentState, MessageResponse, comments, current_user_id};
use crate::auth::{Auth, require_auth};
use crate::db::{Comment, Post};

pub const DEFAULT_POSTS_LIMIT: i64 = 10;
pub const MAX_POSTS_LIMIT: i64 = 100;
pub const DEFAULT_EMBEDDED_COMMENTS_LIMIT: i64 = 10;
pub const MAX_EMBEDDED_COMMENTS_LIMIT: i64 = 50;
pub const MAX_TITLE_LEN: usize = 255;

pub fn router(state: ContentState) -> Router {
    let public = Router::new()
        .route("/", get(list_posts))
        .route("/{id}", get(get_post))
        .route("/{id}/with-comments", get(get_post_with_comments));

    let protected = Router::new()
        .route("/", post(create_post))
        .route("/my", get(my_posts))
        .route("/{id}", put(update_post).delete(delete_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<ContentState>,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(comments::post_comments_router(state.clone()))
        .with_state(state)
}

// --- Request/Response types ---

#[derive(Deserialize)]
pub(super) struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Deserialize)]
struct CommentPageQuery {
    comment_limit: Option<String>,
    comment_offset: Option<String>,
}

#[derive(Deserialize)]
struct PostRequest {
    title: String,
    content: String,
}

#[derive(Serialize)]
struct PostResponse {
    post: Post,
}

#[derive(Serialize)]
struct PostWithMessageResponse {
    message: &'static str,
    post: Post,
}

#[derive(Serialize)]
struct PostsResponse {
    posts: Vec<Post>,
}

#[derive(Serialize)]
struct PostWithComments {
    #[serde(flatten)]
    post: Post,
    comments: Vec<Comment>,
}

#[derive(Serialize)]
struct PostWithCommentsResponse {
    post: PostWithComments,
}

// --- Helpers ---

/// Trimmed title and content, or a 400 if either is empty or the title is too long.
fn validate_post(payload: &PostRequest) -> Result<(&str, &str), ApiError> {
    let title = payload.title.trim();
    let content = payload.content.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN || content.is_empty() {
        return Err(ApiError::bad_request("Invalid request data"));
    }
    Ok((title, content))
}

async fn load_post(state: &ContentState, id: i64) -> Result<Post, ApiError> {
    state
        .db
        .posts()
        .get_by_id(id)
        .await
        .db_err("Failed to get post")?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

// --- Handlers ---

async fn list_posts(
    State(state): State<ContentState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page(
        query.limit.as_deref(),
        query.offset.as_deref(),
        DEFAULT_POSTS_LIMIT,
        MAX_POSTS_LIMIT,
    );

    let posts = state
        .db
        .posts()
        .list(limit, offset)
        .await
        .db_err("Failed to fetch posts")?;

    Ok(Json(PostsResponse { posts }))
}

async fn my_posts(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = current_user_id(&state.db, &user.username).await?;
    let (limit, offset) = page(
        query.limit.as_deref(),
        query.offset.as_deref(),
        DEFAULT_POSTS_LIMIT,
        MAX_POSTS_LIMIT,
    );

    let posts = state
        .db
        .posts()
        .list_by_author(user_id, limit, offset)
        .await
        .db_err("Failed to fetch posts")?;

    Ok(Json(PostsResponse { posts }))
}

async fn get_post(
    State(state): State<ContentState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid post ID")?;
    let post = load_post(&state, id).await?;
    Ok(Json(PostResponse { post }))
}

async fn get_post_with_comments(
    State(state): State<ContentState>,
    Path(id): Path<String>,
    Query(query): Query<CommentPageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid post ID")?;
    let (limit, offset) = page(
        query.comment_limit.as_deref(),
        query.comment_offset.as_deref(),
        DEFAULT_EMBEDDED_COMMENTS_LIMIT,
        MAX_EMBEDDED_COMMENTS_LIMIT,
    );

    let post = load_post(&state, id).await?;
    let comments = state
        .db
        .comments()
        .list_by_post(id, limit, offset)
        .await
        .db_err("Failed to fetch comments")?;

    Ok(Json(PostWithCommentsResponse {
        post: PostWithComments { post, comments },
    }))
}

async fn create_post(
    State(state): State<ContentState>,
    Auth(user): Auth,
    ApiJson(payload): ApiJson<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (title, content) = validate_post(&payload)?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    let id = state
        .db
        .posts()
        .create(user_id, title, content)
        .await
        .db_err("Failed to create post")?;

    let post = state
        .db
        .posts()
        .get_by_id(id)
        .await
        .db_err("Failed to get created post")?
        .ok_or_else(|| ApiError::internal("Created post not found"))?;

    Ok((
        StatusCode::CREATED,
        Json(PostWithMessageResponse {
            message: "Post created successfully",
            post,
        }),
    ))
}

async fn update_post(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid post ID")?;
    let (title, content) = validate_post(&payload)?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    let existing = load_post(&state, id).await?;
    if existing.author_id != user_id {
        return Err(ApiError::forbidden("You can only update your own posts"));
    }

    let updated = state
        .db
        .posts()
        .update(id, title, content)
        .await
        .db_err("Failed to update post")?;
    if !updated {
        return Err(ApiError::not_found("Post not found"));
    }

    let post = load_post(&state, id).await?;

    Ok(Json(PostWithMessageResponse {
        message: "Post updated successfully",
        post,
    }))
}

async fn delete_post(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid post ID")?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    let existing = load_post(&state, id).await?;
    if existing.author_id != user_id {
        return Err(ApiError::forbidden("You can only delete your own posts"));
    }

    let deleted = state
        .db
        .posts()
        .delete(id)
        .await
        .db_err("Failed to delete post")?;
    if !deleted {
        return Err(ApiError::not_found("Post not found"));
    }

    Ok(Json(MessageResponse {
        message: "Post deleted successfully",
    }))
}
