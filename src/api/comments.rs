//! Comments API.
//!
//! - GET `/posts/{id}/comments` - List a post's comments, oldest first
//! - POST `/posts/{id}/comments` - Comment on a post (bearer auth)
//! - PUT `/comments/{id}` - Edit own comment (bearer auth)
//! - DELETE `/comments/{id}` - Delete own comment (bearer auth)

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
use super::posts::PageQuery;
use super::{ContentState, MessageResponse, current_user_id};
use crate::auth::{Auth, require_auth};
use crate::db::Comment;

pub const DEFAULT_COMMENTS_LIMIT: i64 = 20;
pub const MAX_COMMENTS_LIMIT: i64 = 100;

/// Routes nested under `/comments`.
pub fn router(state: ContentState) -> Router {
    Router::new()
        .route("/{id}", put(update_comment).delete(delete_comment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<ContentState>,
        ))
        .with_state(state)
}

/// Routes merged into the `/posts` router.
pub(super) fn post_comments_router(state: ContentState) -> Router<ContentState> {
    let protected = Router::new()
        .route("/{id}/comments", post(create_comment))
        .route_layer(middleware::from_fn_with_state(
            state,
            require_auth::<ContentState>,
        ));

    Router::new()
        .route("/{id}/comments", get(list_comments))
        .merge(protected)
}

#[derive(Deserialize)]
struct CommentRequest {
    content: String,
}

#[derive(Serialize)]
struct CommentResponse {
    message: &'static str,
    comment: Comment,
}

#[derive(Serialize)]
struct CommentsResponse {
    comments: Vec<Comment>,
}

fn validate_content(payload: &CommentRequest) -> Result<&str, ApiError> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Invalid request data"));
    }
    Ok(content)
}

async fn ensure_post_exists(state: &ContentState, post_id: i64) -> Result<(), ApiError> {
    let exists = state
        .db
        .posts()
        .exists(post_id)
        .await
        .db_err("Failed to get post")?;
    if !exists {
        return Err(ApiError::not_found("Post not found"));
    }
    Ok(())
}

async fn load_comment(state: &ContentState, id: i64) -> Result<Comment, ApiError> {
    state
        .db
        .comments()
        .get_by_id(id)
        .await
        .db_err("Failed to get comment")?
        .ok_or_else(|| ApiError::not_found("Comment not found"))
}

async fn list_comments(
    State(state): State<ContentState>,
    Path(post_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_id(&post_id, "Invalid post ID")?;
    let (limit, offset) = page(
        query.limit.as_deref(),
        query.offset.as_deref(),
        DEFAULT_COMMENTS_LIMIT,
        MAX_COMMENTS_LIMIT,
    );

    ensure_post_exists(&state, post_id).await?;

    let comments = state
        .db
        .comments()
        .list_by_post(post_id, limit, offset)
        .await
        .db_err("Failed to fetch comments")?;

    Ok(Json(CommentsResponse { comments }))
}

async fn create_comment(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Path(post_id): Path<String>,
    ApiJson(payload): ApiJson<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_id(&post_id, "Invalid post ID")?;
    let content = validate_content(&payload)?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    ensure_post_exists(&state, post_id).await?;

    let id = state
        .db
        .comments()
        .create(post_id, user_id, content)
        .await
        .db_err("Failed to create comment")?;

    let comment = state
        .db
        .comments()
        .get_by_id(id)
        .await
        .db_err("Failed to get created comment")?
        .ok_or_else(|| ApiError::internal("Created comment not found"))?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment created successfully",
            comment,
        }),
    ))
}

async fn update_comment(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid comment ID")?;
    let content = validate_content(&payload)?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    let existing = load_comment(&state, id).await?;
    if existing.author_id != user_id {
        return Err(ApiError::forbidden("You can only update your own comments"));
    }

    let updated = state
        .db
        .comments()
        .update(id, content)
        .await
        .db_err("Failed to update comment")?;
    if !updated {
        return Err(ApiError::not_found("Comment not found"));
    }

    let comment = load_comment(&state, id).await?;

    Ok(Json(CommentResponse {
        message: "Comment updated successfully",
        comment,
    }))
}

async fn delete_comment(
    State(state): State<ContentState>,
    Auth(user): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "Invalid comment ID")?;
    let user_id = current_user_id(&state.db, &user.username).await?;

    let existing = load_comment(&state, id).await?;
    if existing.author_id != user_id {
        return Err(ApiError::forbidden("You can only delete your own comments"));
    }

    let deleted = state
        .db
        .comments()
        .delete(id)
        .await
        .db_err("Failed to delete comment")?;
    if !deleted {
        return Err(ApiError::not_found("Comment not found"));
    }

    Ok(Json(MessageResponse {
        message: "Comment deleted successfully",
    }))
}
