use axum::{
    Extension,
    extract::{Path, State},
};

use tube_types::api::ContentRequest;
use tube_types::models::{Comment, CommentView, User};
use tube_types::paging::{PageQuery, PageRequest, Paginated};

use crate::error::{ApiError, owned, parse_id, required};
use crate::extract::{JsonBody, QueryParams};
use crate::middleware::Viewer;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

pub async fn video_comments(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
    QueryParams(q): QueryParams<PageQuery>,
) -> Result<ApiResponse<Paginated<CommentView>>, ApiError> {
    let video = parse_id(&video_id, "video")?;
    let page = PageRequest::try_from(&q).map_err(ApiError::InvalidInput)?;

    let comments = blocking(&state, move |db| db.video_comments(video, viewer.id(), page))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(comments, "Comments fetched successfully"))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let video = parse_id(&video_id, "video")?;
    let content = required(req.content.as_deref(), "content")?.to_string();

    let comment = blocking(&state, move |db| db.add_comment(video, user.id, &content))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let id = parse_id(&comment_id, "comment")?;
    let content = required(req.content.as_deref(), "content")?.to_string();

    let comment = owned(
        blocking(&state, move |db| db.update_comment(id, user.id, &content)).await?,
        "Comment",
    )?;
    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let id = parse_id(&comment_id, "comment")?;
    owned(blocking(&state, move |db| db.delete_comment(id, user.id)).await?, "Comment")?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Comment deleted successfully"))
}
