use axum::{
    Extension,
    extract::{Path, State},
};
use serde::Deserialize;

use tube_types::like::{LikeAction, LikeSummary, LikeTarget};
use tube_types::models::{User, VideoCard};

use crate::error::{ApiError, parse_id};
use crate::extract::QueryParams;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleQuery {
    pub toggle_like: Option<String>,
    pub video_id: Option<String>,
    pub comment_id: Option<String>,
    pub tweet_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionQuery {
    pub toggle_like: Option<String>,
}

/// `POST /toggle?toggleLike=true|false&videoId=..|commentId=..|tweetId=..`
pub async fn toggle(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    QueryParams(q): QueryParams<ToggleQuery>,
) -> Result<ApiResponse<LikeSummary>, ApiError> {
    let action = parse_action(q.toggle_like.as_deref())?;
    let id = |raw: Option<String>, what: &str| {
        raw.filter(|s| !s.is_empty()).map(|s| parse_id(&s, what)).transpose()
    };
    let target = LikeTarget::from_exclusive(
        id(q.video_id, "video")?,
        id(q.comment_id, "comment")?,
        id(q.tweet_id, "tweet")?,
    )
    .map_err(ApiError::invalid)?;

    apply(&state, target, user, action).await
}

pub async fn toggle_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
    QueryParams(q): QueryParams<ActionQuery>,
) -> Result<ApiResponse<LikeSummary>, ApiError> {
    let action = parse_action(q.toggle_like.as_deref())?;
    let target = LikeTarget::video(parse_id(&video_id, "video")?);
    apply(&state, target, user, action).await
}

pub async fn toggle_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(user): Extension<User>,
    QueryParams(q): QueryParams<ActionQuery>,
) -> Result<ApiResponse<LikeSummary>, ApiError> {
    let action = parse_action(q.toggle_like.as_deref())?;
    let target = LikeTarget::comment(parse_id(&comment_id, "comment")?);
    apply(&state, target, user, action).await
}

pub async fn toggle_tweet(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Extension(user): Extension<User>,
    QueryParams(q): QueryParams<ActionQuery>,
) -> Result<ApiResponse<LikeSummary>, ApiError> {
    let action = parse_action(q.toggle_like.as_deref())?;
    let target = LikeTarget::tweet(parse_id(&tweet_id, "tweet")?);
    apply(&state, target, user, action).await
}

pub async fn liked_videos(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Vec<VideoCard>>, ApiError> {
    let videos = blocking(&state, move |db| db.liked_videos(user.id)).await?;
    Ok(ApiResponse::ok(videos, "Liked videos fetched successfully"))
}

fn parse_action(raw: Option<&str>) -> Result<LikeAction, ApiError> {
    raw.ok_or_else(|| ApiError::invalid("toggleLike query parameter is required"))?
        .parse::<LikeAction>()
        .map_err(ApiError::invalid)
}

async fn apply(
    state: &AppState,
    target: LikeTarget,
    user: User,
    action: LikeAction,
) -> Result<ApiResponse<LikeSummary>, ApiError> {
    let summary = blocking(state, move |db| db.toggle_like(target, user.id, action))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} not found", target.kind)))?;

    let message = match (summary.is_liked, summary.is_disliked) {
        (true, _) => "Liked successfully",
        (_, true) => "Disliked successfully",
        _ => "Reaction removed",
    };
    Ok(ApiResponse::ok(summary, message))
}
