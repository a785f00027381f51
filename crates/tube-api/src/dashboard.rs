use axum::{Extension, extract::State};

use tube_types::models::{ChannelStats, DashboardVideo, User};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

pub async fn channel_stats(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<ChannelStats>, ApiError> {
    let stats = blocking(&state, move |db| db.channel_stats(user.id))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

pub async fn channel_videos(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Vec<DashboardVideo>>, ApiError> {
    let videos = blocking(&state, move |db| db.channel_videos(user.id)).await?;
    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}
