use axum::{
    Extension,
    extract::{Path, State},
};

use tube_types::api::SubscriptionToggle;
use tube_types::models::{ChannelCard, User};

use crate::error::{ApiError, parse_id};
use crate::middleware::Viewer;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

pub async fn toggle_subscription(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<SubscriptionToggle>, ApiError> {
    let channel = parse_id(&channel_id, "channel")?;
    if channel == user.id {
        return Err(ApiError::invalid("You cannot subscribe to your own channel"));
    }

    let result = blocking(&state, move |db| db.toggle_subscription(channel, user.id))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;
    let message = if result.is_subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(result, message))
}

pub async fn channel_subscribers(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<ApiResponse<Vec<ChannelCard>>, ApiError> {
    let channel = parse_id(&channel_id, "channel")?;
    let subscribers = blocking(&state, move |db| db.channel_subscribers(channel, viewer.id()))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;
    Ok(ApiResponse::ok(subscribers, "Subscribers fetched successfully"))
}

pub async fn subscribed_channels(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<ApiResponse<Vec<ChannelCard>>, ApiError> {
    let subscriber = parse_id(&subscriber_id, "subscriber")?;
    let channels = blocking(&state, move |db| db.subscribed_channels(subscriber, viewer.id()))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(channels, "Subscribed channels fetched successfully"))
}
