use axum::{
    Extension,
    extract::{Path, State},
};

use tube_types::api::ContentRequest;
use tube_types::models::{Tweet, TweetView, User};
use tube_types::paging::{PageQuery, PageRequest, Paginated};

use crate::error::{ApiError, owned, parse_id, required};
use crate::extract::{JsonBody, QueryParams};
use crate::middleware::Viewer;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

pub async fn all_tweets(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    QueryParams(q): QueryParams<PageQuery>,
) -> Result<ApiResponse<Paginated<TweetView>>, ApiError> {
    let page = PageRequest::try_from(&q).map_err(ApiError::InvalidInput)?;
    let tweets = blocking(&state, move |db| db.list_tweets(None, viewer.id(), page)).await?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

pub async fn user_tweets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
    QueryParams(q): QueryParams<PageQuery>,
) -> Result<ApiResponse<Paginated<TweetView>>, ApiError> {
    let author = parse_id(&user_id, "user")?;
    let page = PageRequest::try_from(&q).map_err(ApiError::InvalidInput)?;

    let tweets = blocking(&state, move |db| {
        if db.get_user_by_id(author)?.is_none() {
            return Ok(None);
        }
        db.list_tweets(Some(author), viewer.id(), page).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

pub async fn create_tweet(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let content = required(req.content.as_deref(), "content")?.to_string();
    let tweet = blocking(&state, move |db| db.create_tweet(user.id, &content)).await?;
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

pub async fn update_tweet(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<ContentRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let id = parse_id(&tweet_id, "tweet")?;
    let content = required(req.content.as_deref(), "content")?.to_string();

    let tweet = owned(
        blocking(&state, move |db| db.update_tweet(id, user.id, &content)).await?,
        "Tweet",
    )?;
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

pub async fn delete_tweet(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let id = parse_id(&tweet_id, "tweet")?;
    owned(blocking(&state, move |db| db.delete_tweet(id, user.id)).await?, "Tweet")?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Tweet deleted successfully"))
}
