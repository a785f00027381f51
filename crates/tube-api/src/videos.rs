use axum::{
    Extension,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
};
use serde::Deserialize;
use tracing::{info, warn};

use tube_db::queries::{NewVideo, VideoSearch, VideoUpdate};
use tube_types::api::{PublishStatus, ViewCount};
use tube_types::models::{User, Video, VideoCard, VideoDetail};
use tube_types::paging::{PageRequest, Paginated, SortDirection, VideoSort};

use crate::error::{ApiError, owned, parse_id, required};
use crate::extract::QueryParams;
use crate::middleware::Viewer;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};
use crate::upload::read_multipart;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

pub async fn list_videos(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<OwnerQuery>,
) -> Result<ApiResponse<Vec<VideoCard>>, ApiError> {
    let owner = q
        .user_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| parse_id(raw, "user"))
        .transpose()?;

    let videos = blocking(&state, move |db| db.list_published_videos(owner)).await?;
    Ok(ApiResponse::ok(videos, "Videos fetched successfully"))
}

/// Paginated search. Unpublished videos are included only when the caller
/// asks for their own channel.
pub async fn search_videos(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    QueryParams(q): QueryParams<SearchQuery>,
) -> Result<ApiResponse<Paginated<VideoCard>>, ApiError> {
    let page = PageRequest::parse(q.page.as_deref(), q.limit.as_deref())
        .map_err(ApiError::InvalidInput)?;
    let sort = match q.sort_by.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<VideoSort>().map_err(ApiError::InvalidInput)?,
        None => VideoSort::default(),
    };
    let direction = match q.sort_type.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<SortDirection>().map_err(ApiError::InvalidInput)?,
        None => SortDirection::default(),
    };
    let owner = q
        .user_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| parse_id(raw, "user"))
        .transpose()?;
    let include_unpublished = owner.is_some() && owner == viewer.id();
    let query = q.query.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let result = blocking(&state, move |db| {
        db.search_videos(&VideoSearch {
            query: query.as_deref(),
            owner,
            include_unpublished,
            sort,
            direction,
            page,
        })
    })
    .await?;
    Ok(ApiResponse::ok(result, "Videos fetched successfully"))
}

pub async fn publish_video(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Video>, ApiError> {
    let mut form = read_multipart(&state.temp_dir, multipart, &["videoFile", "thumbnail"]).await?;

    let title = required(form.text("title"), "title")?.to_string();
    let description = required(form.text("description"), "description")?.to_string();
    let video_file = form
        .take_file("videoFile")
        .ok_or_else(|| ApiError::invalid("Video file is required"))?;
    let thumbnail_file = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::invalid("Thumbnail file is required"))?;

    let Some(video_asset) = state.assets.upload(video_file).await else {
        thumbnail_file.discard().await;
        return Err(ApiError::Internal(anyhow::anyhow!("video upload failed")));
    };
    let Some(thumbnail_asset) = state.assets.upload(thumbnail_file).await else {
        state.assets.delete_quietly(&video_asset.url).await;
        return Err(ApiError::Internal(anyhow::anyhow!("thumbnail upload failed")));
    };

    let video_url = video_asset.url.clone();
    let thumbnail_url = thumbnail_asset.url.clone();
    let duration = video_asset.duration.unwrap_or(0.0);
    let created = blocking(&state, move |db| {
        db.create_video(&NewVideo {
            owner: user.id,
            title: &title,
            description: &description,
            video_file: &video_url,
            thumbnail: &thumbnail_url,
            duration,
            is_published: true,
        })
    })
    .await;

    match created {
        Ok(video) => {
            info!("User {} published video {}", video.owner, video.base.id);
            Ok(ApiResponse::created(video, "Video uploaded successfully"))
        }
        Err(e) => {
            state.assets.delete_quietly(&video_asset.url).await;
            state.assets.delete_quietly(&thumbnail_asset.url).await;
            Err(e)
        }
    }
}

pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<ApiResponse<VideoDetail>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let detail = blocking(&state, move |db| db.video_detail(id, viewer.id()))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(detail, "Video fetched successfully"))
}

/// Update title, description and/or thumbnail. A replaced thumbnail is
/// deleted from the asset store afterwards.
pub async fn update_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Video>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let mut form = read_multipart(&state.temp_dir, multipart, &["thumbnail"]).await?;

    let title = optional_text(form.text("title"), "title")?;
    let description = optional_text(form.text("description"), "description")?;
    let thumbnail_file = form.take_file("thumbnail");
    if title.is_none() && description.is_none() && thumbnail_file.is_none() {
        return Err(ApiError::invalid("Provide a title, description or thumbnail to update"));
    }

    // Check ownership before spending an upload on it.
    let existing = blocking(&state, move |db| db.get_video(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    if existing.owner != user.id {
        return Err(ApiError::Forbidden("You do not have permission to modify this video".into()));
    }

    let new_thumbnail = match thumbnail_file {
        Some(file) => Some(
            state
                .assets
                .upload(file)
                .await
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("thumbnail upload failed")))?,
        ),
        None => None,
    };

    let thumbnail_url = new_thumbnail.as_ref().map(|t| t.url.clone());
    let outcome = blocking(&state, move |db| {
        db.update_video(
            id,
            user.id,
            &VideoUpdate {
                title: title.as_deref(),
                description: description.as_deref(),
                thumbnail: thumbnail_url.as_deref(),
            },
        )
    })
    .await
    .and_then(|g| owned(g, "Video"));

    match outcome {
        Ok((video, replaced)) => {
            if let Some(old) = replaced {
                state.assets.delete_quietly(&old).await;
            }
            Ok(ApiResponse::ok(video, "Video updated successfully"))
        }
        Err(e) => {
            if let Some(thumbnail) = new_thumbnail {
                state.assets.delete_quietly(&thumbnail.url).await;
            }
            Err(e)
        }
    }
}

/// Delete a video with everything that references it, then its media.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let (video, _) =
        owned(blocking(&state, move |db| db.delete_video(id, user.id)).await?, "Video")?;

    for url in [&video.base.video_file, &video.base.thumbnail] {
        if !state.assets.delete(url).await {
            warn!("Video {} deleted but asset {} was left behind", video.base.id, url);
        }
    }
    Ok(ApiResponse::ok(serde_json::json!({}), "Video deleted successfully"))
}

pub async fn toggle_publish(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<PublishStatus>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let is_published =
        owned(blocking(&state, move |db| db.toggle_publish(id, user.id)).await?, "Video")?;
    Ok(ApiResponse::ok(PublishStatus { is_published }, "Publish status toggled successfully"))
}

pub async fn record_view(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<ApiResponse<ViewCount>, ApiError> {
    let id = parse_id(&video_id, "video")?;
    let views = blocking(&state, move |db| db.record_view(id, viewer.id()))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(ViewCount { views }, "View recorded"))
}

/// Absent stays absent; present-but-blank is an error.
fn optional_text(value: Option<&str>, name: &str) -> Result<Option<String>, ApiError> {
    match value {
        None => Ok(None),
        Some(v) => required(Some(v), name).map(|v| Some(v.to_string())),
    }
}
