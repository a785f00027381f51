use axum::{
    Extension,
    extract::{Path, State},
};

use tube_types::api::PlaylistRequest;
use tube_types::models::{Playlist, PlaylistSummary, PlaylistView, SavePlaylistEntry, User};

use crate::error::{ApiError, owned, parse_id, required};
use crate::extract::JsonBody;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};

pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<PlaylistRequest>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let name = required(req.name.as_deref(), "name")?.to_string();
    let description = req.description.map(|d| d.trim().to_string()).unwrap_or_default();

    let playlist =
        blocking(&state, move |db| db.create_playlist(user.id, &name, &description)).await?;
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<PlaylistView>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;
    let playlist = blocking(&state, move |db| db.playlist_view(id, Some(user.id)))
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

pub async fn update_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<PlaylistRequest>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;
    let name = match req.name.as_deref() {
        Some(raw) => Some(required(Some(raw), "name")?.to_string()),
        None => None,
    };
    let description = req.description.map(|d| d.trim().to_string());
    if name.is_none() && description.is_none() {
        return Err(ApiError::invalid("Provide a name or description to update"));
    }

    let playlist = owned(
        blocking(&state, move |db| {
            db.update_playlist(id, user.id, name.as_deref(), description.as_deref())
        })
        .await?,
        "Playlist",
    )?;
    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let id = parse_id(&playlist_id, "playlist")?;
    owned(blocking(&state, move |db| db.delete_playlist(id, user.id)).await?, "Playlist")?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Playlist deleted successfully"))
}

pub async fn add_video(
    State(state): State<AppState>,
    Path((playlist_id, video_id)): Path<(String, String)>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let playlist = parse_id(&playlist_id, "playlist")?;
    let video = parse_id(&video_id, "video")?;

    let updated = owned(
        blocking(&state, move |db| db.add_video_to_playlist(playlist, video, user.id)).await?,
        "Playlist",
    )?
    .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(updated, "Video added to playlist"))
}

pub async fn remove_video(
    State(state): State<AppState>,
    Path((playlist_id, video_id)): Path<(String, String)>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Playlist>, ApiError> {
    let playlist = parse_id(&playlist_id, "playlist")?;
    let video = parse_id(&video_id, "video")?;

    let updated = owned(
        blocking(&state, move |db| db.remove_video_from_playlist(playlist, video, user.id))
            .await?,
        "Playlist",
    )?;
    Ok(ApiResponse::ok(updated, "Video removed from playlist"))
}

pub async fn user_playlists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<Vec<PlaylistSummary>>, ApiError> {
    let owner = parse_id(&user_id, "user")?;
    let playlists = blocking(&state, move |db| db.user_playlists(owner)).await?;
    Ok(ApiResponse::ok(playlists, "User playlists fetched successfully"))
}

/// The caller's playlists, each flagged if it already holds the video.
pub async fn save_targets(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Vec<SavePlaylistEntry>>, ApiError> {
    let video = parse_id(&video_id, "video")?;
    let targets = blocking(&state, move |db| {
        if db.get_video(video)?.is_none() {
            return Ok(None);
        }
        db.save_targets(user.id, video).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Video not found"))?;
    Ok(ApiResponse::ok(targets, "Playlists fetched successfully"))
}
