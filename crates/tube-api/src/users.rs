use axum::{
    Extension,
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info};

use tube_db::queries::{AccountUpdate, NewUser};
use tube_types::api::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, TokenPair,
    UpdateAccountRequest,
};
use tube_types::models::{ChannelProfile, User, VideoCard};

use crate::auth::{self, REFRESH_COOKIE};
use crate::error::{ApiError, required};
use crate::extract::JsonBody;
use crate::middleware::Viewer;
use crate::response::ApiResponse;
use crate::state::{AppState, blocking};
use crate::upload::read_multipart;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = read_multipart(&state.temp_dir, multipart, &["avatar", "coverImage"]).await?;

    let all_required = || ApiError::invalid("All fields are required");
    let full_name = required(form.text("fullName"), "fullName").map_err(|_| all_required())?;
    let email = required(form.text("email"), "email").map_err(|_| all_required())?;
    let username = required(form.text("username"), "username").map_err(|_| all_required())?;
    let password = required(form.text("password"), "password").map_err(|_| all_required())?;
    check_email(email)?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let full_name = full_name.to_string();
    let email = email.to_string();
    let username = username.to_lowercase();
    let password = password.to_string();

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::invalid("Avatar file is required"))?;
    let cover_file = form.take_file("coverImage");

    let password_hash = hash_off_thread(password).await?;

    let avatar = state
        .assets
        .upload(avatar_file)
        .await
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("avatar upload failed")))?;
    let cover = match cover_file {
        Some(file) => state.assets.upload(file).await,
        None => None,
    };

    let avatar_url = avatar.url.clone();
    let cover_url = cover.as_ref().map(|c| c.url.clone());
    let created = blocking(&state, move |db| {
        db.create_user(&NewUser {
            username: &username,
            email: &email,
            full_name: &full_name,
            password_hash: &password_hash,
            avatar: &avatar_url,
            cover_image: cover_url.as_deref(),
        })
    })
    .await
    .and_then(|created| {
        created.ok_or_else(|| {
            ApiError::Conflict("User with email or username already exists".into())
        })
    });

    let user = match created {
        Ok(user) => user,
        Err(e) => {
            state.assets.delete_quietly(&avatar.url).await;
            if let Some(cover) = cover {
                state.assets.delete_quietly(&cover.url).await;
            }
            return Err(e);
        }
    };

    info!("Registered user {} ({})", user.username, user.id);
    Ok(ApiResponse::created(user.into_public(), "User registered successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let email = req.email.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if username.is_none() && email.is_none() {
        return Err(ApiError::invalid("username or email is required"));
    }

    let username = username.map(str::to_lowercase);
    let email = email.map(str::to_string);
    let row = blocking(&state, move |db| {
        db.get_user_by_login(username.as_deref(), email.as_deref())
    })
    .await?
    .ok_or_else(|| ApiError::Unauthorized("Invalid user credentials".into()))?;

    if !verify_off_thread(req.password, row.password.clone()).await? {
        return Err(ApiError::Unauthorized("Invalid user credentials".into()));
    }

    let user = row.into_public();
    let tokens = issue_tokens(&state, &user).await?;
    let jar = auth::with_token_cookies(
        jar,
        &tokens.access_token,
        &tokens.refresh_token,
        state.cookie_secure,
    );

    info!("User {} logged in", user.username);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| db.set_refresh_token(user.id, None)).await?;
    Ok((auth::without_token_cookies(jar), ApiResponse::ok(serde_json::json!({}), "User logged out")))
}

/// Rotate the refresh token. The presented token must be the one currently
/// stored for the user; a used or superseded token is rejected.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = if body.is_empty() {
        RefreshRequest::default()
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ApiError::invalid(format!("Malformed body: {e}")))?
    };
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(from_body.refresh_token)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".into()))?;

    let claims = state.tokens.verify_refresh(&presented)?;
    let user = blocking(&state, move |db| db.get_user_by_id(claims.sub))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".into()))?
        .into_public();

    let access_token = state.tokens.issue_access(&user)?;
    let next = state.tokens.issue_refresh(user.id)?;
    let next_stored = next.clone();
    let rotated = blocking(&state, move |db| {
        db.rotate_refresh_token(user.id, &presented, &next_stored)
    })
    .await?;
    if !rotated {
        return Err(ApiError::Unauthorized("Refresh token is expired or used".into()));
    }

    let jar = auth::with_token_cookies(jar, &access_token, &next, state.cookie_secure);
    Ok((
        jar,
        ApiResponse::ok(TokenPair { access_token, refresh_token: next }, "Access token refreshed"),
    ))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    if req.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let row = blocking(&state, move |db| db.get_user_by_id(user.id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid access token".into()))?;
    if !verify_off_thread(req.old_password, row.password).await? {
        return Err(ApiError::invalid("Invalid old password"));
    }

    let hash = hash_off_thread(req.new_password).await?;
    blocking(&state, move |db| db.update_password(row.id, &hash)).await?;
    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

pub async fn current_user(Extension(user): Extension<User>) -> ApiResponse<User> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    JsonBody(req): JsonBody<UpdateAccountRequest>,
) -> Result<ApiResponse<User>, ApiError> {
    let all_required = || ApiError::invalid("All fields are required");
    let full_name = required(req.full_name.as_deref(), "fullName")
        .map_err(|_| all_required())?
        .to_string();
    let email = required(req.email.as_deref(), "email").map_err(|_| all_required())?.to_string();
    check_email(&email)?;

    match blocking(&state, move |db| db.update_account(user.id, &full_name, &email)).await? {
        AccountUpdate::Updated(row) => {
            Ok(ApiResponse::ok(row.into_public(), "Account details updated successfully"))
        }
        AccountUpdate::EmailTaken => Err(ApiError::Conflict("Email is already in use".into())),
        AccountUpdate::Missing => Err(ApiError::Unauthorized("Invalid access token".into())),
    }
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = read_multipart(&state.temp_dir, multipart, &["avatar"]).await?;
    let file = form.take_file("avatar").ok_or_else(|| ApiError::invalid("Avatar file is missing"))?;
    let stored = state
        .assets
        .upload(file)
        .await
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("avatar upload failed")))?;

    let url = stored.url.clone();
    let Some((row, previous)) = blocking(&state, move |db| db.update_avatar(user.id, &url)).await?
    else {
        state.assets.delete_quietly(&stored.url).await;
        return Err(ApiError::Unauthorized("Invalid access token".into()));
    };

    state.assets.delete_quietly(&previous).await;
    Ok(ApiResponse::ok(row.into_public(), "Avatar image updated successfully"))
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = read_multipart(&state.temp_dir, multipart, &["coverImage"]).await?;
    let file = form
        .take_file("coverImage")
        .ok_or_else(|| ApiError::invalid("Cover image file is missing"))?;
    let stored = state
        .assets
        .upload(file)
        .await
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("cover image upload failed")))?;

    let url = stored.url.clone();
    let Some((row, previous)) =
        blocking(&state, move |db| db.update_cover_image(user.id, &url)).await?
    else {
        state.assets.delete_quietly(&stored.url).await;
        return Err(ApiError::Unauthorized("Invalid access token".into()));
    };

    if let Some(previous) = previous {
        state.assets.delete_quietly(&previous).await;
    }
    Ok(ApiResponse::ok(row.into_public(), "Cover image updated successfully"))
}

pub async fn channel_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<ApiResponse<ChannelProfile>, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::invalid("username is missing"));
    }

    let profile = blocking(&state, move |db| db.channel_profile(&username, viewer.id()))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<ApiResponse<Vec<VideoCard>>, ApiError> {
    let history = blocking(&state, move |db| db.watch_history(user.id)).await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}

fn check_email(email: &str) -> Result<(), ApiError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::invalid("Email is not valid")),
    }
}

async fn issue_tokens(state: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let access_token = state.tokens.issue_access(user)?;
    let refresh_token = state.tokens.issue_refresh(user.id)?;

    let id = user.id;
    let stored = refresh_token.clone();
    blocking(state, move |db| db.set_refresh_token(id, Some(&stored))).await?;
    Ok(TokenPair { access_token, refresh_token })
}

// Argon2 work runs on the blocking pool.
async fn hash_off_thread(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("password hashing task failed"))
        })?
        .map_err(ApiError::Internal)
}

async fn verify_off_thread(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("password check task failed"))
        })?
        .map_err(ApiError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_needs_both_sides_of_the_at() {
        assert!(check_email("alice@example.com").is_ok());
        assert!(check_email("alice").is_err());
        assert!(check_email("@example.com").is_err());
        assert!(check_email("alice@").is_err());
    }
}
