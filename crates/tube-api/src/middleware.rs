use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use tube_types::models::User;

use crate::auth::ACCESS_COOKIE;
use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Principal for routes that work signed in or not. Always present in the
/// request extensions of routes behind [`optional_auth`].
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(|u| u.id)
    }
}

/// Reject the request unless it carries a valid access token for a user that
/// still exists. Inserts the [`User`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = access_token(&jar, req.headers())
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".into()))?;
    let user = resolve_user(&state, &token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Resolve the caller when a valid token is present, otherwise continue
/// anonymously. Inserts a [`Viewer`] either way.
pub async fn optional_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let viewer = match access_token(&jar, req.headers()) {
        Some(token) => match resolve_user(&state, &token).await {
            Ok(user) => Viewer(Some(user)),
            Err(e) => {
                debug!("Ignoring unusable access token: {}", e);
                Viewer(None)
            }
        },
        None => Viewer(None),
    };

    req.extensions_mut().insert(viewer);
    next.run(req).await
}

fn access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn resolve_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.tokens.verify_access(token)?;
    blocking(state, move |db| db.get_user_by_id(claims.sub))
        .await?
        .map(|row| row.into_public())
        .ok_or_else(|| ApiError::Unauthorized("Invalid access token".into()))
}
