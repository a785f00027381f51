use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use tube_db::Database;

use crate::assets::AssetStore;
use crate::auth::TokenSettings;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenSettings,
    pub assets: AssetStore,
    /// Multipart files are staged here before they reach the asset store.
    pub temp_dir: PathBuf,
    /// `Secure` attribute on the token cookies.
    pub cookie_secure: bool,
}

/// Run a blocking DB call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::Internal)
}
