//! Where uploaded media ends up. Uploads consume a staged temp file and hand
//! back a public URL; the staged file is removed whether or not the upload
//! succeeded. Failures are logged and reported as `None` / `false`.

use std::path::{Path, PathBuf};

use reqwest::multipart::Part;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::upload::StagedFile;

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";
const CLOUDINARY_FOLDER: &str = "youtube/files";
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "webm", "avi", "mkv"];

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub url: String,
    /// Media duration in seconds, when the store can tell.
    pub duration: Option<f64>,
}

pub enum AssetStore {
    Disk(DiskStore),
    Cloudinary(CloudinaryStore),
}

impl AssetStore {
    pub async fn upload(&self, file: StagedFile) -> Option<StoredAsset> {
        let stored = match self {
            AssetStore::Disk(store) => store.upload(&file).await,
            AssetStore::Cloudinary(store) => store.upload(&file).await,
        };
        file.discard().await;
        stored
    }

    pub async fn delete(&self, url: &str) -> bool {
        match self {
            AssetStore::Disk(store) => store.delete(url).await,
            AssetStore::Cloudinary(store) => store.delete(url).await,
        }
    }

    /// Delete and log on failure. For cleanup after the owning record is
    /// already gone or replaced.
    pub async fn delete_quietly(&self, url: &str) {
        if !self.delete(url).await {
            warn!("Failed to delete asset {}", url);
        }
    }
}

// -- Disk --

/// Files live under `dir` and are served at `{public_url}/assets/{name}`.
pub struct DiskStore {
    dir: PathBuf,
    public_url: String,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn prefix(&self) -> String {
        format!("{}/assets/", self.public_url)
    }

    async fn upload(&self, file: &StagedFile) -> Option<StoredAsset> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Failed to create asset directory {}: {}", self.dir.display(), e);
            return None;
        }

        let name = match file.extension() {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let dest = self.dir.join(&name);

        // rename fails across filesystems; fall back to a copy.
        if tokio::fs::rename(file.path(), &dest).await.is_err() {
            if let Err(e) = tokio::fs::copy(file.path(), &dest).await {
                warn!("Failed to store {} as {}: {}", file.path().display(), dest.display(), e);
                return None;
            }
        }

        debug!("Stored asset {}", dest.display());
        Some(StoredAsset { url: format!("{}{}", self.prefix(), name), duration: None })
    }

    async fn delete(&self, url: &str) -> bool {
        let Some(name) = url.strip_prefix(&self.prefix()) else {
            return false;
        };
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return false;
        }
        tokio::fs::remove_file(self.dir.join(name)).await.is_ok()
    }
}

// -- Cloudinary --

pub struct CloudinaryStore {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
    secure_url: Option<String>,
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self { cloud_name, api_key, api_secret, client: reqwest::Client::new() }
    }

    /// Cloudinary request signature: SHA-1 of the sorted `k=v` pairs joined
    /// by `&`, followed by the API secret.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn upload(&self, file: &StagedFile) -> Option<StoredAsset> {
        let (part, len) = match streamed_part(file).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to open staged file {}: {}", file.path().display(), e);
                return None;
            }
        };
        debug!("Uploading {} ({} bytes) to Cloudinary", file.original_name(), len);

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", CLOUDINARY_FOLDER), ("timestamp", &timestamp)]);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", CLOUDINARY_FOLDER)
            .text("signature", signature);

        let url = format!("{}/{}/auto/upload", CLOUDINARY_API, self.cloud_name);
        let response = match self.client.post(&url).multipart(form).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Cloudinary upload rejected with {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("Cloudinary upload failed: {}", e);
                return None;
            }
        };

        match response.json::<UploadResponse>().await {
            Ok(body) => {
                info!("Uploaded {} to Cloudinary", file.original_name());
                Some(StoredAsset { url: body.secure_url.unwrap_or(body.url), duration: body.duration })
            }
            Err(e) => {
                warn!("Unreadable Cloudinary upload response: {}", e);
                None
            }
        }
    }

    async fn delete(&self, url: &str) -> bool {
        let Some(public_id) = public_id(url) else {
            warn!("Not a Cloudinary asset URL: {}", url);
            return false;
        };
        let resource_type = resource_type(url);

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);
        let form = reqwest::multipart::Form::new()
            .text("public_id", public_id.to_string())
            .text("timestamp", timestamp)
            .text("api_key", self.api_key.clone())
            .text("signature", signature);

        let endpoint = format!("{}/{}/{}/destroy", CLOUDINARY_API, self.cloud_name, resource_type);
        match self.client.post(&endpoint).multipart(form).send().await {
            Ok(r) => match r.json::<DestroyResponse>().await {
                Ok(body) => body.result == "ok",
                Err(e) => {
                    warn!("Unreadable Cloudinary destroy response: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Cloudinary destroy failed: {}", e);
                false
            }
        }
    }
}

/// Multipart part that streams the staged file from disk, with its length.
async fn streamed_part(file: &StagedFile) -> std::io::Result<(Part, u64)> {
    let handle = tokio::fs::File::open(file.path()).await?;
    let len = handle.metadata().await?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
    let part = Part::stream_with_length(body, len).file_name(file.original_name().to_string());
    Ok((part, len))
}

/// `.../upload/v123/folder/name.ext` -> `folder/name`. The version segment is
/// optional; a trailing extension is required.
fn public_id(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("/upload/")?;
    let rest = match rest.split_once('/') {
        Some((version, tail))
            if version.len() > 1
                && version.starts_with('v')
                && version[1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            tail
        }
        _ => rest,
    };

    let (id, ext) = rest.rsplit_once('.')?;
    let ext_ok = !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    (ext_ok && !id.is_empty()).then_some(id)
}

fn resource_type(url: &str) -> &'static str {
    let is_video = Path::new(url)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext));
    if is_video { "video" } else { "image" }
}
