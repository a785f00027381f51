use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::MultipartRejection;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// A request file written to the temp directory. Removed on drop unless it
/// was already consumed.
pub struct StagedFile {
    path: PathBuf,
    original_name: String,
    removed: bool,
}

impl StagedFile {
    #[cfg(test)]
    pub(crate) async fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let (staged, mut file) = Self::create(dir, original_name).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(staged)
    }

    async fn create(dir: &Path, original_name: &str) -> std::io::Result<(Self, tokio::fs::File)> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}-{}", Uuid::new_v4(), sanitize(original_name)));
        let file = tokio::fs::File::create(&path).await?;
        Ok((
            Self { path, original_name: original_name.to_string(), removed: false },
            file,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.bytes().all(|b| b.is_ascii_alphanumeric()))
    }

    /// Remove the staged file if it is still there.
    pub async fn discard(mut self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staged file {}: {}", self.path.display(), e);
            }
        }
        self.removed = true;
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() { "upload".to_string() } else { trimmed.to_string() }
}

/// Text fields and staged files from a multipart body.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

/// Drain a multipart body. Parts named in `file_fields` are streamed to
/// `temp_dir`, at most one per name; empty files count as absent. Any other
/// part carrying a filename is rejected.
pub async fn read_multipart(
    temp_dir: &Path,
    multipart: Result<Multipart, MultipartRejection>,
    file_fields: &[&str],
) -> Result<MultipartForm, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let mut form = MultipartForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
            form.fields.insert(name, value);
            continue;
        };

        if !file_fields.contains(&name.as_str()) {
            return Err(ApiError::InvalidInput(format!("Unexpected file field '{name}'")));
        }
        if form.files.contains_key(&name) {
            return Err(ApiError::InvalidInput(format!("Only one '{name}' file is allowed")));
        }

        let (staged, mut file) = StagedFile::create(temp_dir, &file_name).await.map_err(|e| {
            error!("Failed to stage upload in {}: {}", temp_dir.display(), e);
            ApiError::Internal(e.into())
        })?;

        let mut written = 0usize;
        while let Some(chunk) =
            field.chunk().await.map_err(|e| ApiError::InvalidInput(e.body_text()))?
        {
            written += chunk.len();
            file.write_all(&chunk).await.map_err(|e| ApiError::Internal(e.into()))?;
        }
        file.flush().await.map_err(|e| ApiError::Internal(e.into()))?;

        if written > 0 {
            form.files.insert(name, staged);
        }
    }

    Ok(form)
}
