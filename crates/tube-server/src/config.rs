use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: [&str; 3] = ["changeme", "change-me", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Cloudinary {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub cors_origins: Vec<String>,
    pub temp_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub public_url: String,
    /// Set only when all three Cloudinary variables are present.
    pub cloudinary: Option<Cloudinary>,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| {
            get(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| -> anyhow::Result<String> {
            let value = get(key).map(|v| v.trim().to_string()).unwrap_or_default();
            if value.is_empty() {
                bail!("{key} must be set");
            }
            if PLACEHOLDER_SECRETS.contains(&value.to_ascii_lowercase().as_str()) {
                bail!("{key} is still set to a placeholder value");
            }
            Ok(value)
        };

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME").filter(|v| !v.is_empty()),
            get("CLOUDINARY_API_KEY").filter(|v| !v.is_empty()),
            get("CLOUDINARY_API_SECRET").filter(|v| !v.is_empty()),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => {
                Some(Cloudinary { cloud_name, api_key, api_secret })
            }
            _ => None,
        };

        Ok(Self {
            host: var("TUBE_HOST", "0.0.0.0"),
            port: var("TUBE_PORT", "8000").parse().context("TUBE_PORT")?,
            db_path: PathBuf::from(var("TUBE_DB_PATH", "tube.db")),
            access_secret: secret("ACCESS_TOKEN_SECRET")?,
            refresh_secret: secret("REFRESH_TOKEN_SECRET")?,
            access_ttl_secs: var("ACCESS_TOKEN_TTL_SECS", "86400")
                .parse()
                .context("ACCESS_TOKEN_TTL_SECS")?,
            refresh_ttl_secs: var("REFRESH_TOKEN_TTL_SECS", "864000")
                .parse()
                .context("REFRESH_TOKEN_TTL_SECS")?,
            cors_origins: var("TUBE_CORS_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            temp_dir: PathBuf::from(var("TUBE_TEMP_DIR", "./public/temp")),
            asset_dir: PathBuf::from(var("TUBE_ASSET_DIR", "./public/assets")),
            public_url: var("TUBE_PUBLIC_URL", "http://localhost:8000"),
            cloudinary,
            request_timeout_secs: var("TUBE_REQUEST_TIMEOUT_SECS", "120")
                .parse()
                .context("TUBE_REQUEST_TIMEOUT_SECS")?,
            max_upload_bytes: var("TUBE_MAX_UPLOAD_BYTES", "536870912")
                .parse()
                .context("TUBE_MAX_UPLOAD_BYTES")?,
            cookie_secure: var("COOKIE_SECURE", "true")
                .parse()
                .context("COOKIE_SECURE must be true or false")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const SECRETS: [(&str, &str); 2] =
        [("ACCESS_TOKEN_SECRET", "a-secret"), ("REFRESH_TOKEN_SECRET", "r-secret")];

    #[test]
    fn defaults_apply() {
        let config = load(&SECRETS).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("tube.db"));
        assert_eq!(config.cors_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(config.access_ttl_secs, 86400);
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
        assert!(config.cookie_secure);
        assert!(config.cloudinary.is_none());
    }

    #[test]
    fn secrets_are_mandatory() {
        assert!(load(&[]).is_err());
        assert!(load(&[("ACCESS_TOKEN_SECRET", "x"), ("REFRESH_TOKEN_SECRET", "  ")]).is_err());
        assert!(
            load(&[("ACCESS_TOKEN_SECRET", "changeme"), ("REFRESH_TOKEN_SECRET", "r")]).is_err()
        );
    }

    #[test]
    fn cloudinary_needs_all_three() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("CLOUDINARY_CLOUD_NAME", "demo"));
        pairs.push(("CLOUDINARY_API_KEY", "key"));
        assert!(load(&pairs).unwrap().cloudinary.is_none());

        pairs.push(("CLOUDINARY_API_SECRET", "secret"));
        let cloudinary = load(&pairs).unwrap().cloudinary.unwrap();
        assert_eq!(cloudinary.cloud_name, "demo");
    }

    #[test]
    fn cors_origins_are_split() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("TUBE_CORS_ORIGINS", "https://a.test, https://b.test,"));
        let config = load(&pairs).unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
    }
}
