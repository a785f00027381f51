use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use tube_types::api::{Claims, RefreshClaims};
use tube_types::models::User;

use crate::error::ApiError;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Signing secrets and lifetimes for the two token kinds.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl TokenSettings {
    pub fn issue_access(&self, user: &User) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            exp: expiry(self.access_ttl_secs),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        let claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            exp: expiry(self.refresh_ttl_secs),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized("Invalid access token".into()))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token".into()))
    }
}

fn expiry(ttl_secs: i64) -> usize {
    (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs)).timestamp() as usize
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored hash is malformed: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Set both token cookies. `httpOnly`, path `/`.
pub fn with_token_cookies(jar: CookieJar, access: &str, refresh: &str, secure: bool) -> CookieJar {
    jar.add(token_cookie(ACCESS_COOKIE, access.to_string(), secure))
        .add(token_cookie(REFRESH_COOKIE, refresh.to_string(), secure))
}

pub fn without_token_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

fn token_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    // Browsers drop SameSite=None cookies that are not Secure.
    let same_site = if secure { SameSite::None } else { SameSite::Lax };
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/")
        .build()
}
