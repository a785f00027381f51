/// Database row types and the column/row helpers shared by the query modules.
/// Anything that carries credentials stays in this crate; everything else maps
/// straight onto tube-types view models.
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use tube_types::models::{OwnerSnippet, User, VideoBase};

pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str = "id, username, email, full_name, password, avatar, \
         cover_image, refresh_token, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            full_name: row.get(3)?,
            password: row.get(4)?,
            avatar: row.get(5)?,
            cover_image: row.get(6)?,
            refresh_token: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Public projection without password hash or refresh token.
    pub fn into_public(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            avatar: self.avatar,
            cover_image: self.cover_image,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Outcome of a mutation that is only allowed for the owning user.
#[derive(Debug, PartialEq)]
pub enum Guarded<T> {
    Applied(T),
    NotFound,
    Forbidden,
}

impl<T> Guarded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Guarded<U> {
        match self {
            Guarded::Applied(v) => Guarded::Applied(f(v)),
            Guarded::NotFound => Guarded::NotFound,
            Guarded::Forbidden => Guarded::Forbidden,
        }
    }
}

/// Rows removed while deleting a video and everything hanging off it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub video_likes: usize,
    pub comments: usize,
    pub comment_likes: usize,
    pub playlist_refs: usize,
    pub history_refs: usize,
}

// -- Column helpers --

pub(crate) const VIDEO_BASE_COLUMNS: &str = "v.id, v.title, v.description, v.video_file, \
     v.thumbnail, v.duration, v.views, v.is_published, v.created_at, v.updated_at";
pub(crate) const VIDEO_BASE_WIDTH: usize = 10;

pub(crate) const OWNER_COLUMNS: &str = "u.id, u.username, u.full_name, u.avatar";
pub(crate) const OWNER_WIDTH: usize = 4;

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => Uuid::parse_str(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
    }
}

pub(crate) fn video_base_at(row: &Row<'_>, at: usize) -> rusqlite::Result<VideoBase> {
    Ok(VideoBase {
        id: uuid_at(row, at)?,
        title: row.get(at + 1)?,
        description: row.get(at + 2)?,
        video_file: row.get(at + 3)?,
        thumbnail: row.get(at + 4)?,
        duration: row.get(at + 5)?,
        views: row.get(at + 6)?,
        is_published: row.get(at + 7)?,
        created_at: row.get(at + 8)?,
        updated_at: row.get(at + 9)?,
    })
}

/// A left-joined owner. All-NULL columns mean the owner row is gone.
pub(crate) fn owner_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Option<OwnerSnippet>> {
    let Some(id) = opt_uuid_at(row, at)? else {
        return Ok(None);
    };
    Ok(Some(OwnerSnippet {
        id,
        username: row.get(at + 1)?,
        full_name: row.get(at + 2)?,
        avatar: row.get(at + 3)?,
    }))
}

/// Four columns: like count, dislike count, viewer liked, viewer disliked.
/// `kind`, `id_expr` and `viewer` are SQL fragments from this crate only.
pub(crate) fn reaction_columns(kind: &str, id_expr: &str, viewer: &str) -> String {
    format!(
        "(SELECT COUNT(*) FROM likes l
          WHERE l.target_kind = '{kind}' AND l.target_id = {id_expr} AND l.liked = 1),
         (SELECT COUNT(*) FROM likes l
          WHERE l.target_kind = '{kind}' AND l.target_id = {id_expr} AND l.liked = 0),
         EXISTS(SELECT 1 FROM likes l
                WHERE l.target_kind = '{kind}' AND l.target_id = {id_expr}
                  AND l.liked_by = {viewer} AND l.liked = 1),
         EXISTS(SELECT 1 FROM likes l
                WHERE l.target_kind = '{kind}' AND l.target_id = {id_expr}
                  AND l.liked_by = {viewer} AND l.liked = 0)"
    )
}

/// Viewer id as a bind parameter. `NULL` never equals anything in SQL, so
/// every membership test against it comes out false for anonymous callers.
pub(crate) fn viewer_param(viewer: Option<Uuid>) -> Option<String> {
    viewer.map(|v| v.to_string())
}

/// Escape `%`, `_` and `\` so caller text matches literally under
/// `LIKE ... ESCAPE '\'`.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
