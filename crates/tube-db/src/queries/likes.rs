use anyhow::{Result, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use tube_types::like::{LikeAction, LikeSummary, LikeTarget, Reaction, ReactionEffect};
use tube_types::models::VideoCard;

use crate::Database;
use crate::models::{OWNER_COLUMNS, VIDEO_BASE_COLUMNS};
use crate::queries::videos::video_card;

impl Database {
    /// Apply a like/dislike request for `user` on `target`.
    ///
    /// The lookup, the branch and the write happen in one IMMEDIATE
    /// transaction, so concurrent toggles on the same pair serialize and the
    /// `(target, user)` row stays unique. Returns `None` if the target does
    /// not exist.
    pub fn toggle_like(
        &self,
        target: LikeTarget,
        user: Uuid,
        action: LikeAction,
    ) -> Result<Option<LikeSummary>> {
        self.with_tx(|tx| {
            if !target_exists(tx, target)? {
                return Ok(None);
            }

            let kind = target.kind.as_str();
            let target_id = target.id.to_string();
            let user_id = user.to_string();

            let existing: Option<(String, bool)> = tx
                .query_row(
                    "SELECT id, liked FROM likes
                     WHERE target_kind = ?1 AND target_id = ?2 AND liked_by = ?3",
                    params![kind, target_id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let current = Reaction::from_row(existing.as_ref().map(|(_, liked)| *liked));
            let (next, effect) = current.apply(action);
            let now = Utc::now();

            match (effect, existing) {
                (ReactionEffect::Insert { liked }, _) => {
                    tx.execute(
                        "INSERT INTO likes (id, target_kind, target_id, liked_by, liked, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![Uuid::new_v4().to_string(), kind, target_id, user_id, liked, now],
                    )?;
                }
                (ReactionEffect::Delete, Some((like_id, _))) => {
                    tx.execute("DELETE FROM likes WHERE id = ?1", [like_id])?;
                }
                (ReactionEffect::Set { liked }, Some((like_id, _))) => {
                    tx.execute(
                        "UPDATE likes SET liked = ?2, updated_at = ?3 WHERE id = ?1",
                        params![like_id, liked, now],
                    )?;
                }
                (effect, None) => bail!("reaction effect {:?} requires an existing like row", effect),
            }

            let (total_likes, total_dislikes) = query_like_counts(tx, target)?;
            debug!(
                "{} {} reaction by {}: {:?} -> {:?}",
                target.kind, target.id, user, current, next
            );
            Ok(Some(LikeSummary::new(next, total_likes, total_dislikes)))
        })
    }

    /// `(likes, dislikes)` currently recorded against a target.
    pub fn like_counts(&self, target: LikeTarget) -> Result<(i64, i64)> {
        self.with_conn(|conn| query_like_counts(conn, target))
    }

    /// Published videos the user liked, most recently liked first.
    pub fn liked_videos(&self, user: Uuid) -> Result<Vec<VideoCard>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}
                 FROM likes l
                 JOIN videos v ON v.id = l.target_id
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE l.target_kind = 'video' AND l.liked_by = ?1 AND l.liked = 1
                   AND v.is_published = 1
                 ORDER BY l.created_at DESC, l.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user.to_string()], video_card)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn target_exists(conn: &Connection, target: LikeTarget) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", target.kind.table());
    let exists = conn.query_row(&sql, [target.id.to_string()], |row| row.get(0))?;
    Ok(exists)
}

pub(crate) fn query_like_counts(conn: &Connection, target: LikeTarget) -> Result<(i64, i64)> {
    let counts = conn.query_row(
        "SELECT COALESCE(SUM(liked = 1), 0), COALESCE(SUM(liked = 0), 0)
         FROM likes WHERE target_kind = ?1 AND target_id = ?2",
        params![target.kind.as_str(), target.id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}
