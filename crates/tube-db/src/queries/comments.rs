use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tube_types::models::{Comment, CommentView};
use tube_types::paging::{PageRequest, Paginated};

use crate::Database;
use crate::models::{Guarded, OWNER_COLUMNS, owner_at, reaction_columns, uuid_at, viewer_param};

impl Database {
    /// Add a comment. Returns `None` if the video does not exist.
    pub fn add_comment(&self, video: Uuid, owner: Uuid, content: &str) -> Result<Option<Comment>> {
        self.with_tx(|tx| {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM videos WHERE id = ?1)",
                [video.to_string()],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(None);
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO comments (id, video_id, owner_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id.to_string(), video.to_string(), owner.to_string(), content, Utc::now()],
            )?;
            query_comment(tx, id)
        })
    }

    /// A page of a video's comments, newest first, with reaction totals and
    /// flags relative to `viewer`. `None` if the video is missing or is an
    /// unpublished video the viewer does not own.
    pub fn video_comments(
        &self,
        video: Uuid,
        viewer: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Option<Paginated<CommentView>>> {
        let vid = video.to_string();
        let viewer = viewer_param(viewer);

        self.with_conn(|conn| {
            let visible: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM videos
                               WHERE id = ?1 AND (is_published = 1 OR owner_id = ?2))",
                params![vid, viewer],
                |row| row.get(0),
            )?;
            if !visible {
                return Ok(None);
            }

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE video_id = ?1",
                [&vid],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT c.id, c.content, c.video_id, c.created_at, c.updated_at, {OWNER_COLUMNS},
                        {reactions},
                        COALESCE(c.owner_id = ?2, 0),
                        EXISTS(SELECT 1 FROM likes l
                               WHERE l.target_kind = 'comment' AND l.target_id = c.id
                                 AND l.liked = 1 AND l.liked_by = v.owner_id)
                 FROM comments c
                 JOIN videos v ON v.id = c.video_id
                 LEFT JOIN users u ON u.id = c.owner_id
                 WHERE c.video_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC
                 LIMIT ?3 OFFSET ?4",
                reactions = reaction_columns("comment", "c.id", "?2"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![vid, viewer, page.limit(), page.offset()], |row| {
                    Ok(CommentView {
                        id: uuid_at(row, 0)?,
                        content: row.get(1)?,
                        video: uuid_at(row, 2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                        owner: owner_at(row, 5)?,
                        total_likes: row.get(9)?,
                        total_dislikes: row.get(10)?,
                        is_liked: row.get(11)?,
                        is_disliked: row.get(12)?,
                        is_owner: row.get(13)?,
                        is_liked_by_video_owner: row.get(14)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some(Paginated::new(items, page, total)))
        })
    }

    pub fn update_comment(&self, id: Uuid, owner: Uuid, content: &str) -> Result<Guarded<Comment>> {
        self.with_tx(|tx| {
            let Some(comment) = query_comment(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if comment.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            tx.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), content, Utc::now()],
            )?;
            let updated = query_comment(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Comment {} vanished during update", id))?;
            Ok(Guarded::Applied(updated))
        })
    }

    /// Delete a comment and its likes. Returns how many likes went with it.
    pub fn delete_comment(&self, id: Uuid, owner: Uuid) -> Result<Guarded<usize>> {
        self.with_tx(|tx| {
            let Some(comment) = query_comment(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if comment.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            let cid = id.to_string();
            let likes = tx.execute(
                "DELETE FROM likes WHERE target_kind = 'comment' AND target_id = ?1",
                [&cid],
            )?;
            tx.execute("DELETE FROM comments WHERE id = ?1", [&cid])?;
            Ok(Guarded::Applied(likes))
        })
    }
}

fn query_comment(conn: &Connection, id: Uuid) -> Result<Option<Comment>> {
    let row = conn
        .query_row(
            "SELECT id, content, video_id, owner_id, created_at, updated_at
             FROM comments WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(Comment {
                    id: uuid_at(row, 0)?,
                    content: row.get(1)?,
                    video: uuid_at(row, 2)?,
                    owner: uuid_at(row, 3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
