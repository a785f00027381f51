use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tube_types::models::{Tweet, TweetView};
use tube_types::paging::{PageRequest, Paginated};

use crate::Database;
use crate::models::{Guarded, OWNER_COLUMNS, owner_at, reaction_columns, uuid_at, viewer_param};

impl Database {
    pub fn create_tweet(&self, owner: Uuid, content: &str) -> Result<Tweet> {
        self.with_tx(|tx| {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO tweets (id, owner_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.to_string(), owner.to_string(), content, Utc::now()],
            )?;
            query_tweet(tx, id)?.ok_or_else(|| anyhow::anyhow!("Tweet {} vanished after insert", id))
        })
    }

    /// Newest-first tweet feed, optionally narrowed to one author.
    pub fn list_tweets(
        &self,
        author: Option<Uuid>,
        viewer: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Paginated<TweetView>> {
        let author = author.map(|a| a.to_string());
        let viewer = viewer_param(viewer);

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tweets t WHERE (?1 IS NULL OR t.owner_id = ?1)",
                [&author],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT t.id, t.content, t.created_at, t.updated_at, {OWNER_COLUMNS},
                        {reactions},
                        COALESCE(t.owner_id = ?2, 0)
                 FROM tweets t
                 LEFT JOIN users u ON u.id = t.owner_id
                 WHERE (?1 IS NULL OR t.owner_id = ?1)
                 ORDER BY t.created_at DESC, t.rowid DESC
                 LIMIT ?3 OFFSET ?4",
                reactions = reaction_columns("tweet", "t.id", "?2"),
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params![author, viewer, page.limit(), page.offset()], |row| {
                    Ok(TweetView {
                        id: uuid_at(row, 0)?,
                        content: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                        owner: owner_at(row, 4)?,
                        total_likes: row.get(8)?,
                        total_dislikes: row.get(9)?,
                        is_liked: row.get(10)?,
                        is_disliked: row.get(11)?,
                        is_owner: row.get(12)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Paginated::new(items, page, total))
        })
    }

    pub fn update_tweet(&self, id: Uuid, owner: Uuid, content: &str) -> Result<Guarded<Tweet>> {
        self.with_tx(|tx| {
            let Some(tweet) = query_tweet(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if tweet.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            tx.execute(
                "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), content, Utc::now()],
            )?;
            let updated = query_tweet(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Tweet {} vanished during update", id))?;
            Ok(Guarded::Applied(updated))
        })
    }

    /// Delete a tweet along with the likes pointing at it.
    pub fn delete_tweet(&self, id: Uuid, owner: Uuid) -> Result<Guarded<usize>> {
        self.with_tx(|tx| {
            let Some(tweet) = query_tweet(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if tweet.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            let tid = id.to_string();
            let likes = tx.execute(
                "DELETE FROM likes WHERE target_kind = 'tweet' AND target_id = ?1",
                [&tid],
            )?;
            tx.execute("DELETE FROM tweets WHERE id = ?1", [&tid])?;
            Ok(Guarded::Applied(likes))
        })
    }
}

fn query_tweet(conn: &Connection, id: Uuid) -> Result<Option<Tweet>> {
    let row = conn
        .query_row(
            "SELECT id, content, owner_id, created_at, updated_at FROM tweets WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(Tweet {
                    id: uuid_at(row, 0)?,
                    content: row.get(1)?,
                    owner: uuid_at(row, 2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
