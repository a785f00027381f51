use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tube_types::models::{ChannelProfile, VideoCard};

use crate::Database;
use crate::models::{
    OWNER_COLUMNS, UserRow, VIDEO_BASE_COLUMNS, VIDEO_BASE_WIDTH, owner_at, uuid_at, video_base_at,
    viewer_param,
};

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
    pub avatar: &'a str,
    pub cover_image: Option<&'a str>,
}

pub enum AccountUpdate {
    Updated(UserRow),
    EmailTaken,
    Missing,
}

impl Database {
    /// Insert a user unless the username or email is already taken.
    /// Returns `None` on a clash.
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<Option<UserRow>> {
        self.with_tx(|tx| {
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 OR email = ?2)",
                params![new.username, new.email],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(None);
            }

            let id = Uuid::new_v4();
            let now = Utc::now();
            tx.execute(
                "INSERT INTO users (id, username, email, full_name, password, avatar, cover_image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id.to_string(),
                    new.username,
                    new.email,
                    new.full_name,
                    new.password_hash,
                    new.avatar,
                    new.cover_image,
                    now,
                ],
            )?;

            query_user_by_id(tx, id)
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Look a user up by username or email, whichever the caller supplied.
    pub fn get_user_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                UserRow::COLUMNS
            );
            let row = conn
                .query_row(&sql, params![username, email], UserRow::from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Overwrite the single active refresh token (or clear it on logout).
    pub fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
                params![id.to_string(), token],
            )?;
            Ok(())
        })
    }

    /// Compare-and-swap rotation: only succeeds while `current` is still the
    /// stored token, so a refresh token can be used once.
    pub fn rotate_refresh_token(&self, id: Uuid, current: &str, next: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3 WHERE id = ?1 AND refresh_token = ?2",
                params![id.to_string(), current, next],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), password_hash, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn update_account(&self, id: Uuid, full_name: &str, email: &str) -> Result<AccountUpdate> {
        self.with_tx(|tx| {
            let clash: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?2 AND id != ?1)",
                params![id.to_string(), email],
                |row| row.get(0),
            )?;
            if clash {
                return Ok(AccountUpdate::EmailTaken);
            }

            let changed = tx.execute(
                "UPDATE users SET full_name = ?2, email = ?3, updated_at = ?4 WHERE id = ?1",
                params![id.to_string(), full_name, email, Utc::now()],
            )?;
            if changed == 0 {
                return Ok(AccountUpdate::Missing);
            }

            Ok(query_user_by_id(tx, id)?
                .map(AccountUpdate::Updated)
                .unwrap_or(AccountUpdate::Missing))
        })
    }

    /// Swap the avatar URL. Returns the updated user and the URL it replaced.
    pub fn update_avatar(&self, id: Uuid, url: &str) -> Result<Option<(UserRow, String)>> {
        self.with_tx(|tx| {
            let Some(previous) = query_user_by_id(tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), url, Utc::now()],
            )?;
            Ok(query_user_by_id(tx, id)?.map(|user| (user, previous.avatar)))
        })
    }

    /// Swap the cover image URL. Returns the updated user and the URL it
    /// replaced, if there was one.
    pub fn update_cover_image(
        &self,
        id: Uuid,
        url: &str,
    ) -> Result<Option<(UserRow, Option<String>)>> {
        self.with_tx(|tx| {
            let Some(previous) = query_user_by_id(tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE users SET cover_image = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), url, Utc::now()],
            )?;
            Ok(query_user_by_id(tx, id)?.map(|user| (user, previous.cover_image)))
        })
    }

    pub fn channel_profile(
        &self,
        username: &str,
        viewer: Option<Uuid>,
    ) -> Result<Option<ChannelProfile>> {
        self.with_conn(|conn| {
            let profile = conn
                .query_row(
                    "SELECT u.id, u.username, u.full_name, u.email, u.avatar, u.cover_image,
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id),
                            EXISTS(SELECT 1 FROM subscriptions s
                                   WHERE s.channel_id = u.id AND s.subscriber_id = ?2)
                     FROM users u
                     WHERE u.username = ?1",
                    params![username, viewer_param(viewer)],
                    |row| {
                        Ok(ChannelProfile {
                            id: uuid_at(row, 0)?,
                            username: row.get(1)?,
                            full_name: row.get(2)?,
                            email: row.get(3)?,
                            avatar: row.get(4)?,
                            cover_image: row.get(5)?,
                            subscribers_count: row.get(6)?,
                            channels_subscribed_to_count: row.get(7)?,
                            is_subscribed: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
    }

    /// Videos the user has viewed, in the order the views were recorded.
    pub fn watch_history(&self, user_id: Uuid) -> Result<Vec<VideoCard>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}
                 FROM watch_history h
                 JOIN videos v ON v.id = h.video_id
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE h.user_id = ?1
                 ORDER BY h.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(VideoCard {
                        base: video_base_at(row, 0)?,
                        owner: owner_at(row, VIDEO_BASE_WIDTH)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", UserRow::COLUMNS);
    let row = conn
        .query_row(&sql, [id.to_string()], UserRow::from_row)
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn duplicate_username_or_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");

        let clash = NewUser {
            username: "alice",
            email: "other@example.com",
            full_name: "Alice Again",
            password_hash: "x",
            avatar: "a.png",
            cover_image: None,
        };
        assert!(db.create_user(&clash).unwrap().is_none());

        let clash = NewUser {
            username: "someone",
            email: "ALICE@example.com",
            ..clash
        };
        assert!(db.create_user(&clash).unwrap().is_none());
    }

    #[test]
    fn refresh_token_rotates_once() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "bob");

        db.set_refresh_token(id, Some("first")).unwrap();
        assert!(db.rotate_refresh_token(id, "first", "second").unwrap());
        assert!(!db.rotate_refresh_token(id, "first", "third").unwrap());

        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(row.refresh_token.as_deref(), Some("second"));

        db.set_refresh_token(id, None).unwrap();
        assert!(!db.rotate_refresh_token(id, "second", "fourth").unwrap());
    }

    #[test]
    fn channel_profile_counts_and_flag() {
        let db = Database::open_in_memory().unwrap();
        let carol = fixtures::user(&db, "carol");
        let dave = fixtures::user(&db, "dave");
        db.toggle_subscription(carol, dave).unwrap();

        let anon = db.channel_profile("carol", None).unwrap().unwrap();
        assert_eq!(anon.subscribers_count, 1);
        assert_eq!(anon.channels_subscribed_to_count, 0);
        assert!(!anon.is_subscribed);

        let as_dave = db.channel_profile("carol", Some(dave)).unwrap().unwrap();
        assert!(as_dave.is_subscribed);

        assert!(db.channel_profile("nobody", None).unwrap().is_none());
    }

    #[test]
    fn watch_history_keeps_view_order() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "erin");
        let viewer = fixtures::user(&db, "frank");
        let first = fixtures::video(&db, owner, "first");
        let second = fixtures::video(&db, owner, "second");

        db.record_view(second, Some(viewer)).unwrap();
        db.record_view(first, Some(viewer)).unwrap();

        let history = db.watch_history(viewer).unwrap();
        let ids: Vec<Uuid> = history.iter().map(|v| v.base.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(history[0].owner.as_ref().unwrap().username, "erin");
    }
}
