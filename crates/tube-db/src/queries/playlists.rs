use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tube_types::models::{Playlist, PlaylistSummary, PlaylistView, SavePlaylistEntry};

use crate::Database;
use crate::models::{Guarded, OWNER_COLUMNS, VIDEO_BASE_COLUMNS, owner_at, uuid_at, viewer_param};
use crate::queries::videos::video_card;

impl Database {
    pub fn create_playlist(&self, owner: Uuid, name: &str, description: &str) -> Result<Playlist> {
        self.with_tx(|tx| {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO playlists (id, owner_id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id.to_string(), owner.to_string(), name, description, Utc::now()],
            )?;
            query_playlist(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Playlist {} vanished after insert", id))
        })
    }

    /// The stored playlist with its video ids in insertion order.
    pub fn get_playlist_record(&self, id: Uuid) -> Result<Option<Playlist>> {
        self.with_conn(|conn| query_playlist(conn, id))
    }

    /// Materialized playlist: owner snippet plus ordered video cards. Only
    /// videos that are published or owned by `viewer` are shown.
    pub fn playlist_view(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Option<PlaylistView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT p.id, p.name, p.description, p.created_at, p.updated_at, {OWNER_COLUMNS}
                 FROM playlists p
                 LEFT JOIN users u ON u.id = p.owner_id
                 WHERE p.id = ?1"
            );
            let head = conn
                .query_row(&sql, [id.to_string()], |row| {
                    Ok((
                        uuid_at(row, 0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, DateTime<Utc>>(3)?,
                        row.get::<_, DateTime<Utc>>(4)?,
                        owner_at(row, 5)?,
                    ))
                })
                .optional()?;
            let Some((id, name, description, created_at, updated_at, owner)) = head else {
                return Ok(None);
            };

            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}
                 FROM playlist_videos pv
                 JOIN videos v ON v.id = pv.video_id
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE pv.playlist_id = ?1 AND (v.is_published = 1 OR v.owner_id = ?2)
                 ORDER BY pv.position ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let videos = stmt
                .query_map(params![id.to_string(), viewer_param(viewer)], video_card)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some(PlaylistView {
                id,
                name,
                description,
                owner,
                total_videos: videos.len() as i64,
                videos,
                created_at,
                updated_at,
            }))
        })
    }

    pub fn update_playlist(
        &self,
        id: Uuid,
        owner: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Guarded<Playlist>> {
        self.with_tx(|tx| {
            if let Some(denied) = check_owner(tx, id, owner)? {
                return Ok(denied);
            }

            tx.execute(
                "UPDATE playlists
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id.to_string(), name, description, Utc::now()],
            )?;
            applied(tx, id)
        })
    }

    pub fn delete_playlist(&self, id: Uuid, owner: Uuid) -> Result<Guarded<()>> {
        self.with_tx(|tx| {
            if let Some(denied) = check_owner(tx, id, owner)? {
                return Ok(denied);
            }
            // playlist_videos rows go with it via ON DELETE CASCADE.
            tx.execute("DELETE FROM playlists WHERE id = ?1", [id.to_string()])?;
            Ok(Guarded::Applied(()))
        })
    }

    /// Append a video. Adding a video that is already present leaves the
    /// playlist unchanged. `Applied(None)` means the video does not exist.
    pub fn add_video_to_playlist(
        &self,
        playlist: Uuid,
        video: Uuid,
        owner: Uuid,
    ) -> Result<Guarded<Option<Playlist>>> {
        self.with_tx(|tx| {
            if let Some(denied) = check_owner(tx, playlist, owner)? {
                return Ok(denied);
            }

            let video_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM videos WHERE id = ?1)",
                [video.to_string()],
                |row| row.get(0),
            )?;
            if !video_exists {
                return Ok(Guarded::Applied(None));
            }

            let pid = playlist.to_string();
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO playlist_videos (playlist_id, video_id, position)
                 VALUES (?1, ?2,
                         (SELECT COALESCE(MAX(position), 0) + 1
                          FROM playlist_videos WHERE playlist_id = ?1))",
                params![pid, video.to_string()],
            )?;
            if inserted > 0 {
                touch(tx, playlist)?;
            }
            Ok(applied(tx, playlist)?.map(Some))
        })
    }

    pub fn remove_video_from_playlist(
        &self,
        playlist: Uuid,
        video: Uuid,
        owner: Uuid,
    ) -> Result<Guarded<Playlist>> {
        self.with_tx(|tx| {
            if let Some(denied) = check_owner(tx, playlist, owner)? {
                return Ok(denied);
            }

            let removed = tx.execute(
                "DELETE FROM playlist_videos WHERE playlist_id = ?1 AND video_id = ?2",
                params![playlist.to_string(), video.to_string()],
            )?;
            if removed > 0 {
                touch(tx, playlist)?;
            }
            applied(tx, playlist)
        })
    }

    /// A user's playlists, newest first. Empty when the user has none.
    pub fn user_playlists(&self, user: Uuid) -> Result<Vec<PlaylistSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name, p.description,
                        (SELECT COUNT(*) FROM playlist_videos pv WHERE pv.playlist_id = p.id),
                        p.created_at, p.updated_at
                 FROM playlists p
                 WHERE p.owner_id = ?1
                 ORDER BY p.created_at DESC, p.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user.to_string()], |row| {
                    Ok(PlaylistSummary {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        total_videos: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The owner's playlists flagged by whether each already holds `video`.
    pub fn save_targets(&self, owner: Uuid, video: Uuid) -> Result<Vec<SavePlaylistEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.name,
                        EXISTS(SELECT 1 FROM playlist_videos pv
                               WHERE pv.playlist_id = p.id AND pv.video_id = ?2)
                 FROM playlists p
                 WHERE p.owner_id = ?1
                 ORDER BY p.created_at DESC, p.rowid DESC",
            )?;
            let rows = stmt
                .query_map(params![owner.to_string(), video.to_string()], |row| {
                    Ok(SavePlaylistEntry {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        is_video_present: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_playlist(conn: &Connection, id: Uuid) -> Result<Option<Playlist>> {
    let head = conn
        .query_row(
            "SELECT id, name, description, owner_id, created_at, updated_at
             FROM playlists WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(Playlist {
                    id: uuid_at(row, 0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    owner: uuid_at(row, 3)?,
                    videos: Vec::new(),
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    let Some(mut playlist) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT video_id FROM playlist_videos WHERE playlist_id = ?1 ORDER BY position ASC",
    )?;
    playlist.videos = stmt
        .query_map([id.to_string()], |row| uuid_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(playlist))
}

/// `Some(NotFound | Forbidden)` when `user` may not modify the playlist.
fn check_owner<T>(conn: &Connection, id: Uuid, user: Uuid) -> Result<Option<Guarded<T>>> {
    let owner: Option<String> = conn
        .query_row("SELECT owner_id FROM playlists WHERE id = ?1", [id.to_string()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(match owner {
        None => Some(Guarded::NotFound),
        Some(owner) if owner != user.to_string() => Some(Guarded::Forbidden),
        Some(_) => None,
    })
}

fn touch(conn: &Connection, id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE playlists SET updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), Utc::now()],
    )?;
    Ok(())
}

fn applied(conn: &Connection, id: Uuid) -> Result<Guarded<Playlist>> {
    let playlist = query_playlist(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Playlist {} vanished during update", id))?;
    Ok(Guarded::Applied(playlist))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn adding_same_video_twice_stores_it_once() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, owner, "clip");
        let playlist = db.create_playlist(owner, "mix", "").unwrap();

        db.add_video_to_playlist(playlist.id, video, owner).unwrap();
        let Guarded::Applied(Some(after)) =
            db.add_video_to_playlist(playlist.id, video, owner).unwrap()
        else {
            panic!("second add rejected");
        };
        assert_eq!(after.videos, vec![video]);
    }

    #[test]
    fn videos_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let a = fixtures::video(&db, owner, "a");
        let b = fixtures::video(&db, owner, "b");
        let c = fixtures::video(&db, owner, "c");
        let playlist = db.create_playlist(owner, "mix", "road trip").unwrap();

        for v in [b, a, c] {
            db.add_video_to_playlist(playlist.id, v, owner).unwrap();
        }
        db.remove_video_from_playlist(playlist.id, a, owner).unwrap();
        db.add_video_to_playlist(playlist.id, a, owner).unwrap();

        let record = db.get_playlist_record(playlist.id).unwrap().unwrap();
        assert_eq!(record.videos, vec![b, c, a]);
        assert_eq!(record.description, "road trip");
    }

    #[test]
    fn only_owner_mutates() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let other = fixtures::user(&db, "bob");
        let video = fixtures::video(&db, owner, "clip");
        let playlist = db.create_playlist(owner, "mix", "").unwrap();

        assert!(matches!(
            db.add_video_to_playlist(playlist.id, video, other).unwrap(),
            Guarded::Forbidden
        ));
        assert!(matches!(
            db.update_playlist(playlist.id, other, Some("mine"), None).unwrap(),
            Guarded::Forbidden
        ));
        assert_eq!(db.delete_playlist(playlist.id, other).unwrap(), Guarded::Forbidden);
        assert!(matches!(
            db.add_video_to_playlist(Uuid::new_v4(), video, owner).unwrap(),
            Guarded::NotFound
        ));
        assert!(matches!(
            db.add_video_to_playlist(playlist.id, Uuid::new_v4(), owner).unwrap(),
            Guarded::Applied(None)
        ));

        let Guarded::Applied(renamed) =
            db.update_playlist(playlist.id, owner, Some("renamed"), None).unwrap()
        else {
            panic!("owner update rejected");
        };
        assert_eq!(renamed.name, "renamed");
    }

    #[test]
    fn delete_removes_entries() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, owner, "clip");
        let playlist = db.create_playlist(owner, "mix", "").unwrap();
        db.add_video_to_playlist(playlist.id, video, owner).unwrap();

        assert_eq!(db.delete_playlist(playlist.id, owner).unwrap(), Guarded::Applied(()));
        assert!(db.get_playlist_record(playlist.id).unwrap().is_none());
        let leftover: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM playlist_videos", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn view_hides_other_peoples_drafts() {
        let db = Database::open_in_memory().unwrap();
        let curator = fixtures::user(&db, "alice");
        let creator = fixtures::user(&db, "bob");
        let public = fixtures::video(&db, creator, "public");
        let draft = fixtures::video(&db, creator, "draft");
        let playlist = db.create_playlist(curator, "mix", "").unwrap();
        db.add_video_to_playlist(playlist.id, public, curator).unwrap();
        db.add_video_to_playlist(playlist.id, draft, curator).unwrap();
        db.toggle_publish(draft, creator).unwrap();

        let as_curator = db.playlist_view(playlist.id, Some(curator)).unwrap().unwrap();
        assert_eq!(as_curator.total_videos, 1);
        assert_eq!(as_curator.videos[0].base.id, public);
        assert_eq!(as_curator.owner.unwrap().username, "alice");

        let as_creator = db.playlist_view(playlist.id, Some(creator)).unwrap().unwrap();
        assert_eq!(as_creator.total_videos, 2);
    }

    #[test]
    fn summaries_and_save_targets() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, owner, "clip");
        let with = db.create_playlist(owner, "with", "").unwrap();
        db.create_playlist(owner, "without", "").unwrap();
        db.add_video_to_playlist(with.id, video, owner).unwrap();

        let summaries = db.user_playlists(owner).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "without");
        assert_eq!(summaries[1].total_videos, 1);

        let targets = db.save_targets(owner, video).unwrap();
        let flags: Vec<(&str, bool)> =
            targets.iter().map(|t| (t.name.as_str(), t.is_video_present)).collect();
        assert_eq!(flags, vec![("without", false), ("with", true)]);

        let stranger = fixtures::user(&db, "bob");
        assert!(db.user_playlists(stranger).unwrap().is_empty());
    }
}
