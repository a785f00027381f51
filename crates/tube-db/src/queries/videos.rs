use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use tube_types::models::{ChannelCard, Video, VideoCard, VideoDetail};
use tube_types::paging::{PageRequest, Paginated, SortDirection, VideoSort};

use crate::Database;
use crate::models::{
    CascadeReport, Guarded, OWNER_COLUMNS, OWNER_WIDTH, VIDEO_BASE_COLUMNS, VIDEO_BASE_WIDTH,
    like_pattern, owner_at, uuid_at, video_base_at, viewer_param,
};

pub struct NewVideo<'a> {
    pub owner: Uuid,
    pub title: &'a str,
    pub description: &'a str,
    pub video_file: &'a str,
    pub thumbnail: &'a str,
    pub duration: f64,
    pub is_published: bool,
}

#[derive(Default)]
pub struct VideoUpdate<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub thumbnail: Option<&'a str>,
}

pub struct VideoSearch<'a> {
    /// Case-insensitive literal substring of the title.
    pub query: Option<&'a str>,
    pub owner: Option<Uuid>,
    pub include_unpublished: bool,
    pub sort: VideoSort,
    pub direction: SortDirection,
    pub page: PageRequest,
}

const SEARCH_FILTER: &str = "(?1 IS NULL OR v.title LIKE ?1 ESCAPE '\\')
     AND (?2 IS NULL OR v.owner_id = ?2)
     AND (?3 = 1 OR v.is_published = 1)";

impl Database {
    pub fn create_video(&self, new: &NewVideo<'_>) -> Result<Video> {
        self.with_tx(|tx| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            tx.execute(
                "INSERT INTO videos (id, owner_id, title, description, video_file, thumbnail, duration, is_published, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id.to_string(),
                    new.owner.to_string(),
                    new.title,
                    new.description,
                    new.video_file,
                    new.thumbnail,
                    new.duration,
                    new.is_published,
                    now,
                ],
            )?;
            query_video(tx, id)?.ok_or_else(|| anyhow::anyhow!("Video {} vanished after insert", id))
        })
    }

    pub fn get_video(&self, id: Uuid) -> Result<Option<Video>> {
        self.with_conn(|conn| query_video(conn, id))
    }

    /// Published videos, newest first, optionally narrowed to one owner.
    pub fn list_published_videos(&self, owner: Option<Uuid>) -> Result<Vec<VideoCard>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}
                 FROM videos v
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE v.is_published = 1 AND (?1 IS NULL OR v.owner_id = ?1)
                 ORDER BY v.created_at DESC, v.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner.map(|o| o.to_string())], video_card)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Filtered, sorted, paginated video cards. The total is counted against
    /// the same filter and is unaffected by the page window.
    pub fn search_videos(&self, search: &VideoSearch<'_>) -> Result<Paginated<VideoCard>> {
        let pattern = search.query.map(like_pattern);
        let owner = search.owner.map(|o| o.to_string());

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM videos v WHERE {SEARCH_FILTER}"),
                params![pattern, owner, search.include_unpublished],
                |row| row.get(0),
            )?;

            // Column and direction come from closed enums, never caller text.
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}
                 FROM videos v
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE {SEARCH_FILTER}
                 ORDER BY {col} {dir}, v.rowid {dir}
                 LIMIT ?4 OFFSET ?5",
                col = search.sort.column(),
                dir = search.direction.sql(),
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    params![
                        pattern,
                        owner,
                        search.include_unpublished,
                        search.page.limit(),
                        search.page.offset(),
                    ],
                    video_card,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Paginated::new(items, search.page, total))
        })
    }

    /// Detail view relative to `viewer`. Unpublished videos are only visible
    /// to their owner.
    pub fn video_detail(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Option<VideoDetail>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS},
                        (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = v.owner_id),
                        EXISTS(SELECT 1 FROM subscriptions s
                               WHERE s.channel_id = v.owner_id AND s.subscriber_id = ?2),
                        (SELECT COUNT(*) FROM likes l
                         WHERE l.target_kind = 'video' AND l.target_id = v.id AND l.liked = 1),
                        (SELECT COUNT(*) FROM likes l
                         WHERE l.target_kind = 'video' AND l.target_id = v.id AND l.liked = 0),
                        EXISTS(SELECT 1 FROM likes l
                               WHERE l.target_kind = 'video' AND l.target_id = v.id
                                 AND l.liked_by = ?2 AND l.liked = 1),
                        EXISTS(SELECT 1 FROM likes l
                               WHERE l.target_kind = 'video' AND l.target_id = v.id
                                 AND l.liked_by = ?2 AND l.liked = 0),
                        COALESCE(v.owner_id = ?2, 0)
                 FROM videos v
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE v.id = ?1 AND (v.is_published = 1 OR v.owner_id = ?2)"
            );
            let at = VIDEO_BASE_WIDTH + OWNER_WIDTH;
            let detail = conn
                .query_row(&sql, params![id.to_string(), viewer_param(viewer)], |row| {
                    let subscribers_count: i64 = row.get(at)?;
                    let is_subscribed: bool = row.get(at + 1)?;
                    Ok(VideoDetail {
                        base: video_base_at(row, 0)?,
                        owner: owner_at(row, VIDEO_BASE_WIDTH)?.map(|owner| ChannelCard {
                            owner,
                            subscribers_count,
                            is_subscribed,
                        }),
                        total_likes: row.get(at + 2)?,
                        total_dislikes: row.get(at + 3)?,
                        is_liked: row.get(at + 4)?,
                        is_disliked: row.get(at + 5)?,
                        is_owner: row.get(at + 6)?,
                    })
                })
                .optional()?;
            Ok(detail)
        })
    }

    /// Apply the given changes. Also returns the thumbnail URL that was
    /// replaced so the caller can delete the old asset.
    pub fn update_video(
        &self,
        id: Uuid,
        owner: Uuid,
        update: &VideoUpdate<'_>,
    ) -> Result<Guarded<(Video, Option<String>)>> {
        self.with_tx(|tx| {
            let Some(video) = query_video(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if video.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            tx.execute(
                "UPDATE videos
                 SET title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     thumbnail = COALESCE(?4, thumbnail),
                     updated_at = ?5
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    update.title,
                    update.description,
                    update.thumbnail,
                    Utc::now(),
                ],
            )?;

            let replaced = update.thumbnail.map(|_| video.base.thumbnail);
            let updated = query_video(tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Video {} vanished during update", id))?;
            Ok(Guarded::Applied((updated, replaced)))
        })
    }

    /// Flip `is_published`. Returns the new value.
    pub fn toggle_publish(&self, id: Uuid, owner: Uuid) -> Result<Guarded<bool>> {
        self.with_tx(|tx| {
            let Some(video) = query_video(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if video.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            let published = !video.base.is_published;
            tx.execute(
                "UPDATE videos SET is_published = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), published, Utc::now()],
            )?;
            Ok(Guarded::Applied(published))
        })
    }

    /// Delete a video with its likes, its comments and their likes, its
    /// playlist entries and watch-history entries. Runs as one transaction.
    pub fn delete_video(&self, id: Uuid, owner: Uuid) -> Result<Guarded<(Video, CascadeReport)>> {
        let outcome = self.with_tx(|tx| {
            let Some(video) = query_video(tx, id)? else {
                return Ok(Guarded::NotFound);
            };
            if video.owner != owner {
                return Ok(Guarded::Forbidden);
            }

            let vid = id.to_string();
            let report = CascadeReport {
                comment_likes: tx.execute(
                    "DELETE FROM likes
                     WHERE target_kind = 'comment'
                       AND target_id IN (SELECT id FROM comments WHERE video_id = ?1)",
                    [&vid],
                )?,
                comments: tx.execute("DELETE FROM comments WHERE video_id = ?1", [&vid])?,
                video_likes: tx.execute(
                    "DELETE FROM likes WHERE target_kind = 'video' AND target_id = ?1",
                    [&vid],
                )?,
                playlist_refs: tx.execute("DELETE FROM playlist_videos WHERE video_id = ?1", [&vid])?,
                history_refs: tx.execute("DELETE FROM watch_history WHERE video_id = ?1", [&vid])?,
            };
            tx.execute("DELETE FROM videos WHERE id = ?1", [&vid])?;

            Ok(Guarded::Applied((video, report)))
        })?;

        if let Guarded::Applied((video, report)) = &outcome {
            info!("Deleted video {} with dependents {:?}", video.base.id, report);
        }
        Ok(outcome)
    }

    /// Count a view and, for a signed-in viewer, append to their watch
    /// history. Returns the new view count, or `None` if the video is not
    /// visible to the viewer.
    pub fn record_view(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Option<i64>> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE videos SET views = views + 1
                 WHERE id = ?1 AND (is_published = 1 OR owner_id = ?2)",
                params![id.to_string(), viewer_param(viewer)],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            if let Some(user) = viewer {
                tx.execute(
                    "INSERT INTO watch_history (user_id, video_id, watched_at) VALUES (?1, ?2, ?3)",
                    params![user.to_string(), id.to_string(), Utc::now()],
                )?;
            }

            let views: i64 =
                tx.query_row("SELECT views FROM videos WHERE id = ?1", [id.to_string()], |row| {
                    row.get(0)
                })?;
            Ok(Some(views))
        })
    }
}

pub(crate) fn query_video(conn: &Connection, id: Uuid) -> Result<Option<Video>> {
    let sql = format!("SELECT {VIDEO_BASE_COLUMNS}, v.owner_id FROM videos v WHERE v.id = ?1");
    let row = conn
        .query_row(&sql, [id.to_string()], |row| {
            Ok(Video {
                base: video_base_at(row, 0)?,
                owner: uuid_at(row, VIDEO_BASE_WIDTH)?,
            })
        })
        .optional()?;
    Ok(row)
}

/// Maps `{VIDEO_BASE_COLUMNS}, {OWNER_COLUMNS}`.
pub(crate) fn video_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<VideoCard> {
    Ok(VideoCard {
        base: video_base_at(row, 0)?,
        owner: owner_at(row, VIDEO_BASE_WIDTH)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use tube_types::like::{LikeAction, LikeTarget};

    fn search(page: PageRequest) -> VideoSearch<'static> {
        VideoSearch {
            query: None,
            owner: None,
            include_unpublished: false,
            sort: VideoSort::CreatedAt,
            direction: SortDirection::Desc,
            page,
        }
    }

    #[test]
    fn last_page_holds_remainder_and_beyond_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        for i in 0..23 {
            fixtures::video(&db, owner, &format!("clip {i}"));
        }

        let last = db.search_videos(&search(PageRequest::new(3, 10))).unwrap();
        assert_eq!(last.items.len(), 3);
        assert_eq!(last.pagination.total, 23);
        assert_eq!(last.pagination.total_pages, 3);

        let beyond = db.search_videos(&search(PageRequest::new(4, 10))).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.pagination.total, 23);

        let exact = db.search_videos(&search(PageRequest::new(2, 23))).unwrap();
        assert!(exact.items.is_empty());
        let whole = db.search_videos(&search(PageRequest::new(1, 23))).unwrap();
        assert_eq!(whole.items.len(), 23);
    }

    #[test]
    fn pages_do_not_overlap() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        for i in 0..7 {
            fixtures::video(&db, owner, &format!("clip {i}"));
        }

        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = db.search_videos(&search(PageRequest::new(page, 3))).unwrap();
            seen.extend(result.items.into_iter().map(|v| v.base.id));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn title_search_is_case_insensitive_and_literal() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        fixtures::video(&db, owner, "Rust Tutorial");
        fixtures::video(&db, owner, "cooking 100% vegan");
        fixtures::video(&db, owner, "cooking 100 vegan");

        let mut q = search(PageRequest::default());
        q.query = Some("rust");
        let hits = db.search_videos(&q).unwrap();
        assert_eq!(hits.items.len(), 1);
        assert_eq!(hits.items[0].base.title, "Rust Tutorial");
        assert_eq!(hits.items[0].owner.as_ref().unwrap().username, "alice");

        q.query = Some("100%");
        let hits = db.search_videos(&q).unwrap();
        assert_eq!(hits.items.len(), 1);
        assert_eq!(hits.pagination.total, 1);
    }

    #[test]
    fn sort_by_views_ascending() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let popular = fixtures::video(&db, owner, "popular");
        let quiet = fixtures::video(&db, owner, "quiet");
        for _ in 0..3 {
            db.record_view(popular, None).unwrap();
        }

        let mut q = search(PageRequest::default());
        q.sort = VideoSort::Views;
        q.direction = SortDirection::Asc;
        let ids: Vec<Uuid> = db.search_videos(&q).unwrap().items.iter().map(|v| v.base.id).collect();
        assert_eq!(ids, vec![quiet, popular]);
    }

    #[test]
    fn unpublished_videos_only_visible_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let other = fixtures::user(&db, "bob");
        let id = fixtures::video(&db, owner, "draft");
        assert_eq!(db.toggle_publish(id, owner).unwrap(), Guarded::Applied(false));

        assert!(db.list_published_videos(None).unwrap().is_empty());
        assert!(db.video_detail(id, None).unwrap().is_none());
        assert!(db.video_detail(id, Some(other)).unwrap().is_none());
        assert!(db.video_detail(id, Some(owner)).unwrap().unwrap().is_owner);
        assert_eq!(db.record_view(id, Some(other)).unwrap(), None);

        let mut q = search(PageRequest::default());
        q.owner = Some(owner);
        assert_eq!(db.search_videos(&q).unwrap().pagination.total, 0);
        q.include_unpublished = true;
        assert_eq!(db.search_videos(&q).unwrap().pagination.total, 1);
    }

    #[test]
    fn detail_flags_are_relative_to_viewer() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let fan = fixtures::user(&db, "bob");
        let stranger = fixtures::user(&db, "carol");
        let id = fixtures::video(&db, owner, "clip");

        db.toggle_like(LikeTarget::video(id), fan, LikeAction::Like).unwrap();
        db.toggle_subscription(owner, fan).unwrap();

        let anon = db.video_detail(id, None).unwrap().unwrap();
        assert_eq!(anon.total_likes, 1);
        assert!(!anon.is_liked && !anon.is_disliked && !anon.is_owner);
        let channel = anon.owner.unwrap();
        assert_eq!(channel.subscribers_count, 1);
        assert!(!channel.is_subscribed);

        let as_fan = db.video_detail(id, Some(fan)).unwrap().unwrap();
        assert!(as_fan.is_liked);
        assert!(as_fan.owner.unwrap().is_subscribed);

        let as_stranger = db.video_detail(id, Some(stranger)).unwrap().unwrap();
        assert!(!as_stranger.is_liked);
        assert!(!as_stranger.owner.unwrap().is_subscribed);
    }

    #[test]
    fn update_requires_owner_and_reports_old_thumbnail() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let other = fixtures::user(&db, "bob");
        let id = fixtures::video(&db, owner, "clip");

        let change = VideoUpdate {
            title: Some("better"),
            thumbnail: Some("https://cdn.test/new.png"),
            ..Default::default()
        };
        assert!(matches!(db.update_video(id, other, &change).unwrap(), Guarded::Forbidden));
        assert!(matches!(
            db.update_video(Uuid::new_v4(), owner, &change).unwrap(),
            Guarded::NotFound
        ));

        let Guarded::Applied((video, replaced)) = db.update_video(id, owner, &change).unwrap() else {
            panic!("owner update rejected");
        };
        assert_eq!(video.base.title, "better");
        assert_eq!(video.base.description, "about");
        assert_eq!(replaced.as_deref(), Some("https://cdn.test/t.png"));
    }

    #[test]
    fn delete_cascades_to_dependents() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let fan = fixtures::user(&db, "bob");
        let doomed = fixtures::video(&db, owner, "doomed");
        let kept = fixtures::video(&db, owner, "kept");

        db.toggle_like(LikeTarget::video(doomed), fan, LikeAction::Like).unwrap();
        db.toggle_like(LikeTarget::video(kept), fan, LikeAction::Like).unwrap();
        let comment = db.add_comment(doomed, fan, "nice").unwrap().unwrap();
        db.toggle_like(LikeTarget::comment(comment.id), owner, LikeAction::Dislike).unwrap();
        let playlist = db.create_playlist(fan, "faves", "").unwrap();
        db.add_video_to_playlist(playlist.id, doomed, fan).unwrap();
        db.add_video_to_playlist(playlist.id, kept, fan).unwrap();
        db.record_view(doomed, Some(fan)).unwrap();

        assert!(matches!(db.delete_video(doomed, fan).unwrap(), Guarded::Forbidden));

        let Guarded::Applied((_, report)) = db.delete_video(doomed, owner).unwrap() else {
            panic!("owner delete rejected");
        };
        assert_eq!(
            report,
            CascadeReport {
                video_likes: 1,
                comments: 1,
                comment_likes: 1,
                playlist_refs: 1,
                history_refs: 1,
            }
        );

        assert!(db.get_video(doomed).unwrap().is_none());
        assert_eq!(db.like_counts(LikeTarget::video(doomed)).unwrap(), (0, 0));
        assert_eq!(db.like_counts(LikeTarget::comment(comment.id)).unwrap(), (0, 0));
        assert_eq!(db.like_counts(LikeTarget::video(kept)).unwrap(), (1, 0));
        let remaining = db.get_playlist_record(playlist.id).unwrap().unwrap();
        assert_eq!(remaining.videos, vec![kept]);
        assert!(db.watch_history(fan).unwrap().is_empty());
    }
}
