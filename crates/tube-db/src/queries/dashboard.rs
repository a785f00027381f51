use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use tube_types::models::{ChannelStats, DashboardVideo};

use crate::Database;
use crate::models::{VIDEO_BASE_COLUMNS, VIDEO_BASE_WIDTH, video_base_at};

impl Database {
    /// Channel totals for `owner`. Every figure is zero when nothing matches.
    /// Returns `None` only if the user does not exist.
    pub fn channel_stats(&self, owner: Uuid) -> Result<Option<ChannelStats>> {
        self.with_conn(|conn| {
            // Likes carry no owner, so they are joined through the video.
            let stats = conn
                .query_row(
                    "SELECT u.full_name,
                            (SELECT COALESCE(SUM(v.views), 0) FROM videos v WHERE v.owner_id = u.id),
                            (SELECT COUNT(*) FROM videos v WHERE v.owner_id = u.id),
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                            (SELECT COUNT(*) FROM likes l
                             JOIN videos v ON v.id = l.target_id
                             WHERE l.target_kind = 'video' AND l.liked = 1
                               AND v.owner_id = u.id)
                     FROM users u WHERE u.id = ?1",
                    [owner.to_string()],
                    |row| {
                        Ok(ChannelStats {
                            owner_name: row.get(0)?,
                            total_views: row.get(1)?,
                            total_videos: row.get(2)?,
                            total_subscribers: row.get(3)?,
                            total_likes: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(stats)
        })
    }

    /// All of the owner's videos, published or not, newest first.
    pub fn channel_videos(&self, owner: Uuid) -> Result<Vec<DashboardVideo>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_BASE_COLUMNS},
                        (SELECT COUNT(*) FROM likes l
                         WHERE l.target_kind = 'video' AND l.target_id = v.id AND l.liked = 1),
                        (SELECT COUNT(*) FROM likes l
                         WHERE l.target_kind = 'video' AND l.target_id = v.id AND l.liked = 0)
                 FROM videos v
                 WHERE v.owner_id = ?1
                 ORDER BY v.created_at DESC, v.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner.to_string()], |row| {
                    Ok(DashboardVideo {
                        base: video_base_at(row, 0)?,
                        total_likes: row.get(VIDEO_BASE_WIDTH)?,
                        total_dislikes: row.get(VIDEO_BASE_WIDTH + 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use tube_types::like::{LikeAction, LikeTarget};

    #[test]
    fn empty_channel_is_all_zero() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");

        let stats = db.channel_stats(owner).unwrap().unwrap();
        assert_eq!(
            stats,
            ChannelStats { owner_name: "alice".to_string(), ..Default::default() }
        );
        assert!(db.channel_videos(owner).unwrap().is_empty());
        assert!(db.channel_stats(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn aggregates_views_subscribers_and_likes() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "alice");
        let fan = fixtures::user(&db, "bob");
        let critic = fixtures::user(&db, "carol");
        let other = fixtures::user(&db, "dave");

        let first = fixtures::video(&db, owner, "first");
        let second = fixtures::video(&db, owner, "second");
        let elsewhere = fixtures::video(&db, other, "elsewhere");
        db.toggle_publish(second, owner).unwrap();

        for _ in 0..3 {
            db.record_view(first, None).unwrap();
        }
        db.record_view(second, Some(owner)).unwrap();
        db.record_view(elsewhere, None).unwrap();

        db.toggle_like(LikeTarget::video(first), fan, LikeAction::Like).unwrap();
        db.toggle_like(LikeTarget::video(second), fan, LikeAction::Like).unwrap();
        db.toggle_like(LikeTarget::video(first), critic, LikeAction::Dislike).unwrap();
        db.toggle_like(LikeTarget::video(elsewhere), fan, LikeAction::Like).unwrap();
        let comment = db.add_comment(first, fan, "nice").unwrap().unwrap();
        db.toggle_like(LikeTarget::comment(comment.id), critic, LikeAction::Like).unwrap();

        db.toggle_subscription(owner, fan).unwrap();
        db.toggle_subscription(owner, critic).unwrap();
        db.toggle_subscription(other, fan).unwrap();

        let stats = db.channel_stats(owner).unwrap().unwrap();
        assert_eq!(stats.total_views, 4);
        assert_eq!(stats.total_videos, 2);
        assert_eq!(stats.total_subscribers, 2);
        assert_eq!(stats.total_likes, 2);

        let videos = db.channel_videos(owner).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].base.id, second);
        assert!(!videos[0].base.is_published);
        assert_eq!((videos[1].total_likes, videos[1].total_dislikes), (1, 1));
    }
}
