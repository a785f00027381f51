use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                full_name       TEXT NOT NULL,
                password        TEXT NOT NULL,
                avatar          TEXT NOT NULL,
                cover_image     TEXT,
                refresh_token   TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE videos (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                video_file      TEXT NOT NULL,
                thumbnail       TEXT NOT NULL,
                duration        REAL NOT NULL DEFAULT 0,
                views           INTEGER NOT NULL DEFAULT 0,
                is_published    INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_videos_owner ON videos(owner_id, created_at);
            CREATE INDEX idx_videos_published ON videos(is_published, created_at);

            CREATE TABLE comments (
                id              TEXT PRIMARY KEY,
                video_id        TEXT NOT NULL REFERENCES videos(id),
                owner_id        TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_comments_video ON comments(video_id, created_at);

            CREATE TABLE tweets (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_tweets_owner ON tweets(owner_id, created_at);

            -- One row per (target, user); `liked` separates like from dislike.
            CREATE TABLE likes (
                id              TEXT PRIMARY KEY,
                target_kind     TEXT NOT NULL CHECK (target_kind IN ('video', 'comment', 'tweet')),
                target_id       TEXT NOT NULL,
                liked_by        TEXT NOT NULL REFERENCES users(id),
                liked           INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE(target_kind, target_id, liked_by)
            );

            CREATE INDEX idx_likes_target ON likes(target_kind, target_id, liked);
            CREATE INDEX idx_likes_user ON likes(liked_by, target_kind);

            CREATE TABLE subscriptions (
                id              TEXT PRIMARY KEY,
                channel_id      TEXT NOT NULL REFERENCES users(id),
                subscriber_id   TEXT NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                UNIQUE(channel_id, subscriber_id)
            );

            CREATE INDEX idx_subscriptions_subscriber ON subscriptions(subscriber_id);

            CREATE TABLE playlists (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                name            TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_playlists_owner ON playlists(owner_id);

            CREATE TABLE playlist_videos (
                playlist_id     TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
                video_id        TEXT NOT NULL REFERENCES videos(id),
                position        INTEGER NOT NULL,
                PRIMARY KEY (playlist_id, video_id)
            );

            CREATE INDEX idx_playlist_videos_video ON playlist_videos(video_id);

            CREATE TABLE watch_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL REFERENCES users(id),
                video_id        TEXT NOT NULL REFERENCES videos(id),
                watched_at      TEXT NOT NULL
            );

            CREATE INDEX idx_watch_history_user ON watch_history(user_id, id);
            CREATE INDEX idx_watch_history_video ON watch_history(video_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
