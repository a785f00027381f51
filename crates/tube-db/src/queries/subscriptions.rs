use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use tube_types::api::SubscriptionToggle;
use tube_types::models::ChannelCard;

use crate::Database;
use crate::models::{OWNER_COLUMNS, OWNER_WIDTH, owner_at, viewer_param};

impl Database {
    /// Subscribe `subscriber` to `channel`, or unsubscribe if already
    /// subscribed. Returns `None` if the channel does not exist.
    pub fn toggle_subscription(
        &self,
        channel: Uuid,
        subscriber: Uuid,
    ) -> Result<Option<SubscriptionToggle>> {
        self.with_tx(|tx| {
            if !user_exists(tx, channel)? {
                return Ok(None);
            }

            let channel_id = channel.to_string();
            let subscriber_id = subscriber.to_string();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM subscriptions WHERE channel_id = ?1 AND subscriber_id = ?2",
                    params![channel_id, subscriber_id],
                    |row| row.get(0),
                )
                .optional()?;

            let is_subscribed = match existing {
                Some(id) => {
                    tx.execute("DELETE FROM subscriptions WHERE id = ?1", [id])?;
                    false
                }
                None => {
                    tx.execute(
                        "INSERT INTO subscriptions (id, channel_id, subscriber_id, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![Uuid::new_v4().to_string(), channel_id, subscriber_id, Utc::now()],
                    )?;
                    true
                }
            };

            let subscribers_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?1",
                [&channel_id],
                |row| row.get(0),
            )?;
            debug!("{} subscribed to {}: {}", subscriber, channel, is_subscribed);

            Ok(Some(SubscriptionToggle { is_subscribed, subscribers_count }))
        })
    }

    /// Users subscribed to `channel`, oldest subscription first.
    pub fn channel_subscribers(
        &self,
        channel: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<Vec<ChannelCard>>> {
        self.with_conn(|conn| {
            if !user_exists(conn, channel)? {
                return Ok(None);
            }
            let cards = channel_cards(conn, "s.channel_id = ?1", "s.subscriber_id", channel, viewer)?;
            Ok(Some(cards))
        })
    }

    /// Channels `subscriber` follows, oldest subscription first.
    pub fn subscribed_channels(
        &self,
        subscriber: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<Vec<ChannelCard>>> {
        self.with_conn(|conn| {
            if !user_exists(conn, subscriber)? {
                return Ok(None);
            }
            let cards =
                channel_cards(conn, "s.subscriber_id = ?1", "s.channel_id", subscriber, viewer)?;
            Ok(Some(cards))
        })
    }
}

fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Joins the user on the other side of each matching subscription and
/// decorates it with its own subscriber count and the viewer's membership.
fn channel_cards(
    conn: &Connection,
    filter: &str,
    other_side: &str,
    key: Uuid,
    viewer: Option<Uuid>,
) -> Result<Vec<ChannelCard>> {
    let sql = format!(
        "SELECT {OWNER_COLUMNS},
                (SELECT COUNT(*) FROM subscriptions x WHERE x.channel_id = u.id),
                EXISTS(SELECT 1 FROM subscriptions x
                       WHERE x.channel_id = u.id AND x.subscriber_id = ?2)
         FROM subscriptions s
         JOIN users u ON u.id = {other_side}
         WHERE {filter}
         ORDER BY s.created_at ASC, s.rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![key.to_string(), viewer_param(viewer)], |row| {
            Ok((owner_at(row, 0)?, row.get(OWNER_WIDTH)?, row.get(OWNER_WIDTH + 1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(owner, subscribers_count, is_subscribed)| {
            owner.map(|owner| ChannelCard { owner, subscribers_count, is_subscribed })
        })
        .collect())
}
