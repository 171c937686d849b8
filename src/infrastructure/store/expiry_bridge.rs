//! Key Expiration Bridge
//!
//! Turns Redis key-expiration notifications into an in-process stream of
//! expired key names.
//!
//! The bridge enables keyspace notifications once at startup, subscribes to
//! the `__keyevent@<db>__:expired` channel on a dedicated connection, and
//! republishes every expired key on a `tokio::sync::broadcast` channel. The
//! stream is multicast and in-process only: events are not buffered before a
//! receiver attaches, lagging receivers lose events past the backlog, and
//! nothing is replayed.

use futures::{Stream, StreamExt};
use redis::Client;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::RedisSettings;
use crate::shared::error::AppError;

/// Native notification channel for key expiry in a logical database.
pub fn expired_channel(db: i64) -> String {
    format!("__keyevent@{}__:expired", db)
}

/// A subscription on one channel can, depending on the transport, observe
/// messages from others; only forward what came in on the expected channel.
fn filter_expired(expected: &str, channel: &str, payload: &str) -> Option<String> {
    if channel == expected {
        Some(payload.to_string())
    } else {
        None
    }
}

/// Forwards `(channel, payload)` notification pairs onto the broadcast
/// sender, dropping anything that arrived on a foreign channel.
///
/// Send only fails when no receiver is attached; events are lost in that
/// case, never buffered. Runs until the notification stream ends.
async fn forward_expirations(
    notifications: impl Stream<Item = (String, String)>,
    expected: &str,
    tx: &broadcast::Sender<String>,
) {
    futures::pin_mut!(notifications);
    while let Some((channel, payload)) = notifications.next().await {
        if let Some(key) = filter_expired(expected, &channel, &payload) {
            let _ = tx.send(key);
        }
    }
}

/// Bridge from Redis expiration notifications to an internal broadcast.
pub struct ExpiryBridge {
    tx: broadcast::Sender<String>,
}

impl ExpiryBridge {
    fn new(backlog: usize) -> Self {
        let (tx, _) = broadcast::channel(backlog);
        Self { tx }
    }

    /// Connects the bridge: enables `Ex` keyspace notifications, subscribes
    /// to the expired-events channel for the configured database, and starts
    /// the forwarding task.
    ///
    /// Failure here should not take the process down; the caller is expected
    /// to log and continue without expiry-driven behavior.
    pub async fn connect(settings: &RedisSettings, backlog: usize) -> Result<Self, AppError> {
        let client = Client::open(settings.url())?;

        // One-time administrative call; without it the expired channel
        // never receives anything.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await?;

        // Dedicated connection: a subscribing connection cannot issue
        // regular commands.
        let channel = expired_channel(settings.db);
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        info!(channel = %channel, "Key expiration bridge subscribed");

        let bridge = Self::new(backlog);
        let task_tx = bridge.tx.clone();
        tokio::spawn(async move {
            let notifications = pubsub.on_message().filter_map(|msg| async move {
                let payload: String = msg.get_payload().ok()?;
                Some((msg.get_channel_name().to_string(), payload))
            });
            forward_expirations(notifications, &channel, &task_tx).await;
            warn!(channel = %channel, "Key expiration stream ended");
        });

        Ok(bridge)
    }

    /// Returns a new receiver on the expired-key stream. Each receiver sees
    /// every key expiring after it attaches, up to the configured backlog.
    pub fn expired_keys(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, "__keyevent@0__:expired" ; "default database")]
    #[test_case(3, "__keyevent@3__:expired" ; "selected database")]
    fn channel_naming(db: i64, expected: &str) {
        assert_eq!(expired_channel(db), expected);
    }

    #[test]
    fn forwards_matching_channel() {
        let expected = expired_channel(0);
        assert_eq!(
            filter_expired(&expected, &expected, "session:42"),
            Some("session:42".to_string())
        );
    }

    #[test]
    fn drops_foreign_channel() {
        let expected = expired_channel(0);
        assert_eq!(
            filter_expired(&expected, "__keyevent@1__:expired", "session:42"),
            None
        );
        assert_eq!(filter_expired(&expected, "other-channel", "payload"), None);
    }

    fn notifications(pairs: &[(&str, &str)]) -> impl Stream<Item = (String, String)> {
        futures::stream::iter(
            pairs
                .iter()
                .map(|(channel, payload)| (channel.to_string(), payload.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn each_matching_notification_yields_exactly_one_key() {
        let expected = expired_channel(0);
        let (tx, mut rx) = broadcast::channel(16);

        forward_expirations(
            notifications(&[
                (expected.as_str(), "session:1"),
                ("__keyevent@1__:expired", "session:other-db"),
                (expected.as_str(), "session:2"),
            ]),
            &expected,
            &tx,
        )
        .await;

        assert_eq!(rx.recv().await.unwrap(), "session:1");
        assert_eq!(rx.recv().await.unwrap(), "session:2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn keys_expiring_before_a_receiver_attaches_are_not_replayed() {
        let expected = expired_channel(0);
        let (tx, _) = broadcast::channel::<String>(16);

        // No receiver attached while this key expires.
        let early = notifications(&[(expected.as_str(), "session:early")]);
        forward_expirations(early, &expected, &tx).await;

        let mut late = tx.subscribe();
        let next = notifications(&[(expected.as_str(), "session:late")]);
        forward_expirations(next, &expected, &tx).await;

        assert_eq!(late.recv().await.unwrap(), "session:late");
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn expired_keys_receivers_observe_forwarded_keys() {
        let expected = expired_channel(0);
        let bridge = ExpiryBridge::new(16);

        let mut first = bridge.expired_keys();
        let mut second = bridge.expired_keys();
        let stream = notifications(&[(expected.as_str(), "presence:u1")]);
        forward_expirations(stream, &expected, &bridge.tx).await;

        assert_eq!(first.recv().await.unwrap(), "presence:u1");
        assert_eq!(second.recv().await.unwrap(), "presence:u1");
    }
}
