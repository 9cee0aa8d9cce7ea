use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

use crate::fanout::RoomFanout;

/// How long a typing entry survives without a fresh signal before it is
/// treated as stopped. Covers clients whose disconnect or stop signal was
/// lost; the client-side debounce is much shorter.
pub const TYPING_IDLE_WINDOW: Duration = Duration::from_secs(5);

/// How often the sweeper looks for stale typing entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Ephemeral typing state per (group, user). An absent entry means idle;
/// nothing here is ever persisted.
#[derive(Clone)]
pub struct Presence {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    idle_window: Duration,
    entries: RwLock<HashMap<(Uuid, Uuid), TypingEntry>>,
}

struct TypingEntry {
    conn_id: Uuid,
    display_name: String,
    last_signal: Instant,
}

/// A transition the caller must republish to the room, excluding `conn_id`.
pub struct TypingBroadcast {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
    pub display_name: String,
    pub conn_id: Uuid,
}

impl TypingBroadcast {
    pub fn event(&self) -> GatewayEvent {
        GatewayEvent::UserTyping {
            group_id: self.group_id,
            user_id: self.user_id,
            is_typing: self.is_typing,
            display_name: self.display_name.clone(),
        }
    }
}

impl Presence {
    pub fn new() -> Self {
        Self::with_idle_window(TYPING_IDLE_WINDOW)
    }

    pub fn with_idle_window(idle_window: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                idle_window,
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Apply a typing signal. A start refreshes the idle timer; a stop clears
    /// the entry. The display name is taken from the signal itself — it is
    /// resolved at signal time by the sender and never cached across signals.
    /// Every signal yields a broadcast (repeated starts keep remote
    /// indicators alive).
    pub async fn signal(
        &self,
        conn_id: Uuid,
        group_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
        display_name: String,
    ) -> TypingBroadcast {
        let key = (group_id, user_id);
        let mut entries = self.inner.entries.write().await;
        if is_typing {
            entries.insert(
                key,
                TypingEntry {
                    conn_id,
                    display_name: display_name.clone(),
                    last_signal: Instant::now(),
                },
            );
        } else {
            entries.remove(&key);
        }
        TypingBroadcast {
            group_id,
            user_id,
            is_typing,
            display_name,
            conn_id,
        }
    }

    /// Remove entries idle longer than the window, yielding the stop
    /// broadcasts. Tolerates lost stop signals and lost disconnects.
    pub async fn expire_stale(&self) -> Vec<TypingBroadcast> {
        let now = Instant::now();
        let mut entries = self.inner.entries.write().await;
        let expired: Vec<(Uuid, Uuid)> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_signal) >= self.inner.idle_window)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let entry = entries.remove(&key)?;
                debug!(group_id = %key.0, user_id = %key.1, "typing entry expired");
                Some(TypingBroadcast {
                    group_id: key.0,
                    user_id: key.1,
                    is_typing: false,
                    display_name: entry.display_name,
                    conn_id: entry.conn_id,
                })
            })
            .collect()
    }

    /// Clear every entry owned by a disconnecting connection, yielding the
    /// stop broadcasts so no further typing state is attributable to it.
    pub async fn clear_connection(&self, conn_id: Uuid) -> Vec<TypingBroadcast> {
        let mut entries = self.inner.entries.write().await;
        let owned: Vec<(Uuid, Uuid)> = entries
            .iter()
            .filter(|(_, entry)| entry.conn_id == conn_id)
            .map(|(key, _)| *key)
            .collect();

        owned
            .into_iter()
            .filter_map(|key| {
                let entry = entries.remove(&key)?;
                Some(TypingBroadcast {
                    group_id: key.0,
                    user_id: key.1,
                    is_typing: false,
                    display_name: entry.display_name,
                    conn_id,
                })
            })
            .collect()
    }

    pub async fn is_typing(&self, group_id: Uuid, user_id: Uuid) -> bool {
        self.inner
            .entries
            .read()
            .await
            .contains_key(&(group_id, user_id))
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task: periodically expire stale typing entries and republish
/// the stop events to each affected room.
pub async fn run_expiry_sweep(presence: Presence, fanout: RoomFanout) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        for stopped in presence.expire_stale().await {
            let event = stopped.event();
            fanout
                .publish_excluding(stopped.group_id, event, stopped.conn_id)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: Uuid = Uuid::from_u128(1);
    const USER: Uuid = Uuid::from_u128(2);

    #[tokio::test]
    async fn start_then_stop_clears_state() {
        let presence = Presence::new();
        let conn = Uuid::new_v4();

        presence
            .signal(conn, GROUP, USER, true, "Alice".into())
            .await;
        assert!(presence.is_typing(GROUP, USER).await);

        let stop = presence
            .signal(conn, GROUP, USER, false, "Alice".into())
            .await;
        assert!(!stop.is_typing);
        assert!(!presence.is_typing(GROUP, USER).await);
    }

    #[tokio::test]
    async fn stale_entry_expires_after_idle_window() {
        let presence = Presence::with_idle_window(Duration::from_millis(20));
        let conn = Uuid::new_v4();

        presence
            .signal(conn, GROUP, USER, true, "Alice".into())
            .await;
        assert!(presence.expire_stale().await.is_empty());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let stopped = presence.expire_stale().await;
        assert_eq!(stopped.len(), 1);
        assert!(!stopped[0].is_typing);
        assert_eq!(stopped[0].display_name, "Alice");
        assert!(!presence.is_typing(GROUP, USER).await);
    }

    #[tokio::test]
    async fn fresh_signal_resets_the_idle_timer() {
        let presence = Presence::with_idle_window(Duration::from_millis(50));
        let conn = Uuid::new_v4();

        presence
            .signal(conn, GROUP, USER, true, "Alice".into())
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        presence
            .signal(conn, GROUP, USER, true, "Alice".into())
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 60ms since the first signal but only 30ms since the refresh
        assert!(presence.expire_stale().await.is_empty());
        assert!(presence.is_typing(GROUP, USER).await);
    }

    #[tokio::test]
    async fn disconnect_clears_all_entries_for_the_connection() {
        let presence = Presence::new();
        let conn = Uuid::new_v4();
        let other_conn = Uuid::new_v4();
        let other_group = Uuid::from_u128(3);

        presence
            .signal(conn, GROUP, USER, true, "Alice".into())
            .await;
        presence
            .signal(conn, other_group, USER, true, "Alice".into())
            .await;
        presence
            .signal(other_conn, GROUP, Uuid::from_u128(9), true, "Bob".into())
            .await;

        let stopped = presence.clear_connection(conn).await;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|b| !b.is_typing));
        // The other connection's state is untouched
        assert!(presence.is_typing(GROUP, Uuid::from_u128(9)).await);
    }
}
