use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::{MessageRow, UserRow};
use huddle_types::ANONYMOUS_NAME;
use huddle_types::events::GatewayEvent;
use huddle_types::models::MessageKind;

use crate::error::BrokerError;
use crate::fanout::RoomFanout;
use crate::presence::Presence;
use crate::registry::Registry;

/// Upper bound on message text after trimming.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// The message broker: persists sends, resolves display identity, and fans
/// the result out to the room in persistence-completion order.
#[derive(Clone)]
pub struct Broker {
    registry: Registry,
    fanout: RoomFanout,
    presence: Presence,
    db: Arc<Database>,
    /// Per-room ordering locks, created lazily and pruned once no send
    /// holds them. Held across insert+publish only, so sends to different
    /// rooms proceed fully in parallel.
    room_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl Broker {
    pub fn new(registry: Registry, presence: Presence, db: Arc<Database>) -> Self {
        let fanout = RoomFanout::new(registry.clone());
        Self {
            registry,
            fanout,
            presence,
            db,
            room_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn fanout(&self) -> &RoomFanout {
        &self.fanout
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Bind an identity to a connection, verifying the user exists. A
    /// missing user means a stale or forged client reference.
    pub async fn identify(&self, conn_id: Uuid, user_id: Uuid) -> Result<UserRow, BrokerError> {
        let user = self
            .lookup_user(user_id)
            .await?
            .ok_or(BrokerError::NotFound)?;
        self.registry.identify(conn_id, user_id).await?;
        info!(%conn_id, %user_id, username = %user.username, "connection identified");
        Ok(user)
    }

    /// Persist a message and broadcast it to every member of the group,
    /// including the sender. Broadcast order matches persistence-completion
    /// order: the per-room lock is held from insert through publish.
    pub async fn send_message(
        &self,
        conn_id: Uuid,
        group_id: Uuid,
        text: &str,
        anonymous_override: bool,
    ) -> Result<MessageRow, BrokerError> {
        let user_id = self
            .registry
            .user_of(conn_id)
            .await?
            .ok_or(BrokerError::Unauthenticated)?;

        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(BrokerError::InvalidMessage);
        }

        let room_lock = self.room_lock(group_id).await;
        let _ordering = room_lock.lock().await;

        let user = self
            .lookup_user(user_id)
            .await?
            .ok_or(BrokerError::NotFound)?;

        let row = self
            .insert_message(group_id, user_id, text)
            .await
            .map_err(|e| match e {
                BrokerError::StoreUnavailable(source) => BrokerError::SendFailed(source),
                other => other,
            })?;

        let is_anonymous = anonymous_override || user.is_anonymous;
        let display_name = if is_anonymous {
            ANONYMOUS_NAME.to_string()
        } else {
            user.display_name
        };

        let created_at = row
            .created_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .map_err(|e| BrokerError::SendFailed(e.into()))?;

        debug!(message_id = row.id, %group_id, %user_id, "message persisted, broadcasting");
        self.fanout
            .publish(
                group_id,
                GatewayEvent::NewMessage {
                    id: row.id,
                    group_id,
                    user_id,
                    text: row.body.clone(),
                    created_at,
                    display_name,
                    is_anonymous,
                    avatar_url: user.avatar_url,
                },
            )
            .await;

        Ok(row)
    }

    /// Apply a typing signal and republish it to the room, excluding the
    /// originating connection.
    pub async fn typing(
        &self,
        conn_id: Uuid,
        group_id: Uuid,
        is_typing: bool,
        display_name: String,
    ) -> Result<(), BrokerError> {
        let user_id = self
            .registry
            .user_of(conn_id)
            .await?
            .ok_or(BrokerError::Unauthenticated)?;

        let broadcast = self
            .presence
            .signal(conn_id, group_id, user_id, is_typing, display_name)
            .await;
        self.fanout
            .publish_excluding(group_id, broadcast.event(), conn_id)
            .await;
        Ok(())
    }

    /// Full cleanup for a disconnecting connection: stale typing state
    /// transitions to idle (broadcast to the rooms), then every registry
    /// subscription is released.
    pub async fn disconnect(&self, conn_id: Uuid) {
        for stopped in self.presence.clear_connection(conn_id).await {
            self.fanout
                .publish_excluding(stopped.group_id, stopped.event(), conn_id)
                .await;
        }
        if let Some(user_id) = self.registry.unregister(conn_id).await {
            info!(%conn_id, %user_id, "connection disconnected");
        }
    }

    async fn room_lock(&self, group_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.room_locks.lock().await;
        // Drop locks no in-flight send is holding, so the map tracks active
        // rooms rather than every room ever sent to
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(group_id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) async fn room_lock_entries(&self) -> usize {
        self.room_locks.lock().await.len()
    }

    async fn lookup_user(&self, user_id: Uuid) -> Result<Option<UserRow>, BrokerError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.get_user_by_id(&user_id.to_string()))
            .await
            .map_err(|e| BrokerError::StoreUnavailable(e.into()))?
            .map_err(BrokerError::StoreUnavailable)
    }

    async fn insert_message(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        text: &str,
    ) -> Result<MessageRow, BrokerError> {
        let db = self.db.clone();
        let body = text.to_string();
        tokio::task::spawn_blocking(move || {
            db.insert_message(
                &group_id.to_string(),
                &user_id.to_string(),
                &body,
                MessageKind::Text.as_str(),
            )
        })
        .await
        .map_err(|e| BrokerError::StoreUnavailable(e.into()))?
        .map_err(BrokerError::StoreUnavailable)
    }
}
