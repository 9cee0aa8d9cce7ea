use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

use crate::error::BrokerError;

/// Tracks live connections: which user each is bound to, which groups it has
/// joined, and the channel events are delivered through. The registry owns
/// connection state exclusively; everything here is ephemeral.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    conns: HashMap<Uuid, ConnEntry>,
    /// group_id -> connections subscribed to it
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

struct ConnEntry {
    user_id: Option<Uuid>,
    rooms: HashSet<Uuid>,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Create a connection entry with no bound user and no subscriptions.
    /// Returns the connection id and the receiver end of its event channel.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.conns.insert(
            conn_id,
            ConnEntry {
                user_id: None,
                rooms: HashSet::new(),
                tx,
            },
        );
        (conn_id, rx)
    }

    /// Bind a user identity to a connection.
    pub async fn identify(&self, conn_id: Uuid, user_id: Uuid) -> Result<(), BrokerError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .conns
            .get_mut(&conn_id)
            .ok_or(BrokerError::NotConnected)?;
        entry.user_id = Some(user_id);
        Ok(())
    }

    /// Subscribe a connection to a group. Joining twice is a no-op.
    pub async fn join(&self, conn_id: Uuid, group_id: Uuid) -> Result<(), BrokerError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .conns
            .get_mut(&conn_id)
            .ok_or(BrokerError::NotConnected)?;
        entry.rooms.insert(group_id);
        inner.rooms.entry(group_id).or_default().insert(conn_id);
        Ok(())
    }

    pub async fn leave(&self, conn_id: Uuid, group_id: Uuid) -> Result<(), BrokerError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .conns
            .get_mut(&conn_id)
            .ok_or(BrokerError::NotConnected)?;
        entry.rooms.remove(&group_id);
        if let Some(members) = inner.rooms.get_mut(&group_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.rooms.remove(&group_id);
            }
        }
        Ok(())
    }

    /// Remove the connection and every subscription it held, atomically.
    /// Returns the bound user, if any. Safe to call for an already-removed
    /// connection (cleanup must run exactly once but races are tolerated).
    pub async fn unregister(&self, conn_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.write().await;
        let entry = inner.conns.remove(&conn_id)?;
        for group_id in &entry.rooms {
            if let Some(members) = inner.rooms.get_mut(group_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    inner.rooms.remove(group_id);
                }
            }
        }
        entry.user_id
    }

    /// Snapshot of the connections currently subscribed to a group.
    pub async fn members_of(&self, group_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .rooms
            .get(&group_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The user bound to a connection. Outer error: unknown connection.
    pub async fn user_of(&self, conn_id: Uuid) -> Result<Option<Uuid>, BrokerError> {
        let inner = self.inner.read().await;
        let entry = inner.conns.get(&conn_id).ok_or(BrokerError::NotConnected)?;
        Ok(entry.user_id)
    }

    /// Clone of a connection's event sender, if it is still registered.
    pub async fn sender_of(&self, conn_id: Uuid) -> Option<mpsc::UnboundedSender<GatewayEvent>> {
        self.inner
            .read()
            .await
            .conns
            .get(&conn_id)
            .map(|entry| entry.tx.clone())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = Registry::new();
        let (conn, _rx) = registry.register().await;
        let group = Uuid::from_u128(7);

        registry.join(conn, group).await.unwrap();
        registry.join(conn, group).await.unwrap();

        assert_eq!(registry.members_of(group).await, vec![conn]);
    }

    #[tokio::test]
    async fn unregister_reclaims_all_subscriptions() {
        let registry = Registry::new();
        let (conn, _rx) = registry.register().await;
        let (user, group_a, group_b) = (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3));

        registry.identify(conn, user).await.unwrap();
        registry.join(conn, group_a).await.unwrap();
        registry.join(conn, group_b).await.unwrap();

        assert_eq!(registry.unregister(conn).await, Some(user));
        assert!(registry.members_of(group_a).await.is_empty());
        assert!(registry.members_of(group_b).await.is_empty());
        // Post-disconnect operations report NotConnected, not silence
        assert!(matches!(
            registry.join(conn, group_a).await,
            Err(BrokerError::NotConnected)
        ));
        assert!(matches!(
            registry.user_of(conn).await,
            Err(BrokerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn identify_unknown_connection_fails() {
        let registry = Registry::new();
        assert!(matches!(
            registry.identify(Uuid::new_v4(), Uuid::new_v4()).await,
            Err(BrokerError::NotConnected)
        ));
    }
}
