use uuid::Uuid;

use huddle_types::events::GatewayEvent;

use crate::registry::Registry;

/// Publish/subscribe primitive over the registry: delivers an event to every
/// connection subscribed to a group without knowing the individual sockets.
/// Each delivery is independent — a dead or slow connection never blocks the
/// rest. A connection that disconnects concurrently with the snapshot may
/// still receive one stray event, which is acceptable best-effort semantics.
#[derive(Clone)]
pub struct RoomFanout {
    registry: Registry,
}

impl RoomFanout {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub async fn publish(&self, group_id: Uuid, event: GatewayEvent) {
        self.deliver(group_id, event, None).await;
    }

    /// Typing-event variant: everyone in the group except the origin.
    pub async fn publish_excluding(&self, group_id: Uuid, event: GatewayEvent, excluded: Uuid) {
        self.deliver(group_id, event, Some(excluded)).await;
    }

    /// Targeted delivery to a single connection (error reporting).
    pub async fn send_to(&self, conn_id: Uuid, event: GatewayEvent) {
        if let Some(tx) = self.registry.sender_of(conn_id).await {
            let _ = tx.send(event);
        }
    }

    async fn deliver(&self, group_id: Uuid, event: GatewayEvent, excluded: Option<Uuid>) {
        for conn_id in self.registry.members_of(group_id).await {
            if Some(conn_id) == excluded {
                continue;
            }
            if let Some(tx) = self.registry.sender_of(conn_id).await {
                let _ = tx.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing_event(user: Uuid) -> GatewayEvent {
        GatewayEvent::UserTyping {
            group_id: Uuid::from_u128(1),
            user_id: user,
            is_typing: true,
            display_name: "Alice".into(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_all_members_and_only_members() {
        let registry = Registry::new();
        let fanout = RoomFanout::new(registry.clone());
        let group = Uuid::from_u128(1);

        let (conn_a, mut rx_a) = registry.register().await;
        let (conn_b, mut rx_b) = registry.register().await;
        let (_conn_c, mut rx_c) = registry.register().await;
        registry.join(conn_a, group).await.unwrap();
        registry.join(conn_b, group).await.unwrap();
        // conn_c never joins

        fanout.publish(group, typing_event(Uuid::from_u128(9))).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_excluding_skips_the_origin() {
        let registry = Registry::new();
        let fanout = RoomFanout::new(registry.clone());
        let group = Uuid::from_u128(1);

        let (conn_a, mut rx_a) = registry.register().await;
        let (conn_b, mut rx_b) = registry.register().await;
        registry.join(conn_a, group).await.unwrap();
        registry.join(conn_b, group).await.unwrap();

        fanout
            .publish_excluding(group, typing_event(Uuid::from_u128(9)), conn_a)
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block_others() {
        let registry = Registry::new();
        let fanout = RoomFanout::new(registry.clone());
        let group = Uuid::from_u128(1);

        let (conn_a, rx_a) = registry.register().await;
        let (conn_b, mut rx_b) = registry.register().await;
        registry.join(conn_a, group).await.unwrap();
        registry.join(conn_b, group).await.unwrap();
        drop(rx_a);

        fanout.publish(group, typing_event(Uuid::from_u128(9))).await;

        assert!(rx_b.try_recv().is_ok());
    }
}
