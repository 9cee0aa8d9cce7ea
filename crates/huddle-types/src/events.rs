use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent from the server to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms the connection is bound to an identity.
    Ready { user_id: Uuid, display_name: String },

    /// A message was persisted and is being fanned out to the group.
    /// `display_name`/`is_anonymous` carry the projection resolved at send
    /// time; anonymity toggles never rewrite history.
    NewMessage {
        id: i64,
        group_id: Uuid,
        user_id: Uuid,
        text: String,
        created_at: DateTime<Utc>,
        display_name: String,
        is_anonymous: bool,
        avatar_url: Option<String>,
    },

    /// A member started or stopped typing.
    UserTyping {
        group_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
        display_name: String,
    },

    /// A send failed; delivered to the originating connection only.
    MessageError { error: String },
}

/// Commands sent from a client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Bind a previously issued identity to this connection.
    Identify { user_id: Uuid },

    /// Subscribe to a group's events. Idempotent.
    JoinGroup { group_id: Uuid },

    /// Drop the subscription to a group.
    LeaveGroup { group_id: Uuid },

    /// Persist and broadcast a message. `anonymous` is the per-send
    /// anonymity override.
    SendMessage {
        group_id: Uuid,
        text: String,
        #[serde(default)]
        anonymous: bool,
    },

    /// Typing signal. `display_name` is resolved client-side at signal time
    /// from the sender's current anonymity toggle.
    Typing {
        group_id: Uuid,
        is_typing: bool,
        display_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_kebab_case_tags() {
        let event = GatewayEvent::UserTyping {
            group_id: Uuid::from_u128(1),
            user_id: Uuid::from_u128(2),
            is_typing: true,
            display_name: "Alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user-typing");
        assert_eq!(json["data"]["is_typing"], true);
    }

    #[test]
    fn send_message_anonymous_defaults_false() {
        let raw = r#"{"type":"send-message","data":{"group_id":"00000000-0000-0000-0000-000000000001","text":"hi"}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            GatewayCommand::SendMessage { anonymous, text, .. } => {
                assert!(!anonymous);
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
