use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, NotificationKind};

/// Events sent FROM server TO clients over the gateway.
/// Wire shape: `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A user identified on some connection (broadcast)
    UserConnected(Uuid),

    /// Snapshot of online users, sent to the connection that just identified
    UsersOnline(Vec<Uuid>),

    /// Identify was rejected
    IdentifyError { error: String },

    /// A direct message addressed to this connection's user
    ReceiveMessage(Message),

    /// Echo of a message this connection sent, as persisted
    SentMessage(Message),

    /// A send_message command was rejected
    MessageError { error: String },

    /// A user's connection went away (broadcast)
    UserDisconnected(Uuid),

    /// Advisory push for a freshly created notification record
    #[serde(rename_all = "camelCase")]
    NewNotification {
        kind: NotificationKind,
        from: Uuid,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        post_id: Option<Uuid>,
    },
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Claim a user id for this connection
    UserConnected(String),

    /// Send a direct message
    SendMessage(SendMessagePayload),
}

/// Fields are optional on the wire so a missing one is reported back to the
/// sender instead of failing the whole frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(default)]
    pub sender_id: Option<String>,
    /// User id or username
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identify_command() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"event":"user_connected","data":"abc"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::UserConnected("abc".into()));
    }

    #[test]
    fn send_message_tolerates_missing_fields() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"event":"send_message","data":{"senderId":"x"}}"#).unwrap();
        let ClientCommand::SendMessage(payload) = cmd else {
            panic!("expected send_message");
        };
        assert_eq!(payload.sender_id.as_deref(), Some("x"));
        assert!(payload.receiver_id.is_none());
        assert!(payload.content.is_none());
    }

    #[test]
    fn server_events_use_event_and_data_keys() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ServerEvent::UserDisconnected(id)).unwrap();
        assert_eq!(json["event"], "user_disconnected");
        assert_eq!(json["data"], id.to_string());

        let json = serde_json::to_value(ServerEvent::MessageError { error: "nope".into() }).unwrap();
        assert_eq!(json["event"], "message_error");
        assert_eq!(json["data"]["error"], "nope");
    }

    #[test]
    fn notification_push_omits_missing_post() {
        let json = serde_json::to_value(ServerEvent::NewNotification {
            kind: NotificationKind::Follow,
            from: Uuid::new_v4(),
            post_id: None,
        })
        .unwrap();
        assert_eq!(json["data"]["kind"], "follow");
        assert!(json["data"].get("postId").is_none());
    }
}
