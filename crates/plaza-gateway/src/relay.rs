use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use plaza_db::Database;
use plaza_types::events::{ClientCommand, SendMessagePayload, ServerEvent};
use plaza_types::ids::parse_id;
use plaza_types::models::Message;

use crate::dispatcher::Dispatcher;
use crate::registry::ConnectionHandle;

/// Lifecycle of one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Identified(Uuid),
    Disconnected,
}

/// Per-connection state owned by the socket's receive loop.
pub struct Session {
    conn: ConnectionHandle,
    state: ConnectionState,
}

impl Session {
    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn reply(&self, event: ServerEvent) {
        if !self.conn.send(event) {
            debug!("Connection {} closed before reply", self.conn.id());
        }
    }
}

/// Why a `send_message` was refused. The display text is what the sender sees.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Receiver not found")]
    RecipientNotFound,

    #[error("Invalid sender ID")]
    InvalidSender,

    #[error("Sender or receiver not found")]
    PartyNotFound,

    #[error("Failed to send message")]
    Persistence(#[source] anyhow::Error),
}

/// Presence and direct-message relay.
#[derive(Clone)]
pub struct Relay {
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

impl Relay {
    pub fn new(dispatcher: Dispatcher, db: Arc<Database>) -> Self {
        Self { dispatcher, db }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Start a session for a freshly accepted connection.
    pub fn open_session(&self) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn, rx) = ConnectionHandle::open();
        (
            Session {
                conn,
                state: ConnectionState::Connecting,
            },
            rx,
        )
    }

    pub async fn handle_command(&self, session: &mut Session, cmd: ClientCommand) {
        if session.state == ConnectionState::Disconnected {
            return;
        }

        match cmd {
            ClientCommand::UserConnected(claimed) => {
                self.handle_identify(session, &claimed).await;
            }
            ClientCommand::SendMessage(payload) => {
                let _ = self.handle_send_message(session, payload).await;
            }
        }
    }

    /// Bind the session to `claimed_user_id`, announce it, and reply with who
    /// else is online. A malformed id is refused with `identify_error`.
    pub async fn handle_identify(&self, session: &mut Session, claimed_user_id: &str) -> Option<Uuid> {
        let Some(user_id) = parse_id(claimed_user_id) else {
            warn!(
                "Connection {} sent invalid user id '{}'",
                session.conn.id(),
                claimed_user_id.chars().take(64).collect::<String>()
            );
            session.reply(ServerEvent::IdentifyError {
                error: "Invalid user ID".into(),
            });
            return None;
        };

        // Re-identifying as someone else releases the previous identity first.
        if let ConnectionState::Identified(previous) = session.state {
            if previous != user_id {
                self.dispatcher.user_offline(session.conn.id()).await;
            }
        }

        let displaced = self.dispatcher.user_online(user_id, session.conn.clone()).await;
        if let Some(old) = displaced.filter(|old| old.id() != session.conn.id()) {
            info!("{} reconnected, replacing connection {}", user_id, old.id());
        }
        session.state = ConnectionState::Identified(user_id);
        info!("{} identified on connection {}", user_id, session.conn.id());

        session.reply(ServerEvent::UsersOnline(self.dispatcher.online_users().await));
        Some(user_id)
    }

    /// Validate, persist and deliver a direct message. Failures are reported
    /// to this session only, as `message_error`.
    pub async fn handle_send_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> Result<Message, RelayError> {
        match self.relay_message(session, payload).await {
            Ok(message) => Ok(message),
            Err(e) => {
                match &e {
                    RelayError::Persistence(cause) => {
                        error!("Connection {}: message not stored: {:#}", session.conn.id(), cause)
                    }
                    other => warn!("Connection {}: send_message rejected: {}", session.conn.id(), other),
                }
                session.reply(ServerEvent::MessageError { error: e.to_string() });
                Err(e)
            }
        }
    }

    /// Transport closed: release the identity this connection held, if any.
    pub async fn handle_disconnect(&self, session: &mut Session) -> Option<Uuid> {
        session.state = ConnectionState::Disconnected;
        let user_id = self.dispatcher.user_offline(session.conn.id()).await;
        match user_id {
            Some(user_id) => info!("{} disconnected (connection {})", user_id, session.conn.id()),
            None => debug!("Connection {} closed", session.conn.id()),
        }
        user_id
    }

    async fn relay_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> Result<Message, RelayError> {
        let (sender_raw, receiver_raw, content) = match payload {
            SendMessagePayload {
                sender_id: Some(s),
                receiver_id: Some(r),
                content: Some(c),
            } if !s.trim().is_empty() && !r.trim().is_empty() && !c.trim().is_empty() => (s, r, c),
            _ => return Err(RelayError::MissingFields),
        };

        let receiver_id = self.resolve_recipient(receiver_raw.trim()).await?;
        let sender_id = parse_id(&sender_raw).ok_or(RelayError::InvalidSender)?;

        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        let both_exist = self
            .db
            .call(move |db| Ok(db.user_exists(&sender)? && db.user_exists(&receiver)?))
            .await
            .map_err(RelayError::Persistence)?;
        if !both_exist {
            return Err(RelayError::PartyNotFound);
        }

        let message_id = Uuid::new_v4().to_string();
        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        let message: Message = self
            .db
            .call(move |db| db.insert_message(&message_id, &sender, &receiver, &content))
            .await
            .map_err(RelayError::Persistence)?
            .into();

        // Stored; now best-effort delivery. The receiver may have left meanwhile.
        if self
            .dispatcher
            .send_to_user(receiver_id, ServerEvent::ReceiveMessage(message.clone()))
            .await
        {
            debug!("Message {} delivered to {}", message.id, receiver_id);
        } else {
            debug!("Message {} stored, {} is offline", message.id, receiver_id);
        }

        session.reply(ServerEvent::SentMessage(message.clone()));
        Ok(message)
    }

    /// An id-shaped value is taken as-is; anything else is looked up as a username.
    async fn resolve_recipient(&self, raw: &str) -> Result<Uuid, RelayError> {
        if let Some(id) = parse_id(raw) {
            return Ok(id);
        }

        let username = raw.to_string();
        let row = self
            .db
            .call(move |db| db.get_user_by_username(&username))
            .await
            .map_err(RelayError::Persistence)?;

        row.and_then(|user| user.id.parse().ok())
            .ok_or(RelayError::RecipientNotFound)
    }
}
