use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use plaza_types::events::ServerEvent;

use crate::registry::{ConnectionHandle, IdentityRegistry};

/// Presence broadcasts plus targeted delivery through the identity registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every open connection receives every broadcast, identified or not
    broadcast_tx: broadcast::Sender<ServerEvent>,

    registry: IdentityRegistry,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                registry: IdentityRegistry::new(),
            }),
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.inner.registry
    }

    /// Subscribe to broadcast events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Send a targeted event to a user's current connection. Returns false if
    /// the user is offline or the connection already went away.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.inner.registry.lookup(user_id).await {
            Some(conn) => conn.send(event),
            None => false,
        }
    }

    /// Register `conn` as the user's live connection and announce it.
    /// Returns the connection it displaced, if any.
    pub async fn user_online(&self, user_id: Uuid, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        let displaced = self.inner.registry.register(user_id, conn).await;
        self.broadcast(ServerEvent::UserConnected(user_id));
        displaced
    }

    /// Drop whichever user `conn_id` was serving and announce it.
    /// Nothing happens if the connection never identified or was displaced.
    pub async fn user_offline(&self, conn_id: Uuid) -> Option<Uuid> {
        let user_id = self.inner.registry.unregister(conn_id).await?;
        self.broadcast(ServerEvent::UserDisconnected(user_id));
        Some(user_id)
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.registry.list_online().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn online_and_offline_are_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();
        let user = Uuid::new_v4();
        let (conn, _rx) = ConnectionHandle::open();

        dispatcher.user_online(user, conn.clone()).await;
        assert_eq!(events.recv().await.unwrap(), ServerEvent::UserConnected(user));

        assert_eq!(dispatcher.user_offline(conn.id()).await, Some(user));
        assert_eq!(events.recv().await.unwrap(), ServerEvent::UserDisconnected(user));
    }

    #[tokio::test]
    async fn offline_for_unknown_connection_broadcasts_nothing() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();

        assert_eq!(dispatcher.user_offline(Uuid::new_v4()).await, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn targeted_send_reaches_only_the_online_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn, mut rx) = ConnectionHandle::open();
        dispatcher.user_online(user, conn).await;

        let event = ServerEvent::UsersOnline(vec![user]);
        assert!(dispatcher.send_to_user(user, event.clone()).await);
        assert_eq!(rx.recv().await, Some(event));

        assert!(!dispatcher.send_to_user(Uuid::new_v4(), ServerEvent::UsersOnline(vec![])).await);
    }
}
