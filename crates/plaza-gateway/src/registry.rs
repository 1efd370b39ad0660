use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use plaza_types::events::ServerEvent;

/// Outbound half of one realtime connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// New connection with a fresh id. The receiver feeds the socket writer.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event for this connection. Returns false if it already closed.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Presence table: at most one live connection per user id.
///
/// In-memory and per-process; entries are lost on restart.
#[derive(Clone, Default)]
pub struct IdentityRegistry {
    entries: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `user_id`. Returns the displaced connection.
    pub async fn register(&self, user_id: Uuid, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.write().await.insert(user_id, conn)
    }

    /// Remove whichever user currently maps to `conn_id`, if any.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<Uuid> {
        let mut entries = self.entries.write().await;
        let user_id = entries
            .iter()
            .find(|(_, conn)| conn.id == conn_id)
            .map(|(user_id, _)| *user_id)?;
        entries.remove(&user_id);
        Some(user_id)
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.entries.read().await.get(&user_id).cloned()
    }

    pub async fn list_online(&self) -> Vec<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[tokio::test]
    async fn register_lookup_and_list() {
        let registry = IdentityRegistry::new();
        let (alice_conn, _rx1) = ConnectionHandle::open();
        let (bob_conn, _rx2) = ConnectionHandle::open();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(registry.register(alice, alice_conn.clone()).await.is_none());
        assert!(registry.register(bob, bob_conn).await.is_none());

        assert_eq!(registry.lookup(alice).await.map(|c| c.id()), Some(alice_conn.id()));
        let online: HashSet<Uuid> = registry.list_online().await.into_iter().collect();
        assert_eq!(online, HashSet::from([alice, bob]));
    }

    #[tokio::test]
    async fn reconnect_overwrites_and_stale_unregister_is_ignored() {
        let registry = IdentityRegistry::new();
        let user = Uuid::new_v4();
        let (old, _rx1) = ConnectionHandle::open();
        let (new, _rx2) = ConnectionHandle::open();

        registry.register(user, old.clone()).await;
        let displaced = registry.register(user, new.clone()).await;
        assert_eq!(displaced.map(|c| c.id()), Some(old.id()));

        // The old socket closing must not knock the user offline.
        assert_eq!(registry.unregister(old.id()).await, None);
        assert_eq!(registry.lookup(user).await.map(|c| c.id()), Some(new.id()));

        assert_eq!(registry.unregister(new.id()).await, Some(user));
        assert!(registry.lookup(user).await.is_none());
    }

    #[tokio::test]
    async fn unregister_unknown_connection_is_a_noop() {
        let registry = IdentityRegistry::new();
        let user = Uuid::new_v4();
        let (conn, _rx) = ConnectionHandle::open();
        registry.register(user, conn).await;

        assert_eq!(registry.unregister(Uuid::new_v4()).await, None);
        assert_eq!(registry.list_online().await, vec![user]);
    }

    #[tokio::test]
    async fn send_reports_closed_connections() {
        let (conn, rx) = ConnectionHandle::open();
        assert!(conn.send(ServerEvent::UsersOnline(vec![])));
        drop(rx);
        assert!(!conn.send(ServerEvent::UsersOnline(vec![])));
    }
}
