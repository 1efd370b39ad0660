use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use plaza_db::Database;
use plaza_gateway::dispatcher::Dispatcher;
use plaza_types::events::ServerEvent;
use plaza_types::models::NotificationKind;

/// Side effects of follow/like/comment: a notification record, then an
/// advisory push to the owner's live connection.
///
/// Runs after the primary write has committed and never fails the caller;
/// problems are logged only.
#[derive(Clone)]
pub struct Fanout {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Fanout {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Returns true if a notification record was stored.
    pub async fn notify(
        &self,
        actor: Uuid,
        owner: Uuid,
        kind: NotificationKind,
        post_id: Option<Uuid>,
    ) -> bool {
        if actor == owner {
            debug!("Skipping self-{} notification for {}", kind, actor);
            return false;
        }

        let id = Uuid::new_v4().to_string();
        let (from, to) = (actor.to_string(), owner.to_string());
        let post = post_id.map(|p| p.to_string());
        let stored = self
            .db
            .call(move |db| db.insert_notification(&id, &from, &to, kind, post.as_deref()))
            .await;
        if let Err(e) = stored {
            error!("Failed to store {} notification {} -> {}: {:#}", kind, actor, owner, e);
            return false;
        }

        let pushed = self
            .dispatcher
            .send_to_user(
                owner,
                ServerEvent::NewNotification {
                    kind,
                    from: actor,
                    post_id,
                },
            )
            .await;
        debug!(
            "{} notification {} -> {} stored (pushed: {})",
            kind, actor, owner, pushed
        );
        true
    }
}
