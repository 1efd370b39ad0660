use std::sync::Arc;

use plaza_db::Database;
use plaza_gateway::dispatcher::Dispatcher;

use crate::fanout::Fanout;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub fanout: Fanout,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        jwt_secret: String,
        token_ttl: chrono::Duration,
    ) -> AppState {
        Arc::new(Self {
            fanout: Fanout::new(db.clone(), dispatcher),
            db,
            jwt_secret,
            token_ttl,
        })
    }
}
