pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use plaza_api::state::AppStateInner;
use plaza_db::Database;
use plaza_gateway::connection;
use plaza_gateway::dispatcher::Dispatcher;
use plaza_gateway::relay::Relay;

use crate::config::Config;

/// REST routes under `/api` plus the realtime gateway at `/gateway`, sharing
/// one database and one presence dispatcher.
pub fn app(db: Arc<Database>, config: &Config) -> Router {
    let dispatcher = Dispatcher::new();
    let api_state = AppStateInner::new(
        db.clone(),
        dispatcher.clone(),
        config.jwt_secret.clone(),
        config.token_ttl,
    );
    let relay = Relay::new(dispatcher, db);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(relay);

    Router::new()
        .merge(plaza_api::router(api_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(relay): State<Relay>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, relay))
}
