pub mod auth;
pub mod error;
pub mod fanout;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod state;
pub mod users;
mod views;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// All `/api` routes. Everything except signup and login needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/users/profile/{username}", get(users::get_profile))
        .route("/api/users/suggested", get(users::suggested_users))
        .route("/api/users/follow/{id}", post(users::follow_unfollow))
        .route("/api/users/update", post(users::update_profile))
        .route("/api/posts/all", get(posts::all_posts))
        .route("/api/posts/following", get(posts::following_posts))
        .route("/api/posts/likes/{id}", get(posts::liked_posts))
        .route("/api/posts/user/{username}", get(posts::user_posts))
        .route("/api/posts/create", post(posts::create_post))
        .route("/api/posts/like/{id}", post(posts::like_unlike))
        .route("/api/posts/comment/{id}", post(posts::comment_on_post))
        .route("/api/posts/comment/{id}/{comment_id}", delete(posts::delete_comment))
        .route("/api/posts/{id}", delete(posts::delete_post))
        .route(
            "/api/notifications",
            get(notifications::get_notifications).delete(notifications::delete_notifications),
        )
        .route("/api/notifications/{id}", delete(notifications::delete_notification))
        .route("/api/messages/{id}", get(messages::get_conversation))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
