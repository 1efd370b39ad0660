use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use plaza_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest, UserProfile};
use plaza_types::ids::{is_valid_email, is_valid_username};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views;

pub const MIN_PASSWORD_LEN: usize = 6;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let full_name = req.full_name.trim().to_string();
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if full_name.is_empty() {
        return Err(ApiError::bad_request("Full name is required"));
    }
    if !is_valid_username(&username) {
        return Err(ApiError::bad_request(
            "Username must be 3-32 letters, digits, '.', '_' or '-'",
        ));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let (u, e) = (username.clone(), email.clone());
    let (username_taken, email_taken) = state
        .db
        .call(move |db| {
            Ok((
                db.get_user_by_username(&u)?.is_some(),
                db.get_user_by_email(&e)?.is_some(),
            ))
        })
        .await?;
    if username_taken {
        return Err(ApiError::bad_request("Username is already taken"));
    }
    if email_taken {
        return Err(ApiError::bad_request("Email is already taken"));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let profile = state
        .db
        .call(move |db| {
            let id = user_id.to_string();
            db.create_user(&id, &username, &email, &full_name, &password_hash)?;
            let row = db
                .get_user_by_id(&id)?
                .ok_or_else(|| anyhow!("user {} missing after insert", id))?;
            views::load_profile(db, row)
        })
        .await
        .map_err(ApiError::from_user_write)?;

    let token = create_token(&state, user_id, &profile.username)?;
    tracing::info!("New user {} ({})", profile.username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: profile,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".into());

    let username = req.username.trim().to_string();
    let user = state
        .db
        .call(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password)? {
        return Err(invalid());
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let token = create_token(&state, user_id, &user.username)?;

    let profile = state.db.call(move |db| views::load_profile(db, user)).await?;

    Ok(Json(AuthResponse {
        user: profile,
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserProfile>> {
    let id = claims.sub.to_string();
    let profile = state
        .db
        .call(move |db| match db.get_user_by_id(&id)? {
            Some(row) => views::load_profile(db, row).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(profile))
}

/// Argon2id PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hashing failed: {}", e))
}

/// False on mismatch; Err only if the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn create_token(state: &AppState, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}
