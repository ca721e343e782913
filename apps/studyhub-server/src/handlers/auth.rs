use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studyhub_membership::{validate::normalize_email, NewUser};
use studyhub_storage::{Store, StoreError};
use validator::Validate;

use super::UserView;
use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let passwords = state.passwords.clone();
    let password = req.password;
    // Hashing is CPU-bound; run it on the blocking pool.
    let password_hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;

    let user = state
        .engine
        .register_user(NewUser {
            email: req.email,
            name: req.name,
            password_hash,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let user = match state.engine.store().get_user_by_email(&email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    let passwords = state.passwords.clone();
    let phc = user.password_hash.clone();
    let password = req.password;
    let matches = tokio::task::spawn_blocking(move || passwords.verify(&password, &phc))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;
    if !matches {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state.tokens.issue(&user.id).map_err(ApiError::internal)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: user.into(),
    }))
}
