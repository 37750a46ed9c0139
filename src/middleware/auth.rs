// src/middleware/auth.rs

use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{common::error::AppError, config::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Identidade verificada do chamador. O núcleo só consome o uid; papéis
/// nunca vêm de claims — são relidos do armazenamento a cada request.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub uid: String,
}

/// Middleware de autenticação: valida o Bearer token e injeta a
/// identidade nos extensions da requisição.
pub async fn auth_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok());

    let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return Err(AppError::Unauthorized);
    };

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(app_state.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::Unauthorized)?;

    if data.claims.sub.is_empty() {
        return Err(AppError::Unauthorized);
    }

    request
        .extensions_mut()
        .insert(CallerIdentity { uid: data.claims.sub });
    Ok(next.run(request).await)
}

// Extrator para obter a identidade diretamente nos handlers.
impl<S> axum::extract::FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
