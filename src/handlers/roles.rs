// src/handlers/roles.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::CallerIdentity, client_ip::ClientIp},
    models::roles::{BootstrapOwnerPayload, RoleMutationResponse, UpdateRolePayload},
    services::rate_limit::limits,
};

// POST /api/tenants/bootstrap-owner
#[utoipa::path(
    post,
    path = "/api/tenants/bootstrap-owner",
    tag = "Roles",
    request_body = BootstrapOwnerPayload,
    responses(
        (status = 200, description = "Primeiro owner registrado", body = RoleMutationResponse),
        (status = 404, description = "Recurso não encontrado (feature inativa)"),
        (status = 409, description = "O tenant já possui um owner"),
        (status = 429, description = "Limite de requisições excedido"),
        (status = 503, description = "Armazenamento indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn bootstrap_owner(
    State(app_state): State<AppState>,
    caller: CallerIdentity,
    ip: ClientIp,
    Json(payload): Json<BootstrapOwnerPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    // Endpoint atrás de feature flag: inativo é indistinguível de
    // inexistente.
    if !app_state.features.owner_bootstrap {
        return Err(AppError::NotFound);
    }

    // Operação destrutiva: janela bem apertada, por IP e por uid.
    app_state
        .rate_limiter
        .enforce("bootstrap", &ip.0, &caller.uid, limits::BOOTSTRAP)
        .await?;

    app_state
        .mutations
        .bootstrap_owner(&caller.uid, &payload.tenant_id, &payload.uid)
        .await?;

    Ok((
        StatusCode::OK,
        Json(RoleMutationResponse {
            status: "ok",
            tenant_id: payload.tenant_id,
            target_uid: payload.uid,
            role: Some(crate::models::roles::Role::Owner),
        }),
    ))
}

// POST /api/tenants/roles
#[utoipa::path(
    post,
    path = "/api/tenants/roles",
    tag = "Roles",
    request_body = UpdateRolePayload,
    responses(
        (status = 200, description = "Papel atualizado", body = RoleMutationResponse),
        (status = 400, description = "Entrada malformada"),
        (status = 403, description = "Ator não é owner do tenant"),
        (status = 409, description = "Removeria o último owner")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_role(
    State(app_state): State<AppState>,
    caller: CallerIdentity,
    ip: ClientIp,
    Json(payload): Json<UpdateRolePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    app_state
        .rate_limiter
        .enforce("role_update", &ip.0, &caller.uid, limits::ROLE_UPDATE)
        .await?;

    app_state
        .mutations
        .update_role(&caller.uid, &payload.tenant_id, &payload.target_uid, payload.role)
        .await?;

    Ok((
        StatusCode::OK,
        Json(RoleMutationResponse {
            status: "ok",
            tenant_id: payload.tenant_id,
            target_uid: payload.target_uid,
            role: payload.role,
        }),
    ))
}
