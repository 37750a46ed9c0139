// src/handlers/analytics.rs

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{auth::CallerIdentity, client_ip::ClientIp},
    models::analytics::{BackfillReport, DailyAnalyticsDocument, ScheduledReport},
    models::roles::Role,
    services::rate_limit::limits,
};

const JOB_SECRET_HEADER: &str = "x-job-secret";

fn parse_date_param(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput("date deve estar no formato YYYY-MM-DD.".into()))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsCheckParams {
    pub tenant_id: String,
    pub date: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTotals {
    pub total_revenue: Decimal,
    pub ticket_count: u32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsCheckResponse {
    pub date: String,
    pub fresh: AnalyticsTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<AnalyticsTotals>,
    pub matches: bool,
}

// GET /api/analytics/check
//
// Compara os totais recalculados com os armazenados. Nunca expõe o
// payload bruto dos upstreams, só agregados.
#[utoipa::path(
    get,
    path = "/api/analytics/check",
    tag = "Analytics",
    params(
        ("tenantId" = String, Query, description = "ID do tenant"),
        ("date" = String, Query, description = "Data alvo (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Comparação de totais", body = AnalyticsCheckResponse),
        (status = 403, description = "Papel insuficiente"),
        (status = 502, description = "Provedor obrigatório indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn check(
    State(app_state): State<AppState>,
    caller: CallerIdentity,
    ip: ClientIp,
    Query(params): Query<AnalyticsCheckParams>,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .guard
        .require_access(&caller.uid, &params.tenant_id, Role::Manager)
        .await?;
    app_state
        .rate_limiter
        .enforce("analytics_check", &ip.0, &caller.uid, limits::GATED_READ)
        .await?;

    let date = parse_date_param(&params.date)?;
    let built = app_state
        .aggregator
        .build_daily_document(&params.tenant_id, date)
        .await?;

    let stored = app_state
        .store
        .read_daily_doc(&built.path)
        .await?
        .and_then(|v| serde_json::from_value::<DailyAnalyticsDocument>(v).ok())
        .map(|doc| AnalyticsTotals {
            total_revenue: doc.revenue.total_revenue,
            ticket_count: doc.revenue.ticket_count,
        });

    let fresh = AnalyticsTotals {
        total_revenue: built.document.revenue.total_revenue,
        ticket_count: built.document.revenue.ticket_count,
    };
    let matches = stored
        .as_ref()
        .map(|s| s.total_revenue == fresh.total_revenue && s.ticket_count == fresh.ticket_count)
        .unwrap_or(false);

    Ok((
        StatusCode::OK,
        Json(AnalyticsCheckResponse { date: params.date, fresh, stored, matches }),
    ))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillPayload {
    #[validate(length(min = 1, max = 128))]
    pub tenant_id: String,
    pub from: String,
    pub to: String,
}

// POST /api/analytics/backfill
#[utoipa::path(
    post,
    path = "/api/analytics/backfill",
    tag = "Analytics",
    request_body = BackfillPayload,
    responses(
        (status = 200, description = "Relatório do backfill", body = BackfillReport),
        (status = 400, description = "Datas inválidas ou intervalo acima de 90 dias"),
        (status = 403, description = "Papel insuficiente"),
        (status = 409, description = "Backfill já em andamento para o tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn backfill(
    State(app_state): State<AppState>,
    caller: CallerIdentity,
    ip: ClientIp,
    Json(payload): Json<BackfillPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    app_state
        .guard
        .require_access(&caller.uid, &payload.tenant_id, Role::Manager)
        .await?;

    // Operação cara nos upstreams: janela apertada.
    app_state
        .rate_limiter
        .enforce("backfill", &ip.0, &caller.uid, limits::BACKFILL)
        .await?;

    let report = app_state
        .backfill
        .run(&payload.tenant_id, &payload.from, &payload.to)
        .await?;

    Ok((StatusCode::OK, Json(report)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBuildPayload {
    /// Default: ontem.
    pub date: Option<String>,
}

// POST /api/jobs/daily-build
//
// Disparado por um agendador externo com segredo compartilhado; não
// passa pelo middleware de JWT. Segredo errado recebe o mesmo 404 de
// um caminho inexistente.
#[utoipa::path(
    post,
    path = "/api/jobs/daily-build",
    tag = "Analytics",
    request_body = ScheduledBuildPayload,
    responses(
        (status = 200, description = "Relatório do build diário", body = ScheduledReport),
        (status = 404, description = "Recurso não encontrado"),
        (status = 503, description = "Segredo do job não configurado")
    )
)]
pub async fn scheduled_build(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScheduledBuildPayload>,
) -> Result<impl IntoResponse, AppError> {
    let provided = headers
        .get(JOB_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    app_state.scheduled.verify_secret(provided)?;

    let date = payload.date.as_deref().map(parse_date_param).transpose()?;
    let report = app_state.scheduled.run(date).await?;

    Ok((StatusCode::OK, Json(report)))
}
