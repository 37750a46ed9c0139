// src/handlers/upstream.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use utoipa::ToSchema;

use crate::{
    common::clock::Clock,
    common::error::AppError,
    config::AppState,
    middleware::{auth::CallerIdentity, client_ip::ClientIp},
    models::roles::Role,
    providers::UpstreamKind,
    services::rate_limit::limits,
};

/// Superfície allow-listed de leitura proxiada: caminho conhecido, papel
/// mínimo e whitelist de campos da resposta. Nada fora desta tabela
/// chega aos upstreams.
struct UpstreamRoute {
    path: &'static str,
    min_role: Role,
    kind: UpstreamKind,
    fields: &'static [&'static str],
}

const UPSTREAM_ROUTES: &[UpstreamRoute] = &[
    UpstreamRoute {
        path: "pos/daily-summary",
        min_role: Role::Manager,
        kind: UpstreamKind::PosDailySummary,
        fields: &["date", "totalRevenue", "ticketCount", "channelSplit"],
    },
    UpstreamRoute {
        path: "pos/hourly",
        min_role: Role::Manager,
        kind: UpstreamKind::PosHourly,
        fields: &["date", "hourly"],
    },
    UpstreamRoute {
        path: "shifts/daily",
        min_role: Role::ShiftManager,
        kind: UpstreamKind::ShiftsDaily,
        fields: &["date", "shiftCount", "employeeCount", "totalHours"],
    },
];

/// Mantém só os campos da whitelist; qualquer outra coisa do upstream
/// morre aqui.
fn whitelist_fields(payload: Value, fields: &[&str]) -> Value {
    let mut out = serde_json::Map::new();
    if let Value::Object(map) = payload {
        for (key, value) in map {
            if fields.contains(&key.as_str()) {
                out.insert(key, value);
            }
        }
    }
    Value::Object(out)
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamReadParams {
    pub tenant_id: String,
    pub path: String,
    pub date: String,
}

// GET /api/data/upstream
#[utoipa::path(
    get,
    path = "/api/data/upstream",
    tag = "Data",
    params(
        ("tenantId" = String, Query, description = "ID do tenant"),
        ("path" = String, Query, description = "Caminho allow-listed (ex.: pos/daily-summary)"),
        ("date" = String, Query, description = "Data alvo (YYYY-MM-DD)")
    ),
    responses(
        (status = 200, description = "Resposta com campos da whitelist apenas"),
        (status = 400, description = "Caminho desconhecido ou data inválida"),
        (status = 403, description = "Papel insuficiente"),
        (status = 502, description = "Upstream falhou")
    ),
    security(("api_jwt" = []))
)]
pub async fn gated_read(
    State(app_state): State<AppState>,
    caller: CallerIdentity,
    ip: ClientIp,
    Query(params): Query<UpstreamReadParams>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Caminho precisa estar na allowlist antes de qualquer coisa.
    let route = UPSTREAM_ROUTES
        .iter()
        .find(|r| r.path == params.path)
        .ok_or_else(|| AppError::InvalidInput("Caminho upstream desconhecido.".into()))?;

    // 2. Autorização pelo papel mínimo do caminho; depois o limite.
    app_state
        .guard
        .require_access(&caller.uid, &params.tenant_id, route.min_role)
        .await?;
    app_state
        .rate_limiter
        .enforce("gated_read", &ip.0, &caller.uid, limits::GATED_READ)
        .await?;

    let date = NaiveDate::parse_from_str(&params.date, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput("date deve estar no formato YYYY-MM-DD.".into()))?;

    // 3. Busca proxiada e filtragem de campos.
    let branch = app_state.store.branch_id(&params.tenant_id).await?;
    let payload = app_state
        .proxy
        .fetch(route.kind, &branch, date)
        .await
        .map_err(|e| AppError::Upstream { origin: e.source, reason: e.reason })?;

    Ok((StatusCode::OK, Json(whitelist_fields(payload, route.fields))))
}

/// Cache soft da resposta do endpoint público de alertas. Explícito e
/// descartável: perder o conteúdo num restart não tem consequência.
pub struct AlertStatusCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<(DateTime<Utc>, Value)>>,
}

impl AlertStatusCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { ttl, clock, slot: Mutex::new(None) }
    }

    pub fn get(&self) -> Option<Value> {
        let slot = self.slot.lock().unwrap();
        let (cached_at, value) = slot.as_ref()?;
        let age = self.clock.now().signed_duration_since(*cached_at);
        if age.num_milliseconds() < self.ttl.as_millis() as i64 {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn put(&self, value: Value) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some((self.clock.now(), value));
    }
}

// GET /api/public/alert-status
//
// O único endpoint público de leitura: estado de alertas do dia, atrás
// de um cache curto em processo.
#[utoipa::path(
    get,
    path = "/api/public/alert-status",
    tag = "Data",
    responses(
        (status = 200, description = "Contagem de alertas do dia"),
        (status = 502, description = "Provedor de alertas indisponível")
    )
)]
pub async fn public_alert_status(
    State(app_state): State<AppState>,
    ip: ClientIp,
) -> Result<impl IntoResponse, AppError> {
    app_state
        .rate_limiter
        .enforce("public_read", &ip.0, "anonymous", limits::PUBLIC_READ)
        .await?;

    if let Some(cached) = app_state.alert_cache.get() {
        return Ok((StatusCode::OK, Json(cached)));
    }

    let today = app_state.clock.now().date_naive();
    let alerts = app_state
        .alerts
        .daily_alerts(today)
        .await
        .map_err(|e| AppError::Upstream { origin: e.source, reason: e.reason })?;

    let body = json!({
        "date": today.format("%Y-%m-%d").to_string(),
        "alertCount": alerts.alert_count,
    });
    app_state.alert_cache.put(body.clone());

    Ok((StatusCode::OK, Json(body)))
}
