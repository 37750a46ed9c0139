// src/models/analytics.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Versão do esquema do documento diário. Incrementada quando o formato
/// armazenado muda de forma incompatível.
pub const SCHEMA_VERSION: &str = "3";

/// Resumo diário da fonte obrigatória (POS).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_revenue: Decimal,
    pub ticket_count: u32,
    /// Receita por canal (salão, balcão, delivery...).
    #[serde(default)]
    pub channel_split: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub hourly: Vec<HourlyBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub hour: u8,
    pub revenue: Decimal,
    pub tickets: u32,
}

/// Agregado diário de escalas/presença (fonte opcional).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffingSummary {
    pub shift_count: u32,
    pub employee_count: u32,
    pub total_hours: Decimal,
}

/// Características do clima no dia (fonte opcional).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeatherFeatures {
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub precipitation_mm: f64,
    pub condition: String,
}

/// Contagem de alertas públicos no dia (fonte opcional).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertFeatures {
    pub alert_count: u32,
}

/// Estado de cada fonte no momento do build. `missing` nunca pode ser
/// confundido com um zero numérico: o bloco da fonte fica `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Missing,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueBlock {
    pub total_revenue: Decimal,
    pub ticket_count: u32,
    /// total / tickets, arredondado a 2 casas; 0 quando não houve tickets.
    pub average_check: Decimal,
    pub channel_split: BTreeMap<String, Decimal>,
    pub hourly: Vec<HourlyBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub schema_version: String,
    pub built_at: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceStatus>,
    pub api_versions: BTreeMap<String, String>,
}

/// O documento canônico de um dia, chaveado por (tenant, filial, data).
/// Escrito sempre por substituição integral — nunca merge parcial — o
/// que torna o rebuild de uma data idempotente em relação ao documento
/// armazenado.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalyticsDocument {
    pub date: NaiveDate,
    pub branch_id: String,
    pub revenue: RevenueBlock,
    pub staffing: Option<StaffingSummary>,
    pub weather: Option<WeatherFeatures>,
    pub alerts: Option<AlertFeatures>,
    pub calendar: crate::services::calendar::CalendarFeatures,
    pub meta: DocumentMeta,
}

/// Resultado de um build: o caminho determinístico e o documento. Quem
/// consome decide gravar (substituição integral) ou só comparar.
#[derive(Debug, Clone)]
pub struct BuiltDocument {
    pub path: String,
    pub document: DailyAnalyticsDocument,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkipEntry {
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub built: Vec<String>,
    pub skipped: Vec<SkipEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantSkipEntry {
    pub tenant_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReport {
    pub date: String,
    pub built: Vec<String>,
    pub skipped: Vec<TenantSkipEntry>,
}
