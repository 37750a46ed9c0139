// src/providers/mod.rs

pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::models::analytics::{AlertFeatures, RevenueSummary, StaffingSummary, WeatherFeatures};

/// Falha de um provedor upstream: só o nome da fonte e um código
/// grosseiro de motivo (`timeout`, `network`, `http_503`,
/// `bad_payload`). Nunca carrega corpo de resposta.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub source: &'static str,
    pub reason: String,
}

impl ProviderError {
    pub fn new(source: &'static str, reason: impl Into<String>) -> Self {
        Self { source, reason: reason.into() }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Fonte obrigatória: o provedor de receita do POS. Falha aqui aborta o
/// build inteiro do documento diário.
#[async_trait]
pub trait RevenueSource: Send + Sync {
    async fn daily_summary(&self, branch: &str, date: NaiveDate)
        -> Result<RevenueSummary, ProviderError>;

    fn api_version(&self) -> &'static str;
}

/// Fonte opcional: escalas/presença de equipe.
#[async_trait]
pub trait StaffingSource: Send + Sync {
    async fn daily_staffing(&self, branch: &str, date: NaiveDate)
        -> Result<StaffingSummary, ProviderError>;

    fn api_version(&self) -> &'static str;
}

/// Fonte opcional: clima do dia.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn daily_weather(&self, date: NaiveDate) -> Result<WeatherFeatures, ProviderError>;

    fn api_version(&self) -> &'static str;
}

/// Fonte opcional: histórico público de alertas.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn daily_alerts(&self, date: NaiveDate) -> Result<AlertFeatures, ProviderError>;

    fn api_version(&self) -> &'static str;
}

/// Leituras proxiadas da superfície allow-listed (`/api/data/upstream`).
/// Cada variante corresponde a um caminho permitido, nunca a uma URL
/// arbitrária vinda do cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    PosDailySummary,
    PosHourly,
    ShiftsDaily,
}

#[async_trait]
pub trait ProxySource: Send + Sync {
    async fn fetch(
        &self,
        kind: UpstreamKind,
        branch: &str,
        date: NaiveDate,
    ) -> Result<Value, ProviderError>;
}
