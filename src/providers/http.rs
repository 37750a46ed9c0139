// src/providers/http.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

use crate::models::analytics::{AlertFeatures, RevenueSummary, StaffingSummary, WeatherFeatures};
use crate::providers::{
    AlertSource, ProviderError, ProxySource, RevenueSource, StaffingSource, UpstreamKind,
    WeatherSource,
};

// Orçamento de tempo por fonte. Estourar vira falha tipada `timeout`,
// nunca uma espera indefinida.
const POS_TIMEOUT: Duration = Duration::from_secs(8);
const SHIFTS_TIMEOUT: Duration = Duration::from_secs(8);
const WEATHER_TIMEOUT: Duration = Duration::from_secs(6);
const ALERTS_TIMEOUT: Duration = Duration::from_secs(4);

/// Clientes HTTP dos quatro provedores upstream. Uma instância única,
/// clonável, compartilhando o pool de conexões do reqwest.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    pos_base: String,
    shifts_base: String,
    weather_base: String,
    alerts_base: String,
}

impl HttpUpstream {
    pub fn new(
        pos_base: String,
        shifts_base: String,
        weather_base: String,
        alerts_base: String,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, pos_base, shifts_base, weather_base, alerts_base })
    }

    /// GET + parse JSON com classificação grosseira da falha. O corpo
    /// da resposta nunca aparece em logs nem em erros.
    async fn get_json(
        &self,
        source: &'static str,
        url: String,
        timeout: Duration,
    ) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(source, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::new(source, format!("http_{}", status.as_u16())));
        }

        response
            .json::<Value>()
            .await
            .map_err(|_| ProviderError::new(source, "bad_payload"))
    }
}

fn classify(source: &'static str, e: &reqwest::Error) -> ProviderError {
    let reason = if e.is_timeout() { "timeout" } else { "network" };
    ProviderError::new(source, reason)
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    source: &'static str,
    value: Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|_| ProviderError::new(source, "bad_payload"))
}

#[async_trait]
impl RevenueSource for HttpUpstream {
    async fn daily_summary(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<RevenueSummary, ProviderError> {
        let url = format!(
            "{}/v1/branches/{}/daily-summary?date={}",
            self.pos_base, branch, date
        );
        let payload = self.get_json("pos", url, POS_TIMEOUT).await?;
        parse_payload("pos", payload)
    }

    fn api_version(&self) -> &'static str {
        "v1"
    }
}

#[async_trait]
impl StaffingSource for HttpUpstream {
    async fn daily_staffing(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<StaffingSummary, ProviderError> {
        let url = format!(
            "{}/v1/branches/{}/shifts/daily?date={}",
            self.shifts_base, branch, date
        );
        let payload = self.get_json("shifts", url, SHIFTS_TIMEOUT).await?;
        parse_payload("shifts", payload)
    }

    fn api_version(&self) -> &'static str {
        "v1"
    }
}

#[async_trait]
impl WeatherSource for HttpUpstream {
    async fn daily_weather(&self, date: NaiveDate) -> Result<WeatherFeatures, ProviderError> {
        let url = format!("{}/v1/daily?date={}", self.weather_base, date);
        let payload = self.get_json("weather", url, WEATHER_TIMEOUT).await?;
        parse_payload("weather", payload)
    }

    fn api_version(&self) -> &'static str {
        "v1"
    }
}

#[async_trait]
impl AlertSource for HttpUpstream {
    async fn daily_alerts(&self, date: NaiveDate) -> Result<AlertFeatures, ProviderError> {
        let url = format!("{}/v1/history?date={}", self.alerts_base, date);
        let payload = self.get_json("alerts", url, ALERTS_TIMEOUT).await?;
        parse_payload("alerts", payload)
    }

    fn api_version(&self) -> &'static str {
        "v1"
    }
}

#[async_trait]
impl ProxySource for HttpUpstream {
    async fn fetch(
        &self,
        kind: UpstreamKind,
        branch: &str,
        date: NaiveDate,
    ) -> Result<Value, ProviderError> {
        let (source, url, timeout) = match kind {
            UpstreamKind::PosDailySummary => (
                "pos",
                format!("{}/v1/branches/{}/daily-summary?date={}", self.pos_base, branch, date),
                POS_TIMEOUT,
            ),
            UpstreamKind::PosHourly => (
                "pos",
                format!("{}/v1/branches/{}/hourly?date={}", self.pos_base, branch, date),
                POS_TIMEOUT,
            ),
            UpstreamKind::ShiftsDaily => (
                "shifts",
                format!("{}/v1/branches/{}/shifts/daily?date={}", self.shifts_base, branch, date),
                SHIFTS_TIMEOUT,
            ),
        };
        self.get_json(source, url, timeout).await
    }
}
