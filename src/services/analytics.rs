// src/services/analytics.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::models::analytics::{
    BuiltDocument, DailyAnalyticsDocument, DocumentMeta, RevenueBlock, SourceStatus,
    SCHEMA_VERSION,
};
use crate::providers::{
    AlertSource, ProviderError, RevenueSource, StaffingSource, WeatherSource,
};
use crate::services::calendar::calendar_features;
use crate::store::tenant_store::TenantStore;

/// Constrói o documento canônico de um dia a partir da fonte
/// obrigatória (POS) e das fontes opcionais (escalas, clima, alertas).
/// Uma falha da fonte obrigatória aborta o build inteiro; uma falha
/// opcional degrada o bloco correspondente para `null` + `missing` sem
/// abortar nada.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: TenantStore,
    revenue: Arc<dyn RevenueSource>,
    staffing: Arc<dyn StaffingSource>,
    weather: Arc<dyn WeatherSource>,
    alerts: Arc<dyn AlertSource>,
    clock: Arc<dyn Clock>,
}

fn required(e: ProviderError) -> AppError {
    AppError::Upstream { origin: e.source, reason: e.reason }
}

/// Absorve a falha de uma fonte opcional: loga fonte/motivo (nunca o
/// payload) e devolve bloco ausente + status `missing`.
fn absorb<T>(result: Result<T, ProviderError>) -> (Option<T>, SourceStatus) {
    match result {
        Ok(value) => (Some(value), SourceStatus::Ok),
        Err(e) => {
            tracing::warn!(source = e.source, reason = %e.reason, "Fonte opcional indisponível");
            (None, SourceStatus::Missing)
        }
    }
}

impl AnalyticsAggregator {
    pub fn new(
        store: TenantStore,
        revenue: Arc<dyn RevenueSource>,
        staffing: Arc<dyn StaffingSource>,
        weather: Arc<dyn WeatherSource>,
        alerts: Arc<dyn AlertSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, revenue, staffing, weather, alerts, clock }
    }

    /// Monta o documento em memória, sem gravar nada.
    pub async fn build_daily_document(
        &self,
        tenant_id: &str,
        date: NaiveDate,
    ) -> Result<BuiltDocument, AppError> {
        let branch = self.store.branch_id(tenant_id).await?;

        // 1. Fonte obrigatória: qualquer falha propaga imediatamente.
        let revenue = self
            .revenue
            .daily_summary(&branch, date)
            .await
            .map_err(required)?;

        // 2. Fontes opcionais, concorrentes e independentes.
        let (staffing, weather, alerts) = tokio::join!(
            self.staffing.daily_staffing(&branch, date),
            self.weather.daily_weather(date),
            self.alerts.daily_alerts(date),
        );
        let (staffing, staffing_status) = absorb(staffing);
        let (weather, weather_status) = absorb(weather);
        let (alerts, alerts_status) = absorb(alerts);

        // 3. Computação pura, sem I/O.
        let calendar = calendar_features(date);

        // 4. Montagem.
        let average_check = if revenue.ticket_count == 0 {
            Decimal::ZERO
        } else {
            (revenue.total_revenue / Decimal::from(revenue.ticket_count)).round_dp(2)
        };

        let mut sources = BTreeMap::new();
        sources.insert("pos".to_string(), SourceStatus::Ok);
        sources.insert("shifts".to_string(), staffing_status);
        sources.insert("weather".to_string(), weather_status);
        sources.insert("alerts".to_string(), alerts_status);

        let mut api_versions = BTreeMap::new();
        api_versions.insert("pos".to_string(), self.revenue.api_version().to_string());
        api_versions.insert("shifts".to_string(), self.staffing.api_version().to_string());
        api_versions.insert("weather".to_string(), self.weather.api_version().to_string());
        api_versions.insert("alerts".to_string(), self.alerts.api_version().to_string());

        let document = DailyAnalyticsDocument {
            date,
            branch_id: branch.clone(),
            revenue: RevenueBlock {
                total_revenue: revenue.total_revenue,
                ticket_count: revenue.ticket_count,
                average_check,
                channel_split: revenue.channel_split,
                hourly: revenue.hourly,
            },
            staffing,
            weather,
            alerts,
            calendar,
            meta: DocumentMeta {
                schema_version: SCHEMA_VERSION.to_string(),
                built_at: self.clock.now(),
                sources,
                api_versions,
            },
        };

        let path =
            TenantStore::daily_doc_path(tenant_id, &branch, &date.format("%Y-%m-%d").to_string());
        Ok(BuiltDocument { path, document })
    }

    /// Build + gravação por substituição integral no caminho
    /// determinístico — refazer a mesma data é idempotente em relação
    /// ao documento armazenado.
    pub async fn build_and_store(
        &self,
        tenant_id: &str,
        date: NaiveDate,
    ) -> Result<BuiltDocument, AppError> {
        let built = self.build_daily_document(tenant_id, date).await?;
        let value = serde_json::to_value(&built.document)
            .map_err(|e| AppError::Internal(e.into()))?;
        self.store.write_daily_doc(&built.path, value).await?;
        Ok(built)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::common::clock::SystemClock;
    use crate::store::memory::MemoryStore;
    use std::sync::Mutex;

    fn aggregator_with(
        kv: Arc<MemoryStore>,
        revenue: Result<crate::models::analytics::RevenueSummary, ProviderError>,
        staffing: Result<crate::models::analytics::StaffingSummary, ProviderError>,
    ) -> AnalyticsAggregator {
        AnalyticsAggregator::new(
            TenantStore::new(kv),
            Arc::new(StubRevenue(Mutex::new(revenue))),
            Arc::new(StubStaffing(staffing)),
            Arc::new(StubWeather(Ok(weather_fixture()))),
            Arc::new(StubAlerts(Ok(alerts_fixture()))),
            Arc::new(SystemClock),
        )
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn required_source_failure_aborts_the_build() {
        let agg = aggregator_with(
            Arc::new(MemoryStore::new()),
            Err(ProviderError::new("pos", "http_503")),
            Ok(staffing_fixture()),
        );

        let err = agg.build_daily_document("t1", d("2025-07-15")).await.unwrap_err();
        match err {
            AppError::Upstream { origin, reason } => {
                assert_eq!(origin, "pos");
                assert_eq!(reason, "http_503");
            }
            other => panic!("esperava Upstream, veio {other:?}"),
        }
    }

    #[tokio::test]
    async fn optional_source_failure_degrades_to_missing() {
        let agg = aggregator_with(
            Arc::new(MemoryStore::new()),
            Ok(revenue_fixture("1000.00", 40)),
            Err(ProviderError::new("shifts", "timeout")),
        );

        let built = agg.build_daily_document("t1", d("2025-07-15")).await.unwrap();
        let doc = built.document;

        assert!(doc.staffing.is_none());
        assert_eq!(doc.meta.sources["shifts"], SourceStatus::Missing);
        // As demais fontes não são afetadas.
        assert!(doc.weather.is_some());
        assert_eq!(doc.meta.sources["weather"], SourceStatus::Ok);
        assert_eq!(doc.meta.sources["pos"], SourceStatus::Ok);
    }

    #[tokio::test]
    async fn average_check_is_rounded_and_guarded() {
        let agg = aggregator_with(
            Arc::new(MemoryStore::new()),
            Ok(revenue_fixture("1000.00", 3)),
            Ok(staffing_fixture()),
        );
        let built = agg.build_daily_document("t1", d("2025-07-15")).await.unwrap();
        assert_eq!(built.document.revenue.average_check.to_string(), "333.33");

        let agg = aggregator_with(
            Arc::new(MemoryStore::new()),
            Ok(revenue_fixture("1000.00", 0)),
            Ok(staffing_fixture()),
        );
        let built = agg.build_daily_document("t1", d("2025-07-15")).await.unwrap();
        assert_eq!(built.document.revenue.average_check, Decimal::ZERO);
    }

    #[tokio::test]
    async fn document_path_is_deterministic() {
        let agg = aggregator_with(
            Arc::new(MemoryStore::new()),
            Ok(revenue_fixture("10.00", 1)),
            Ok(staffing_fixture()),
        );
        let built = agg.build_daily_document("t1", d("2025-07-15")).await.unwrap();
        assert_eq!(built.path, "tenants/t1/analytics/daily/main/2025-07-15");
    }

    #[tokio::test]
    async fn rebuild_fully_replaces_the_stored_document() {
        let kv = Arc::new(MemoryStore::new());
        let revenue = Arc::new(StubRevenue(Mutex::new(Ok(revenue_fixture("500.00", 10)))));
        let agg = AnalyticsAggregator::new(
            TenantStore::new(kv.clone()),
            revenue.clone(),
            Arc::new(StubStaffing(Ok(staffing_fixture()))),
            Arc::new(StubWeather(Ok(weather_fixture()))),
            Arc::new(StubAlerts(Ok(alerts_fixture()))),
            Arc::new(SystemClock),
        );

        let first = agg.build_and_store("t1", d("2025-07-15")).await.unwrap();

        // Segundo build com upstream diferente e staffing presente no
        // primeiro build ausente no segundo.
        *revenue.0.lock().unwrap() = Ok(revenue_fixture("999.99", 33));
        let agg2 = AnalyticsAggregator::new(
            TenantStore::new(kv.clone()),
            revenue,
            Arc::new(StubStaffing(Err(ProviderError::new("shifts", "timeout")))),
            Arc::new(StubWeather(Ok(weather_fixture()))),
            Arc::new(StubAlerts(Ok(alerts_fixture()))),
            Arc::new(SystemClock),
        );
        let second = agg2.build_and_store("t1", d("2025-07-15")).await.unwrap();

        let stored = TenantStore::new(kv)
            .read_daily_doc(&first.path)
            .await
            .unwrap()
            .unwrap();
        let expected = serde_json::to_value(&second.document).unwrap();

        // Nada do primeiro build sobrevive: substituição integral.
        assert_eq!(stored, expected);
        assert_eq!(stored["revenue"]["totalRevenue"], expected["revenue"]["totalRevenue"]);
        assert!(stored["staffing"].is_null());
    }
}
