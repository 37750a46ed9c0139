// src/services/backfill.rs

use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::models::analytics::{BackfillReport, ScheduledReport, SkipEntry, TenantSkipEntry};
use crate::services::analytics::AnalyticsAggregator;
use crate::services::lease::LeaseLock;
use crate::store::tenant_store::{validate_id, TenantStore};

/// Tamanho máximo (inclusivo) de um intervalo de backfill, em dias.
pub const MAX_RANGE_DAYS: i64 = 90;

// Lease do backfill: tempo suficiente para 90 builds sequenciais.
const BACKFILL_LOCK_TTL: Duration = Duration::from_secs(600);
const BACKFILL_LOCK_KIND: &str = "backfill";

fn parse_date(label: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("{label} deve estar no formato YYYY-MM-DD.")))
}

/// Reduz um erro de build a (fonte, motivo) para a lista de pulados.
fn skip_reason(e: AppError) -> (Option<String>, String) {
    match e {
        AppError::Upstream { origin, reason } => (Some(origin.to_string()), reason),
        AppError::Store(e) => (None, format!("store: {e}")),
        other => (None, other.to_string()),
    }
}

/// Dirige o AnalyticsAggregator por um intervalo de datas de um tenant,
/// serializado por LeaseLock: duas chamadas concorrentes para o mesmo
/// tenant nunca rodam juntas, e um holder morto não trava o recurso
/// para sempre porque o lease expira.
#[derive(Clone)]
pub struct BackfillDriver {
    aggregator: AnalyticsAggregator,
    lease: LeaseLock,
}

impl BackfillDriver {
    pub fn new(aggregator: AnalyticsAggregator, lease: LeaseLock) -> Self {
        Self { aggregator, lease }
    }

    pub async fn run(
        &self,
        tenant_id: &str,
        from: &str,
        to: &str,
    ) -> Result<BackfillReport, AppError> {
        // 1. Validação completa antes de qualquer I/O (inclusive do lock).
        validate_id("tenantId", tenant_id)?;
        let from = parse_date("from", from)?;
        let to = parse_date("to", to)?;
        if to < from {
            return Err(AppError::InvalidInput("'to' não pode ser anterior a 'from'.".into()));
        }
        let days = (to - from).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(AppError::InvalidInput(format!(
                "Intervalo de {days} dias excede o máximo de {MAX_RANGE_DAYS}."
            )));
        }

        // 2. Um backfill por tenant de cada vez.
        let token = self
            .lease
            .acquire(tenant_id, BACKFILL_LOCK_KIND, BACKFILL_LOCK_TTL)
            .await?
            .ok_or(AppError::Conflict("Já existe um backfill em andamento para este tenant."))?;

        // 3. O laço absorve toda falha por data; o release roda sempre,
        // qualquer que seja o desfecho.
        let report = self.run_range(tenant_id, from, to).await;

        if let Err(e) = self.lease.release(tenant_id, BACKFILL_LOCK_KIND, &token).await {
            tracing::warn!(tenant = tenant_id, "Falha ao liberar o lock de backfill: {}", e);
        }

        Ok(report)
    }

    /// Itera o intervalo sequencialmente (limita a carga nos upstreams);
    /// a falha de uma data vira entrada na lista de pulados e o laço
    /// segue para a próxima.
    async fn run_range(&self, tenant_id: &str, from: NaiveDate, to: NaiveDate) -> BackfillReport {
        let mut report = BackfillReport { built: Vec::new(), skipped: Vec::new() };

        let mut date = from;
        while date <= to {
            let key = date.format("%Y-%m-%d").to_string();
            match self.aggregator.build_and_store(tenant_id, date).await {
                Ok(_) => report.built.push(key),
                Err(e) => {
                    let (source, reason) = skip_reason(e);
                    tracing::warn!(
                        tenant = tenant_id,
                        date = %key,
                        reason = %reason,
                        "Data pulada no backfill"
                    );
                    report.skipped.push(SkipEntry { date: key, source, reason });
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        report
    }
}

/// Build diário disparado por um agendador externo. Autenticado por um
/// segredo compartilhado: sem segredo configurado o job se recusa a
/// rodar (fail-closed); segredo errado recebe um 404 opaco para não
/// denunciar a existência do endpoint.
#[derive(Clone)]
pub struct ScheduledBuilder {
    aggregator: AnalyticsAggregator,
    store: TenantStore,
    clock: Arc<dyn Clock>,
    secret: Option<String>,
}

impl ScheduledBuilder {
    pub fn new(
        aggregator: AnalyticsAggregator,
        store: TenantStore,
        clock: Arc<dyn Clock>,
        secret: Option<String>,
    ) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { aggregator, store, clock, secret }
    }

    /// Compara o segredo fornecido com o configurado em tempo constante.
    pub fn verify_secret(&self, provided: Option<&str>) -> Result<(), AppError> {
        let configured = self.secret.as_deref().ok_or_else(|| {
            AppError::ServiceUnavailable("segredo do job agendado não configurado".into())
        })?;

        let provided = provided.ok_or(AppError::NotFound)?;
        let matches: bool = configured
            .as_bytes()
            .ct_eq(provided.as_bytes())
            .into();
        if !matches {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Constrói o documento da data alvo (default: ontem) para todos os
    /// tenants conhecidos, pulando individualmente os que falharem.
    pub async fn run(&self, date: Option<NaiveDate>) -> Result<ScheduledReport, AppError> {
        let date = match date {
            Some(d) => d,
            None => self
                .clock
                .now()
                .date_naive()
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| AppError::InvalidInput("data alvo inválida".into()))?,
        };

        let tenants = self.store.list_tenants().await?;
        let mut report = ScheduledReport {
            date: date.format("%Y-%m-%d").to_string(),
            built: Vec::new(),
            skipped: Vec::new(),
        };

        for tenant_id in tenants {
            match self.aggregator.build_and_store(&tenant_id, date).await {
                Ok(_) => report.built.push(tenant_id),
                Err(e) => {
                    let (_, reason) = skip_reason(e);
                    tracing::warn!(tenant = %tenant_id, reason = %reason, "Tenant pulado no build diário");
                    report.skipped.push(TenantSkipEntry { tenant_id, reason });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::{ManualClock, SystemClock};
    use crate::providers::ProviderError;
    use crate::services::analytics::testing::*;
    use crate::services::analytics::AnalyticsAggregator;
    use crate::store::kv::KvStore;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn aggregator(kv: Arc<MemoryStore>) -> AnalyticsAggregator {
        AnalyticsAggregator::new(
            TenantStore::new(kv),
            Arc::new(StubRevenue(Mutex::new(Ok(revenue_fixture("100.00", 4))))),
            Arc::new(StubStaffing(Ok(staffing_fixture()))),
            Arc::new(StubWeather(Ok(weather_fixture()))),
            Arc::new(StubAlerts(Ok(alerts_fixture()))),
            Arc::new(SystemClock),
        )
    }

    fn driver(kv: Arc<MemoryStore>) -> BackfillDriver {
        let store = TenantStore::new(kv.clone());
        BackfillDriver::new(
            aggregator(kv),
            LeaseLock::new(store, Arc::new(SystemClock)),
        )
    }

    #[tokio::test]
    async fn range_over_ninety_days_is_rejected_before_any_io() {
        let kv = Arc::new(MemoryStore::new());
        let driver = driver(kv.clone());

        // 91 dias, inclusivo.
        let err = driver.run("t1", "2025-01-01", "2025-04-01").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        // Nenhum lock foi adquirido e nada foi escrito.
        assert!(kv.read("tenants/t1/analytics/_lock/backfill").await.unwrap().is_none());
        assert!(kv.list_children("tenants").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ninety_day_range_is_accepted() {
        let kv = Arc::new(MemoryStore::new());
        let driver = driver(kv);

        let report = driver.run("t1", "2025-01-01", "2025-03-31").await.unwrap();
        assert_eq!(report.built.len(), 90);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn malformed_dates_are_invalid_input() {
        let driver = driver(Arc::new(MemoryStore::new()));
        assert!(matches!(
            driver.run("t1", "01/02/2025", "2025-02-03").await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
        assert!(matches!(
            driver.run("t1", "2025-02-03", "2025-02-01").await.unwrap_err(),
            AppError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn held_lock_yields_conflict() {
        let kv = Arc::new(MemoryStore::new());
        let store = TenantStore::new(kv.clone());
        let lease = LeaseLock::new(store, Arc::new(SystemClock));
        let _held = lease
            .acquire("t1", "backfill", Duration::from_secs(600))
            .await
            .unwrap()
            .unwrap();

        let driver = driver(kv);
        let err = driver.run("t1", "2025-02-01", "2025-02-03").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn lock_is_released_after_a_run() {
        let kv = Arc::new(MemoryStore::new());
        let driver = driver(kv.clone());

        driver.run("t1", "2025-02-01", "2025-02-02").await.unwrap();

        // Se o lock tivesse ficado para trás, esta segunda rodada
        // retornaria Conflict.
        driver.run("t1", "2025-02-01", "2025-02-02").await.unwrap();
    }

    #[tokio::test]
    async fn failed_dates_are_skipped_not_fatal() {
        let kv = Arc::new(MemoryStore::new());
        let store = TenantStore::new(kv.clone());
        let revenue = Arc::new(StubRevenue(Mutex::new(Err(ProviderError::new("pos", "http_503")))));
        let agg = AnalyticsAggregator::new(
            store.clone(),
            revenue,
            Arc::new(StubStaffing(Ok(staffing_fixture()))),
            Arc::new(StubWeather(Ok(weather_fixture()))),
            Arc::new(StubAlerts(Ok(alerts_fixture()))),
            Arc::new(SystemClock),
        );
        let driver = BackfillDriver::new(agg, LeaseLock::new(store, Arc::new(SystemClock)));

        let report = driver.run("t1", "2025-02-01", "2025-02-03").await.unwrap();
        assert!(report.built.is_empty());
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(report.skipped[0].source.as_deref(), Some("pos"));
        assert_eq!(report.skipped[0].reason, "http_503");
    }

    fn scheduled(kv: Arc<MemoryStore>, secret: Option<&str>) -> ScheduledBuilder {
        ScheduledBuilder::new(
            aggregator(kv.clone()),
            TenantStore::new(kv),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 7, 16, 3, 0, 0).unwrap())),
            secret.map(|s| s.to_string()),
        )
    }

    #[tokio::test]
    async fn unconfigured_secret_refuses_to_run() {
        let builder = scheduled(Arc::new(MemoryStore::new()), None);
        assert!(matches!(
            builder.verify_secret(Some("anything")).unwrap_err(),
            AppError::ServiceUnavailable(_)
        ));

        let builder = scheduled(Arc::new(MemoryStore::new()), Some(""));
        assert!(matches!(
            builder.verify_secret(Some("anything")).unwrap_err(),
            AppError::ServiceUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn wrong_secret_is_an_opaque_not_found() {
        let builder = scheduled(Arc::new(MemoryStore::new()), Some("s3cr3t"));
        assert!(matches!(builder.verify_secret(Some("wrong")).unwrap_err(), AppError::NotFound));
        assert!(matches!(builder.verify_secret(None).unwrap_err(), AppError::NotFound));
        builder.verify_secret(Some("s3cr3t")).unwrap();
    }

    #[tokio::test]
    async fn runs_all_tenants_defaulting_to_yesterday() {
        let kv = Arc::new(MemoryStore::new());
        kv.write("tenants/t1/settings", serde_json::json!({"branchId": "main"}))
            .await
            .unwrap();
        kv.write("tenants/t2/settings", serde_json::json!({"branchId": "main"}))
            .await
            .unwrap();
        let builder = scheduled(kv.clone(), Some("s3cr3t"));

        let report = builder.run(None).await.unwrap();
        assert_eq!(report.date, "2025-07-15");
        assert_eq!(report.built, vec!["t1".to_string(), "t2".to_string()]);
        assert!(report.skipped.is_empty());

        assert!(kv
            .read("tenants/t1/analytics/daily/main/2025-07-15")
            .await
            .unwrap()
            .is_some());
    }
}
