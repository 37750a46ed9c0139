// src/config.rs

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    common::clock::{Clock, SystemClock},
    handlers::upstream::AlertStatusCache,
    providers::{http::HttpUpstream, AlertSource, ProxySource},
    services::{
        analytics::AnalyticsAggregator,
        authz::AuthorizationGuard,
        backfill::{BackfillDriver, ScheduledBuilder},
        lease::LeaseLock,
        mutation::MutationCoordinator,
        rate_limit::RateLimiter,
    },
    store::{
        counter::{CounterStore, PgCounterStore},
        kv::KvStore,
        memory::MemoryStore,
        postgres::PgKvStore,
        TenantStore,
    },
};

/// TTL do cache do endpoint público de alertas.
const ALERT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Flags de recurso lidas do ambiente. Rota desligada responde o mesmo
/// 404 de uma rota inexistente.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub owner_bootstrap: bool,
}

// Estado compartilhado da aplicação
#[derive(Clone)]
pub struct AppState {
    pub jwt_secret: String,
    pub features: FeatureFlags,
    pub clock: Arc<dyn Clock>,
    pub store: TenantStore,
    pub guard: AuthorizationGuard,
    pub rate_limiter: RateLimiter,
    pub mutations: MutationCoordinator,
    pub aggregator: AnalyticsAggregator,
    pub backfill: BackfillDriver,
    pub scheduled: ScheduledBuilder,
    pub proxy: Arc<dyn ProxySource>,
    pub alerts: Arc<dyn AlertSource>,
    pub alert_cache: Arc<AlertStatusCache>,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "on"))
        .unwrap_or(false)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppState {
    /// Monta o gráfico de dependências da aplicação a partir das
    /// variáveis de ambiente. Em produção o backend compartilhado é
    /// obrigatório; em desenvolvimento caímos para stores em memória.
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret =
            std::env::var("JWT_SECRET").context("JWT_SECRET deve estar definido")?;

        let production = env_or("APP_ENV", "development") == "production";
        let database_url = std::env::var("DATABASE_URL").ok();
        if production && database_url.is_none() {
            anyhow::bail!("DATABASE_URL deve estar definido quando APP_ENV=production");
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (kv, counter): (Arc<dyn KvStore>, Option<Arc<dyn CounterStore>>) =
            match database_url {
                Some(url) => {
                    let pg = PgKvStore::connect(&url).await?;
                    let counter = PgCounterStore::new(pg.pool());
                    (Arc::new(pg), Some(Arc::new(counter)))
                }
                None => {
                    tracing::warn!(
                        "DATABASE_URL ausente; usando stores em memória (apenas desenvolvimento)"
                    );
                    (Arc::new(MemoryStore::new()), None)
                }
            };

        let store = TenantStore::new(kv);
        let guard = AuthorizationGuard::new(store.clone());
        let rate_limiter = RateLimiter::new(counter, clock.clone(), production);
        let mutations = MutationCoordinator::new(store.clone(), guard.clone(), clock.clone());
        let lease = LeaseLock::new(store.clone(), clock.clone());

        let upstream = Arc::new(HttpUpstream::new(
            env_or("POS_API_URL", "http://localhost:9101"),
            env_or("SHIFTS_API_URL", "http://localhost:9102"),
            env_or("WEATHER_API_URL", "http://localhost:9103"),
            env_or("ALERTS_API_URL", "http://localhost:9104"),
        )?);

        let aggregator = AnalyticsAggregator::new(
            store.clone(),
            upstream.clone(),
            upstream.clone(),
            upstream.clone(),
            upstream.clone(),
            clock.clone(),
        );
        let backfill = BackfillDriver::new(aggregator.clone(), lease);
        let scheduled = ScheduledBuilder::new(
            aggregator.clone(),
            store.clone(),
            clock.clone(),
            std::env::var("JOB_SECRET").ok(),
        );

        Ok(Self {
            jwt_secret,
            features: FeatureFlags { owner_bootstrap: env_flag("FEATURE_OWNER_BOOTSTRAP") },
            clock: clock.clone(),
            store,
            guard,
            rate_limiter,
            mutations,
            aggregator,
            backfill,
            scheduled,
            proxy: upstream.clone(),
            alerts: upstream,
            alert_cache: Arc::new(AlertStatusCache::new(clock, ALERT_CACHE_TTL)),
        })
    }
}
