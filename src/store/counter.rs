// src/store/counter.rs

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::clock::Clock;
use crate::store::kv::StoreError;

/// Contador distribuído por chave com TTL. O TTL é fixado na primeira
/// criação da janela; incrementos subsequentes não o estendem.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Incrementa e devolve a contagem corrente da janela.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;
}

/// Backend Postgres: um upsert atômico resolve criação, expiração e
/// incremento numa única instrução.
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let interval = format!("{} milliseconds", window.as_millis());
        let row = sqlx::query(
            r#"
            INSERT INTO rate_counters (key, count, expires_at)
            VALUES ($1, 1, now() + $2::interval)
            ON CONFLICT (key) DO UPDATE SET
                count = CASE WHEN rate_counters.expires_at <= now()
                             THEN 1 ELSE rate_counters.count + 1 END,
                expires_at = CASE WHEN rate_counters.expires_at <= now()
                                  THEN EXCLUDED.expires_at ELSE rate_counters.expires_at END
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(&interval)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count").map_err(StoreError::from)?;
        Ok(count.max(0) as u64)
    }
}

/// Fallback em processo: janelas deslizantes por balde de relógio de
/// parede. Zera a cada restart do processo — fraqueza documentada e
/// aceita fora de produção, não um defeito a mascarar.
pub struct LocalCounter {
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, (i64, u64)>>,
}

impl LocalCounter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn increment(&self, key: &str, window: Duration) -> u64 {
        let window_ms = window.as_millis().max(1) as i64;
        let bucket = self.clock.now().timestamp_millis() / window_ms;

        let mut buckets = self.buckets.lock().unwrap();
        let entry = buckets.entry(key.to_string()).or_insert((bucket, 0));
        if entry.0 != bucket {
            *entry = (bucket, 0);
        }
        entry.1 += 1;
        entry.1
    }
}
