// src/services/lease.rs

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::store::kv::{TxDecision, TxOutcome};
use crate::store::tenant_store::TenantStore;

/// Lock de lease por (tenant, recurso): no máximo um holder não
/// expirado por vez. A expiração é avaliada preguiçosamente na próxima
/// tentativa de acquire — não há varredor em background — então um
/// holder morto se auto-cura sozinho quando o lease vence.
#[derive(Clone)]
pub struct LeaseLock {
    store: TenantStore,
    clock: Arc<dyn Clock>,
}

impl LeaseLock {
    pub fn new(store: TenantStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Tenta adquirir o lock. `None` significa "lock ocupado por um
    /// lease ainda válido"; o chamador decide o que isso significa
    /// (tipicamente `Conflict`).
    pub async fn acquire(
        &self,
        tenant_id: &str,
        kind: &str,
        ttl: Duration,
    ) -> Result<Option<String>, AppError> {
        let now_ms = self.clock.now().timestamp_millis();
        let expires_at = now_ms + ttl.as_millis() as i64;
        let token = Uuid::new_v4().to_string();

        let token_for_tx = token.clone();
        let outcome = self
            .store
            .transact_lock(tenant_id, kind, &move |cur| {
                if let Some(record) = cur {
                    let held = record
                        .get("expiresAt")
                        .and_then(|v| v.as_i64())
                        .map(|exp| now_ms < exp)
                        .unwrap_or(false);
                    if held {
                        return TxDecision::Abort;
                    }
                }
                // Lease ausente, expirado ou malformado: assume.
                TxDecision::Write(json!({
                    "lockId": token_for_tx,
                    "expiresAt": expires_at,
                }))
            })
            .await?;

        Ok(match outcome {
            TxOutcome::Committed => Some(token),
            TxOutcome::Aborted => None,
        })
    }

    /// Release condicionado ao token: um release atrasado de um holder
    /// já expirado não derruba o lock do holder atual.
    pub async fn release(&self, tenant_id: &str, kind: &str, token: &str) -> Result<(), AppError> {
        let token = token.to_string();
        let outcome = self
            .store
            .transact_lock(tenant_id, kind, &move |cur| match cur {
                Some(record) if record.get("lockId").and_then(|v| v.as_str()) == Some(&token) => {
                    TxDecision::Delete
                }
                // Token não confere ou lock já se foi: no-op.
                _ => TxDecision::Abort,
            })
            .await?;

        if outcome == TxOutcome::Aborted {
            tracing::debug!(tenant = tenant_id, kind, "Release ignorado: token não confere.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn lock_with_clock() -> (LeaseLock, Arc<ManualClock>, TenantStore) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        let store = TenantStore::new(Arc::new(MemoryStore::new()));
        (LeaseLock::new(store.clone(), clock.clone()), clock, store)
    }

    #[tokio::test]
    async fn second_acquire_before_release_fails() {
        let (lock, _clock, _store) = lock_with_clock();

        let token = lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap();
        assert!(token.is_some());

        let second = lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn release_frees_the_lock() {
        let (lock, _clock, _store) = lock_with_clock();

        let token = lock
            .acquire("t1", "backfill", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        lock.release("t1", "backfill", &token).await.unwrap();

        assert!(lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_self_heals_without_release() {
        let (lock, clock, _store) = lock_with_clock();

        let _token = lock
            .acquire("t1", "backfill", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        // Dentro do lease continua ocupado.
        clock.advance(chrono::Duration::seconds(4));
        assert!(lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap().is_none());

        // Passado o TTL, qualquer acquire assume sem release prévio.
        clock.advance(chrono::Duration::seconds(2));
        assert!(lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_release_is_a_noop() {
        let (lock, clock, _store) = lock_with_clock();

        let old = lock
            .acquire("t1", "backfill", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        // O holder antigo expira e outro assume.
        clock.advance(chrono::Duration::seconds(6));
        let _current = lock
            .acquire("t1", "backfill", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        // Release atrasado com token velho não derruba o lock atual.
        lock.release("t1", "backfill", &old).await.unwrap();
        assert!(lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn locks_are_scoped_per_resource_kind() {
        let (lock, _clock, _store) = lock_with_clock();

        assert!(lock.acquire("t1", "backfill", Duration::from_secs(5)).await.unwrap().is_some());
        assert!(lock.acquire("t1", "rebuild", Duration::from_secs(5)).await.unwrap().is_some());
        assert!(lock.acquire("t2", "backfill", Duration::from_secs(5)).await.unwrap().is_some());
    }
}
