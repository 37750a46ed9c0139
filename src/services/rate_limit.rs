// src/services/rate_limit.rs

use std::sync::Arc;
use std::time::Duration;

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::store::counter::{CounterStore, LocalCounter};

/// Limites por escopo de operação: operações destrutivas/caras recebem
/// janelas bem mais apertadas que leituras.
pub mod limits {
    use std::time::Duration;

    pub const BOOTSTRAP: (u64, Duration) = (5, Duration::from_secs(3600));
    pub const ROLE_UPDATE: (u64, Duration) = (30, Duration::from_secs(60));
    pub const BACKFILL: (u64, Duration) = (3, Duration::from_secs(600));
    pub const GATED_READ: (u64, Duration) = (60, Duration::from_secs(60));
    pub const PUBLIC_READ: (u64, Duration) = (60, Duration::from_secs(60));
}

/// Contagem deslizante de requisições por chave arbitrária. O caminho
/// primário é o contador distribuído; em produção ele é dependência
/// dura (fail-closed), fora de produção caímos no balde local em
/// processo, que zera a cada restart.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Option<Arc<dyn CounterStore>>,
    local: Arc<LocalCounter>,
    fail_closed: bool,
}

impl RateLimiter {
    pub fn new(
        backend: Option<Arc<dyn CounterStore>>,
        clock: Arc<dyn Clock>,
        fail_closed: bool,
    ) -> Self {
        Self {
            backend,
            local: Arc::new(LocalCounter::new(clock)),
            fail_closed,
        }
    }

    /// Incrementa a chave e responde se a requisição deve ser limitada.
    pub async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, AppError> {
        match &self.backend {
            Some(backend) => match backend.increment(key, window).await {
                Ok(count) => Ok(count > limit),
                Err(e) if self.fail_closed => Err(AppError::ServiceUnavailable(format!(
                    "backend do rate limiter indisponível: {e}"
                ))),
                Err(e) => {
                    // Fora de produção degradamos para o balde local.
                    tracing::warn!("Contador distribuído falhou, usando fallback local: {}", e);
                    Ok(self.local.increment(key, window) > limit)
                }
            },
            None if self.fail_closed => Err(AppError::ServiceUnavailable(
                "backend do rate limiter não configurado".into(),
            )),
            None => Ok(self.local.increment(key, window) > limit),
        }
    }

    /// Aplica o limite a duas chaves independentes — por IP e por
    /// identidade — e ambas precisam passar.
    pub async fn enforce(
        &self,
        scope: &str,
        ip: &str,
        uid: &str,
        (limit, window): (u64, Duration),
    ) -> Result<(), AppError> {
        let ip_limited = self
            .check_and_increment(&format!("{scope}:ip:{ip}"), limit, window)
            .await?;
        let uid_limited = self
            .check_and_increment(&format!("{scope}:uid:{uid}"), limit, window)
            .await?;

        if ip_limited || uid_limited {
            return Err(AppError::RateLimited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn limiter_with_clock() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let limiter = RateLimiter::new(None, clock.clone(), false);
        (limiter, clock)
    }

    #[tokio::test]
    async fn window_of_three_limits_the_fourth() {
        let (limiter, _clock) = limiter_with_clock();
        let window = Duration::from_millis(1000);

        for _ in 0..3 {
            assert!(!limiter.check_and_increment("k", 3, window).await.unwrap());
        }
        assert!(limiter.check_and_increment("k", 3, window).await.unwrap());
    }

    #[tokio::test]
    async fn window_elapses_and_requests_pass_again() {
        let (limiter, clock) = limiter_with_clock();
        let window = Duration::from_millis(1000);

        for _ in 0..4 {
            let _ = limiter.check_and_increment("k", 3, window).await.unwrap();
        }
        clock.advance(chrono::Duration::milliseconds(1001));
        assert!(!limiter.check_and_increment("k", 3, window).await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (limiter, _clock) = limiter_with_clock();
        let window = Duration::from_millis(1000);

        for _ in 0..4 {
            let _ = limiter.check_and_increment("a", 3, window).await.unwrap();
        }
        assert!(!limiter.check_and_increment("b", 3, window).await.unwrap());
    }

    #[tokio::test]
    async fn production_without_backend_fails_closed() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let limiter = RateLimiter::new(None, clock, true);

        let err = limiter
            .check_and_increment("k", 3, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn enforce_limits_when_either_key_trips() {
        let (limiter, _clock) = limiter_with_clock();
        let pair = (2, Duration::from_millis(1000));

        // Mesmo IP, uids diferentes: a chave de IP estoura primeiro.
        limiter.enforce("op", "1.2.3.4", "u1", pair).await.unwrap();
        limiter.enforce("op", "1.2.3.4", "u2", pair).await.unwrap();
        let err = limiter.enforce("op", "1.2.3.4", "u3", pair).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited));
    }
}
