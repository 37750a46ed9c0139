// src/store/postgres.rs

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::store::kv::{KvStore, StoreError, TxAttempt, TxDecision, TxOutcome};

// Limite de re-execuções do corpo de uma transação sob contenção.
// Estourar o limite vira erro de armazenamento, nunca um spin infinito.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// Backend durável do armazenamento hierárquico: uma linha por caminho
/// na tabela `kv_entries`, com coluna `version` para o compare-and-swap.
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    async fn read_versioned(&self, path: &str) -> Result<Option<(Value, i64)>, StoreError> {
        let row = sqlx::query("SELECT value, version FROM kv_entries WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: Value = row.try_get("value").map_err(StoreError::from)?;
                let version: i64 = row.try_get("version").map_err(StoreError::from)?;
                Ok(Some((value, version)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KvStore for PgKvStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_versioned(path).await?.map(|(value, _)| value))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (path, value, version) VALUES ($1, $2, 1)
            ON CONFLICT (path) DO UPDATE SET value = EXCLUDED.value, version = kv_entries.version + 1
            "#,
        )
        .bind(path)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_entries WHERE path = $1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{path}/%");
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT split_part(substr(path, char_length($1) + 2), '/', 1) AS child
            FROM kv_entries
            WHERE path LIKE $2
            ORDER BY child
            "#,
        )
        .bind(path)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        let mut children = Vec::with_capacity(rows.len());
        for row in rows {
            children.push(row.try_get::<String, _>("child").map_err(StoreError::from)?);
        }
        Ok(children)
    }

    async fn transact(&self, path: &str, attempt: TxAttempt<'_>) -> Result<TxOutcome, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.read_versioned(path).await?;
            let (value, version) = match &current {
                Some((value, version)) => (Some(value), Some(*version)),
                None => (None, None),
            };

            // O corpo decide contra o estado fresco desta tentativa.
            let decision = attempt(value);

            let applied = match (decision, version) {
                (TxDecision::Abort, _) => return Ok(TxOutcome::Aborted),

                (TxDecision::Write(next), Some(v)) => {
                    sqlx::query(
                        "UPDATE kv_entries SET value = $1, version = version + 1 \
                         WHERE path = $2 AND version = $3",
                    )
                    .bind(&next)
                    .bind(path)
                    .bind(v)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                }
                (TxDecision::Write(next), None) => {
                    sqlx::query(
                        "INSERT INTO kv_entries (path, value, version) VALUES ($1, $2, 1) \
                         ON CONFLICT (path) DO NOTHING",
                    )
                    .bind(path)
                    .bind(&next)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                }

                (TxDecision::Delete, Some(v)) => {
                    sqlx::query("DELETE FROM kv_entries WHERE path = $1 AND version = $2")
                        .bind(path)
                        .bind(v)
                        .execute(&self.pool)
                        .await?
                        .rows_affected()
                }
                // Apagar o que não existe é um commit vazio.
                (TxDecision::Delete, None) => return Ok(TxOutcome::Committed),
            };

            if applied == 1 {
                return Ok(TxOutcome::Committed);
            }
            // Escritor concorrente venceu; relê e tenta de novo.
        }

        Err(StoreError::Contention)
    }
}
