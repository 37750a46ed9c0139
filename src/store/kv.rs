// src/store/kv.rs

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Decisão que o corpo de uma transação devolve para o armazenamento.
/// O armazenamento aplica a decisão atomicamente contra o estado fresco
/// da chave e re-executa o corpo quando um escritor concorrente vence.
pub enum TxDecision {
    /// Substitui o valor da chave.
    Write(Value),
    /// Remove a chave (release de lock condicionado ao token, por exemplo).
    Delete,
    /// A condição lógica de aborto se confirmou; nada é escrito.
    Abort,
}

/// Resultado observável de uma transação: ou o commit aconteceu, ou a
/// condição de aborto valeu contra o estado mais recente. Um aborto
/// confirmado nunca é re-tentado pela camada de aplicação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    Aborted,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timeout ao consultar o armazenamento")]
    Timeout,

    // Número máximo de tentativas de CAS esgotado por contenção.
    #[error("contenção excessiva no armazenamento")]
    Contention,

    #[error("erro no backend de armazenamento: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Corpo de transação: função pura sobre o valor atual da chave.
pub type TxAttempt<'a> = &'a (dyn Fn(Option<&Value>) -> TxDecision + Send + Sync);

/// Abstração sobre o armazenamento hierárquico chave-valor. Dois
/// backends: Postgres (durável, distribuído) e memória (efêmero, para
/// testes e desenvolvimento). Toda coordenação entre invocações
/// concorrentes passa pelo `transact` — nunca por lock em processo,
/// pois invocações podem rodar em processos distintos.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Nomes dos filhos imediatos de um caminho (ex.: os tenants sob
    /// `tenants`).
    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Compare-and-swap: lê o valor atual, executa `attempt` e só
    /// comita se a chave não mudou no meio; em conflito, relê e
    /// re-executa `attempt` contra o estado fresco.
    async fn transact(&self, path: &str, attempt: TxAttempt<'_>) -> Result<TxOutcome, StoreError>;
}
