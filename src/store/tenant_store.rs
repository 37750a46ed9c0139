// src/store/tenant_store.rs

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::roles::AuditEntry;
use crate::store::kv::{KvStore, StoreError, TxAttempt, TxDecision, TxOutcome};

// Toda leitura pontual é limitada: um timeout vira erro tipado, nunca
// uma espera indefinida no caminho de autorização.
const READ_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_ID_LEN: usize = 128;

// Caracteres proibidos em ids: delimitadores e curingas do
// armazenamento hierárquico. Impede injeção de caminho.
const FORBIDDEN_ID_CHARS: &[char] = &['/', '.', '#', '$', '[', ']'];

/// Valida um id opaco (tenant ou uid) antes de construir qualquer
/// caminho. Falha com `InvalidInput` antes de qualquer I/O.
pub fn validate_id(label: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() || value.len() > MAX_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "{label} deve ter entre 1 e {MAX_ID_LEN} caracteres."
        )));
    }
    if value
        .chars()
        .any(|c| FORBIDDEN_ID_CHARS.contains(&c) || c.is_control() || c.is_whitespace())
    {
        return Err(AppError::InvalidInput(format!(
            "{label} contém caracteres proibidos."
        )));
    }
    Ok(())
}

/// Repositório tipado sobre o armazenamento hierárquico. Centraliza a
/// montagem de caminhos e o timeout de leitura; é o único dono do
/// estado persistido (os demais componentes só guardam caches soft).
#[derive(Clone)]
pub struct TenantStore {
    kv: Arc<dyn KvStore>,
}

impl TenantStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    // --- Caminhos do layout persistido ---

    fn member_path(tenant: &str, uid: &str) -> String {
        format!("tenants/{tenant}/members/{uid}")
    }

    fn roles_path(tenant: &str) -> String {
        // O mapa de papéis inteiro vive num único valor JSON: é a
        // unidade do compare-and-swap das mutações de papel.
        format!("tenants/{tenant}/roles")
    }

    fn audit_path(tenant: &str, entry_id: &str) -> String {
        format!("tenants/{tenant}/audit/roles/{entry_id}")
    }

    fn lock_path(tenant: &str, kind: &str) -> String {
        format!("tenants/{tenant}/analytics/_lock/{kind}")
    }

    fn settings_path(tenant: &str) -> String {
        format!("tenants/{tenant}/settings")
    }

    pub fn daily_doc_path(tenant: &str, branch: &str, date: &str) -> String {
        format!("tenants/{tenant}/analytics/daily/{branch}/{date}")
    }

    // --- Leituras pontuais, sempre com timeout ---

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        tokio::time::timeout(READ_TIMEOUT, self.kv.read(path))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Valor bruto da flag de membership. Só o booleano `true` conta
    /// como membro; a interpretação fica no guard.
    pub async fn member_flag(&self, tenant: &str, uid: &str) -> Result<Option<Value>, StoreError> {
        self.read(&Self::member_path(tenant, uid)).await
    }

    pub async fn role_map(&self, tenant: &str) -> Result<Option<Value>, StoreError> {
        self.read(&Self::roles_path(tenant)).await
    }

    // --- Mutações de papel ---

    pub async fn transact_roles(
        &self,
        tenant: &str,
        attempt: TxAttempt<'_>,
    ) -> Result<TxOutcome, StoreError> {
        self.kv.transact(&Self::roles_path(tenant), attempt).await
    }

    /// Grava uma entrada do mapa de papéis sem condição de aborto.
    /// Usado quando a invariante não está em risco (promoção a owner).
    pub async fn upsert_role(
        &self,
        tenant: &str,
        uid: &str,
        role_value: &str,
    ) -> Result<(), StoreError> {
        let uid = uid.to_string();
        let role_value = role_value.to_string();
        let outcome = self
            .kv
            .transact(&Self::roles_path(tenant), &move |cur| {
                let mut map = match cur {
                    Some(Value::Object(m)) => m.clone(),
                    _ => serde_json::Map::new(),
                };
                map.insert(uid.clone(), Value::String(role_value.clone()));
                TxDecision::Write(Value::Object(map))
            })
            .await?;
        debug_assert_eq!(outcome, TxOutcome::Committed);
        Ok(())
    }

    // --- Efeitos best-effort pós-commit ---

    pub async fn write_member_flag(&self, tenant: &str, uid: &str) -> Result<(), StoreError> {
        self.kv
            .write(&Self::member_path(tenant, uid), Value::Bool(true))
            .await
    }

    pub async fn delete_member_flag(&self, tenant: &str, uid: &str) -> Result<(), StoreError> {
        self.kv.delete(&Self::member_path(tenant, uid)).await
    }

    /// Anexa um registro de auditoria sob uma chave única ordenável por
    /// tempo. Nunca sobrescreve registros existentes.
    pub async fn append_audit(&self, tenant: &str, entry: &AuditEntry) -> Result<(), StoreError> {
        let entry_id = format!(
            "{}_{}",
            entry.ts.timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let value = serde_json::to_value(entry)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.kv.write(&Self::audit_path(tenant, &entry_id), value).await
    }

    // --- Lock de lease ---

    pub async fn transact_lock(
        &self,
        tenant: &str,
        kind: &str,
        attempt: TxAttempt<'_>,
    ) -> Result<TxOutcome, StoreError> {
        self.kv.transact(&Self::lock_path(tenant, kind), attempt).await
    }

    pub async fn read_lock(&self, tenant: &str, kind: &str) -> Result<Option<Value>, StoreError> {
        self.read(&Self::lock_path(tenant, kind)).await
    }

    // --- Analytics ---

    /// Filial configurada do tenant; `main` quando não há configuração.
    pub async fn branch_id(&self, tenant: &str) -> Result<String, StoreError> {
        let settings = self.read(&Self::settings_path(tenant)).await?;
        Ok(settings
            .as_ref()
            .and_then(|v| v.get("branchId"))
            .and_then(|v| v.as_str())
            .unwrap_or("main")
            .to_string())
    }

    /// Substituição integral do documento diário. Nunca merge.
    pub async fn write_daily_doc(&self, path: &str, document: Value) -> Result<(), StoreError> {
        self.kv.write(path, document).await
    }

    pub async fn read_daily_doc(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.read(path).await
    }

    pub async fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
        self.kv.list_children("tenants").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_id_accepts_plain_ids() {
        assert!(validate_id("tenantId", "padaria-central").is_ok());
        assert!(validate_id("uid", "user_42").is_ok());
    }

    #[test]
    fn validate_id_rejects_path_delimiters() {
        for bad in ["a/b", "a.b", "a#b", "a$b", "a[b", "a]b", "a b", "", "x\n"] {
            assert!(validate_id("id", bad).is_err(), "deveria rejeitar {bad:?}");
        }
    }

    #[test]
    fn validate_id_rejects_oversized_ids() {
        let long = "x".repeat(129);
        assert!(validate_id("id", &long).is_err());
        let max = "x".repeat(128);
        assert!(validate_id("id", &max).is_ok());
    }
}
