// src/store/memory.rs

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::store::kv::{KvStore, StoreError, TxAttempt, TxDecision, TxOutcome};

/// Backend em memória do armazenamento hierárquico. Estado soft por
/// definição: zera a cada restart do processo. Serve aos testes e ao
/// modo de desenvolvimento sem banco.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.to_string(), value);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(path);
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{path}/");
        let entries = self.entries.lock().unwrap();
        let mut children: Vec<String> = Vec::new();
        for key in entries.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let child = rest.split('/').next().unwrap_or(rest).to_string();
                if children.last() != Some(&child) {
                    children.push(child);
                }
            }
        }
        children.dedup();
        Ok(children)
    }

    async fn transact(&self, path: &str, attempt: TxAttempt<'_>) -> Result<TxOutcome, StoreError> {
        // O mutex do mapa serializa escritores; uma única execução do
        // corpo basta, sempre contra o valor corrente.
        let mut entries = self.entries.lock().unwrap();
        match attempt(entries.get(path)) {
            TxDecision::Write(next) => {
                entries.insert(path.to_string(), next);
                Ok(TxOutcome::Committed)
            }
            TxDecision::Delete => {
                entries.remove(path);
                Ok(TxOutcome::Committed)
            }
            TxDecision::Abort => Ok(TxOutcome::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn transact_sees_fresh_value_and_commits() {
        let store = MemoryStore::new();
        store.write("a/b", json!(1)).await.unwrap();

        let outcome = store
            .transact("a/b", &|cur| match cur {
                Some(v) => TxDecision::Write(json!(v.as_i64().unwrap() + 1)),
                None => TxDecision::Abort,
            })
            .await
            .unwrap();

        assert_eq!(outcome, TxOutcome::Committed);
        assert_eq!(store.read("a/b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn transact_abort_leaves_value_untouched() {
        let store = MemoryStore::new();
        store.write("k", json!("v")).await.unwrap();

        let outcome = store.transact("k", &|_| TxDecision::Abort).await.unwrap();

        assert_eq!(outcome, TxOutcome::Aborted);
        assert_eq!(store.read("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn list_children_returns_direct_names_only() {
        let store = MemoryStore::new();
        store.write("tenants/a/roles", json!({})).await.unwrap();
        store.write("tenants/a/members/u1", json!(true)).await.unwrap();
        store.write("tenants/b/roles", json!({})).await.unwrap();

        let children = store.list_children("tenants").await.unwrap();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
    }
}
