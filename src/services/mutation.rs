// src/services/mutation.rs

use serde_json::Value;
use std::sync::Arc;

use crate::common::clock::Clock;
use crate::common::error::AppError;
use crate::models::roles::{AuditEntry, Role};
use crate::services::authz::AuthorizationGuard;
use crate::store::kv::{TxDecision, TxOutcome};
use crate::store::tenant_store::{validate_id, TenantStore};

/// Máquina de estados sobre o mapa de papéis de um tenant. Toda
/// transição que pode violar a invariante "≥1 owner" passa pelo
/// compare-and-swap do armazenamento: a condição de aborto é sempre
/// reavaliada contra estado fresco, nunca contra um snapshot velho.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: TenantStore,
    guard: AuthorizationGuard,
    clock: Arc<dyn Clock>,
}

fn owner_count(map: &serde_json::Map<String, Value>) -> usize {
    map.values()
        .filter(|v| v.as_str() == Some(Role::Owner.as_str()))
        .count()
}

impl MutationCoordinator {
    pub fn new(store: TenantStore, guard: AuthorizationGuard, clock: Arc<dyn Clock>) -> Self {
        Self { store, guard, clock }
    }

    /// Auto-bootstrap do primeiro owner de um tenant. Só comita se o
    /// tenant ainda não tem nenhum owner; N chamadas concorrentes para
    /// o mesmo tenant produzem exatamente um sucesso.
    pub async fn bootstrap_owner(
        &self,
        caller_id: &str,
        tenant_id: &str,
        uid: &str,
    ) -> Result<(), AppError> {
        validate_id("tenantId", tenant_id)?;
        validate_id("uid", uid)?;

        // Só o próprio usuário pode se promover a primeiro owner.
        if caller_id != uid {
            return Err(AppError::Forbidden("Bootstrap só é permitido para o próprio usuário."));
        }

        // Corpo da transação: decide contra o mapa fresco a cada tentativa.
        let uid_owned = uid.to_string();
        let outcome = self
            .store
            .transact_roles(tenant_id, &move |cur| {
                let mut map = match cur {
                    Some(Value::Object(m)) => m.clone(),
                    _ => serde_json::Map::new(),
                };
                if owner_count(&map) > 0 {
                    return TxDecision::Abort;
                }
                map.insert(uid_owned.clone(), Value::String(Role::Owner.as_str().into()));
                TxDecision::Write(Value::Object(map))
            })
            .await?;

        if outcome == TxOutcome::Aborted {
            return Err(AppError::Conflict("Este tenant já possui um owner."));
        }

        // Efeitos secundários best-effort: uma falha aqui não desfaz o
        // papel já comitado (lacuna de consistência aceita; só logamos).
        self.post_commit(tenant_id, caller_id, uid, Some(Role::Owner), "bootstrap")
            .await;

        Ok(())
    }

    /// Atualiza, reatribui ou remove (`new_role == None`) o papel de um
    /// usuário. Exige que o ator seja owner do tenant.
    pub async fn update_role(
        &self,
        actor_id: &str,
        tenant_id: &str,
        target_uid: &str,
        new_role: Option<Role>,
    ) -> Result<(), AppError> {
        // 1. Autorização antes de qualquer mutação.
        self.guard.require_access(actor_id, tenant_id, Role::Owner).await?;
        validate_id("targetUid", target_uid)?;

        match new_role {
            // 2a. Promover a owner nunca diminui o conjunto de owners:
            // escrita simples, sem condição de aborto.
            Some(Role::Owner) => {
                self.store
                    .upsert_role(tenant_id, target_uid, Role::Owner.as_str())
                    .await?;
            }

            // 2b. Remoção ou rebaixamento: o CAS reavalia o conjunto de
            // owners fresco e aborta se ele ficaria vazio.
            other => {
                let target = target_uid.to_string();
                let next_value = other.map(|r| r.as_str().to_string());
                let outcome = self
                    .store
                    .transact_roles(tenant_id, &move |cur| {
                        let mut map = match cur {
                            Some(Value::Object(m)) => m.clone(),
                            _ => serde_json::Map::new(),
                        };

                        let target_is_owner =
                            map.get(&target).and_then(|v| v.as_str()) == Some(Role::Owner.as_str());
                        if target_is_owner && owner_count(&map) <= 1 {
                            return TxDecision::Abort;
                        }

                        match &next_value {
                            Some(role) => {
                                map.insert(target.clone(), Value::String(role.clone()));
                            }
                            None => {
                                map.remove(&target);
                            }
                        }
                        TxDecision::Write(Value::Object(map))
                    })
                    .await?;

                if outcome == TxOutcome::Aborted {
                    return Err(AppError::Conflict(
                        "Não é possível remover ou rebaixar o último owner.",
                    ));
                }
            }
        }

        // 3. Efeitos secundários best-effort, mesmas semânticas do bootstrap.
        self.post_commit(tenant_id, actor_id, target_uid, new_role, "update_role")
            .await;

        Ok(())
    }

    /// Flag de membership + auditoria após o commit. Nunca propaga
    /// erro: a divergência resultante é uma limitação conhecida, sem
    /// job de reconciliação.
    async fn post_commit(
        &self,
        tenant_id: &str,
        actor_id: &str,
        target_uid: &str,
        role: Option<Role>,
        note: &str,
    ) {
        let membership = match role {
            Some(_) => self.store.write_member_flag(tenant_id, target_uid).await,
            None => self.store.delete_member_flag(tenant_id, target_uid).await,
        };
        if let Err(e) = membership {
            tracing::warn!(
                tenant = tenant_id,
                uid = target_uid,
                "Falha best-effort ao gravar flag de membership: {}",
                e
            );
        }

        let entry = AuditEntry {
            ts: self.clock.now(),
            actor_uid: actor_id.to_string(),
            target_uid: target_uid.to_string(),
            role: role.map(|r| r.as_str().to_string()).unwrap_or_else(|| "removed".into()),
            note: Some(note.to_string()),
        };
        if let Err(e) = self.store.append_audit(tenant_id, &entry).await {
            tracing::warn!(
                tenant = tenant_id,
                uid = target_uid,
                "Falha best-effort ao gravar auditoria: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::SystemClock;
    use crate::store::kv::KvStore;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn coordinator(kv: Arc<MemoryStore>) -> MutationCoordinator {
        let store = TenantStore::new(kv);
        let guard = AuthorizationGuard::new(store.clone());
        MutationCoordinator::new(store, guard, Arc::new(SystemClock))
    }

    async fn seed_owner(kv: &MemoryStore, tenant: &str, uid: &str) {
        kv.write(&format!("tenants/{tenant}/members/{uid}"), json!(true))
            .await
            .unwrap();
        kv.write(&format!("tenants/{tenant}/roles"), json!({ uid: "owner" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bootstrap_commits_on_fresh_tenant() {
        let kv = Arc::new(MemoryStore::new());
        let coord = coordinator(kv.clone());

        coord.bootstrap_owner("alice", "t1", "alice").await.unwrap();

        let roles = kv.read("tenants/t1/roles").await.unwrap().unwrap();
        assert_eq!(roles["alice"], "owner");
        // Efeito best-effort aplicado.
        assert_eq!(kv.read("tenants/t1/members/alice").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn bootstrap_conflicts_when_owner_exists() {
        let kv = Arc::new(MemoryStore::new());
        seed_owner(&kv, "t1", "alice").await;
        let coord = coordinator(kv.clone());

        let err = coord.bootstrap_owner("bob", "t1", "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // O mapa não foi tocado.
        let roles = kv.read("tenants/t1/roles").await.unwrap().unwrap();
        assert_eq!(roles, json!({"alice": "owner"}));
    }

    #[tokio::test]
    async fn bootstrap_is_self_only() {
        let kv = Arc::new(MemoryStore::new());
        let coord = coordinator(kv);
        let err = coord.bootstrap_owner("alice", "t1", "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_requires_owner_actor() {
        let kv = Arc::new(MemoryStore::new());
        seed_owner(&kv, "t1", "alice").await;
        kv.write("tenants/t1/members/carol", json!(true)).await.unwrap();
        kv.write(
            "tenants/t1/roles",
            json!({"alice": "owner", "carol": "manager"}),
        )
        .await
        .unwrap();
        let coord = coordinator(kv);

        let err = coord
            .update_role("carol", "t1", "alice", Some(Role::Viewer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn last_owner_cannot_be_removed_or_downgraded() {
        let kv = Arc::new(MemoryStore::new());
        seed_owner(&kv, "t1", "alice").await;
        let coord = coordinator(kv.clone());

        let err = coord.update_role("alice", "t1", "alice", None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = coord
            .update_role("alice", "t1", "alice", Some(Role::Manager))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Invariante preservada.
        let roles = kv.read("tenants/t1/roles").await.unwrap().unwrap();
        assert_eq!(roles["alice"], "owner");
    }

    #[tokio::test]
    async fn owner_can_step_down_after_promoting_another() {
        let kv = Arc::new(MemoryStore::new());
        seed_owner(&kv, "t1", "alice").await;
        let coord = coordinator(kv.clone());

        coord
            .update_role("alice", "t1", "bob", Some(Role::Owner))
            .await
            .unwrap();
        coord
            .update_role("alice", "t1", "alice", Some(Role::Viewer))
            .await
            .unwrap();

        let roles = kv.read("tenants/t1/roles").await.unwrap().unwrap();
        assert_eq!(roles["bob"], "owner");
        assert_eq!(roles["alice"], "viewer");
    }

    #[tokio::test]
    async fn removal_drops_membership_flag_best_effort() {
        let kv = Arc::new(MemoryStore::new());
        seed_owner(&kv, "t1", "alice").await;
        kv.write("tenants/t1/members/bob", json!(true)).await.unwrap();
        kv.write(
            "tenants/t1/roles",
            json!({"alice": "owner", "bob": "viewer"}),
        )
        .await
        .unwrap();
        let coord = coordinator(kv.clone());

        coord.update_role("alice", "t1", "bob", None).await.unwrap();

        let roles = kv.read("tenants/t1/roles").await.unwrap().unwrap();
        assert!(roles.get("bob").is_none());
        assert_eq!(kv.read("tenants/t1/members/bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn audit_entry_is_appended_after_commit() {
        let kv = Arc::new(MemoryStore::new());
        let coord = coordinator(kv.clone());

        coord.bootstrap_owner("alice", "t1", "alice").await.unwrap();

        let entries = kv.list_children("tenants/t1/audit/roles").await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
