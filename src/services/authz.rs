// src/services/authz.rs

use serde_json::Value;

use crate::common::error::AppError;
use crate::models::roles::Role;
use crate::store::kv::StoreError;
use crate::store::tenant_store::{validate_id, TenantStore};

/// Guardião de acesso fail-closed. Qualquer incerteza (timeout, erro de
/// leitura, valor inesperado) resolve para negação — nunca para
/// permissão. O papel é sempre relido do armazenamento a cada request,
/// para que mudanças valham imediatamente; claims de token nunca são
/// fonte de papel.
#[derive(Clone)]
pub struct AuthorizationGuard {
    store: TenantStore,
}

impl AuthorizationGuard {
    pub fn new(store: TenantStore) -> Self {
        Self { store }
    }

    /// Retorna o papel do chamador quando `rank >= min_role`; caso
    /// contrário uma negação tipada.
    pub async fn require_access(
        &self,
        caller_id: &str,
        tenant_id: &str,
        min_role: Role,
    ) -> Result<Role, AppError> {
        // 1. Valida os ids antes de qualquer I/O.
        validate_id("callerId", caller_id)?;
        validate_id("tenantId", tenant_id)?;

        // 2. Membership: só o booleano `true` conta. Erro de leitura é
        // incerteza, e incerteza nega.
        let flag = self
            .store
            .member_flag(tenant_id, caller_id)
            .await
            .map_err(unavailable)?;
        match flag {
            Some(Value::Bool(true)) => {}
            _ => return Err(AppError::Forbidden("Você não é membro deste tenant.")),
        }

        // 3. Papel: relido do mapa a cada request, sob o mesmo timeout.
        let role_map = self
            .store
            .role_map(tenant_id)
            .await
            .map_err(unavailable)?;
        let role = role_map
            .as_ref()
            .and_then(|m| m.get(caller_id))
            .and_then(|v| v.as_str())
            .and_then(Role::parse)
            .ok_or(AppError::Forbidden("Você não possui um papel válido neste tenant."))?;

        // 4. Comparação de rank.
        if role < min_role {
            return Err(AppError::Forbidden("Seu papel não é suficiente para esta operação."));
        }

        Ok(role)
    }
}

fn unavailable(e: StoreError) -> AppError {
    AppError::ServiceUnavailable(format!("leitura de autorização falhou: {e}"))
}
