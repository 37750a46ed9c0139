// src/models/roles.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Papel de um usuário dentro de um tenant. A ordem das variantes define
/// o rank: `Viewer < ShiftManager < Manager < Owner`; checagens de
/// acesso exigem `rank >= rank mínimo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    ShiftManager,
    Manager,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::ShiftManager => "shift_manager",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }

    /// Conversão estrita a partir do valor armazenado. Qualquer string
    /// desconhecida é tratada como "sem papel válido" pelo guard.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "viewer" => Some(Role::Viewer),
            "shift_manager" => Some(Role::ShiftManager),
            "manager" => Some(Role::Manager),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

/// Registro imutável de auditoria, escrito best-effort depois que a
/// mutação de papel comita. Não participa da transação.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub actor_uid: String,
    pub target_uid: String,
    /// Papel resultante, ou `"removed"` quando a atribuição foi apagada.
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// O Payload para o auto-bootstrap do primeiro owner
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapOwnerPayload {
    #[schema(example = "padaria-central")]
    #[validate(length(min = 1, max = 128))]
    pub tenant_id: String,

    #[schema(example = "uid-do-proprio-chamador")]
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
}

// O Payload para atualizar (ou remover) o papel de um usuário
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolePayload {
    #[validate(length(min = 1, max = 128))]
    pub tenant_id: String,

    #[validate(length(min = 1, max = 128))]
    pub target_uid: String,

    /// `null` remove a atribuição do usuário.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleMutationResponse {
    pub status: &'static str,
    pub tenant_id: String,
    pub target_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_order_matches_hierarchy() {
        assert!(Role::Owner > Role::Manager);
        assert!(Role::Manager > Role::ShiftManager);
        assert!(Role::ShiftManager > Role::Viewer);
    }

    #[test]
    fn parse_rejects_unknown_roles() {
        assert_eq!(Role::parse("owner"), Some(Role::Owner));
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn serde_uses_snake_case_strings() {
        assert_eq!(serde_json::to_value(Role::ShiftManager).unwrap(), "shift_manager");
        let parsed: Role = serde_json::from_value(serde_json::json!("owner")).unwrap();
        assert_eq!(parsed, Role::Owner);
    }
}
