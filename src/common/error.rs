use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::kv::StoreError;

// A taxonomia única de erros do plano de controle. Cada variante mapeia
// para exatamente um status HTTP; nunca re-derivamos formas ad hoc por
// call site.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("Não autenticado")]
    Unauthorized,

    #[error("Acesso negado: {0}")]
    Forbidden(&'static str),

    // A condição de aborto de uma mutação otimista se confirmou contra
    // estado fresco (owner já existe, último owner, lock ocupado).
    #[error("Conflito: {0}")]
    Conflict(&'static str),

    #[error("Limite de requisições excedido")]
    RateLimited,

    // Deliberadamente opaco: esconde endpoints atrás de feature flag ou
    // segredo de quem sonda a API sem credenciais.
    #[error("Recurso não encontrado")]
    NotFound,

    // Uma dependência necessária para uma decisão fail-closed está fora
    // do ar ou não foi configurada.
    #[error("Dependência indisponível: {0}")]
    ServiceUnavailable(String),

    // Falha do provedor upstream obrigatório ou de um upstream proxiado.
    // Carrega apenas o nome da fonte e um código grosseiro de motivo,
    // nunca corpo de resposta, chaves ou tokens.
    #[error("Falha no upstream {origin}: {reason}")]
    Upstream { origin: &'static str, reason: String },

    // Erros do armazenamento viram 503: sem leitura confiável não há
    // decisão de autorização possível.
    #[error("Erro no armazenamento")]
    Store(#[from] StoreError),

    #[error("Erro interno do servidor")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::Validation(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::InvalidInput(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            AppError::Upstream { origin, reason } => {
                tracing::warn!(source = origin, reason = %reason, "Falha no upstream");
                let body = Json(json!({
                    "error": "Falha ao consultar o provedor de dados.",
                    "source": origin,
                    "reason": reason,
                }));
                return (StatusCode::BAD_GATEWAY, body).into_response();
            }

            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Credenciais ausentes ou inválidas."),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Limite de requisições excedido."),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Recurso não encontrado."),

            AppError::ServiceUnavailable(ref detail) => {
                tracing::error!("Dependência indisponível: {}", detail);
                (StatusCode::SERVICE_UNAVAILABLE, "Dependência temporariamente indisponível.")
            }
            AppError::Store(ref e) => {
                tracing::error!("Erro no armazenamento: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Dependência temporariamente indisponível.")
            }
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.")
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
