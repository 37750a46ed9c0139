// src/middleware/client_ip.rs

use axum::{extract::FromRequestParts, http::request::Parts};

/// IP do cliente para as chaves de rate limit. Atrás do proxy de borda
/// vale o primeiro hop do X-Forwarded-For; sem cabeçalho, uma chave
/// fixa (melhor agrupar tudo do que deixar de limitar).
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());

        let real_ip = parts
            .headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());

        Ok(ClientIp(
            forwarded
                .or(real_ip)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}
