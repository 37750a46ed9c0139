// src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use opsboard::config::AppState;
use opsboard::middleware::auth::auth_guard;
use opsboard::{docs, handlers};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Mutações de papéis (protegidas por JWT)
    let role_routes = Router::new()
        .route("/bootstrap-owner", post(handlers::roles::bootstrap_owner))
        .route("/roles", post(handlers::roles::update_role))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Analytics diário: check e backfill (protegidas por JWT)
    let analytics_routes = Router::new()
        .route("/check", get(handlers::analytics::check))
        .route("/backfill", post(handlers::analytics::backfill))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Leituras proxiadas allow-listed (protegidas por JWT)
    let data_routes = Router::new()
        .route("/upstream", get(handlers::upstream::gated_read))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal. O job agendado e o status
    // público de alertas ficam fora do middleware de JWT.
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route(
            "/api/public/alert-status",
            get(handlers::upstream::public_alert_status),
        )
        .route(
            "/api/jobs/daily-build",
            post(handlers::analytics::scheduled_build),
        )
        .route("/api/docs/openapi.json", get(docs::openapi_json))
        .nest("/api/tenants", role_routes)
        .nest("/api/analytics", analytics_routes)
        .nest("/api/data", data_routes)
        .with_state(app_state);

    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
