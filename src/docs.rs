// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Roles ---
        handlers::roles::bootstrap_owner,
        handlers::roles::update_role,

        // --- Analytics ---
        handlers::analytics::check,
        handlers::analytics::backfill,
        handlers::analytics::scheduled_build,

        // --- Data ---
        handlers::upstream::gated_read,
        handlers::upstream::public_alert_status,
    ),
    components(
        schemas(
            // --- Roles ---
            models::roles::Role,
            models::roles::AuditEntry,
            models::roles::BootstrapOwnerPayload,
            models::roles::UpdateRolePayload,
            models::roles::RoleMutationResponse,

            // --- Analytics ---
            models::analytics::SourceStatus,
            models::analytics::RevenueBlock,
            models::analytics::HourlyBucket,
            models::analytics::StaffingSummary,
            models::analytics::WeatherFeatures,
            models::analytics::AlertFeatures,
            models::analytics::DocumentMeta,
            models::analytics::DailyAnalyticsDocument,
            models::analytics::SkipEntry,
            models::analytics::BackfillReport,
            models::analytics::TenantSkipEntry,
            models::analytics::ScheduledReport,

            // --- Payloads ---
            handlers::analytics::AnalyticsTotals,
            handlers::analytics::AnalyticsCheckResponse,
            handlers::analytics::BackfillPayload,
            handlers::analytics::ScheduledBuildPayload,
        )
    ),
    tags(
        (name = "Roles", description = "Papéis e Associação por Tenant"),
        (name = "Analytics", description = "Documentos Diários, Backfill e Jobs"),
        (name = "Data", description = "Leituras Proxiadas e Status Público")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

// GET /api/docs/openapi.json
pub async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDoc::openapi())
}
