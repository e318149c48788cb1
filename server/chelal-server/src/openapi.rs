use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::server::ChelalServer;

/// Registers the `bearer_auth` scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::version_info,
        crate::handlers::health::readiness,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh,
        crate::handlers::auth::register,
        crate::handlers::inventory::dispense,
        crate::handlers::prescriptions::check_allergy,
        crate::handlers::billing::add_bill_payment,
        crate::handlers::reports::dashboard,
    ),
    components(
        schemas(
            crate::handlers::health::HealthResponse,
            crate::handlers::health::VersionResponse,
            crate::handlers::health::ReadinessResponse,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::RefreshRequest,
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::RegisterResponse,
            crate::auth::TokenPair,
            crate::auth::RoleName,
            crate::services::AuditAction,
            crate::handlers::users::User,
            crate::handlers::roles::Role,
            crate::handlers::patients::Patient,
            crate::handlers::appointments::Appointment,
            crate::handlers::encounters::Encounter,
            crate::handlers::vitals::Vital,
            crate::handlers::lab_orders::LabOrder,
            crate::handlers::lab_orders::LabOrderItem,
            crate::handlers::prescriptions::Prescription,
            crate::handlers::prescriptions::AllergyCheckRequest,
            crate::handlers::prescriptions::AllergyCheckResponse,
            crate::handlers::medications::Medication,
            crate::handlers::inventory::InventoryItem,
            crate::handlers::inventory::DispenseRequest,
            crate::handlers::inventory::DispenseResponse,
            crate::handlers::dispensing::DispensingLog,
            pharmacy_service::StockBatch,
            crate::handlers::billing::Bill,
            crate::handlers::billing::BillItem,
            crate::handlers::billing::Payment,
            crate::handlers::billing::NewPayment,
            crate::handlers::billing::PaymentReceipt,
            billing_service::PaymentMethod,
            billing_service::PaymentStatus,
            crate::handlers::notifications::Notification,
            crate::handlers::audit_logs::AuditLog,
            crate::handlers::system_settings::SystemSetting,
            crate::handlers::role_change_requests::RoleChangeRequest,
            crate::handlers::reports::Dashboard,
            crate::handlers::reports::SystemHealth,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "authentication", description = "Login, token refresh and registration"),
        (name = "clinical", description = "Patients, encounters and prescriptions"),
        (name = "pharmacy", description = "Inventory, stock batches and dispensing"),
        (name = "billing", description = "Bills, items and payments"),
        (name = "reports", description = "Dashboard and aggregate reports"),
    ),
    info(
        title = "Chelal HMS API",
        description = "Hospital management backend: patients, appointments, encounters, pharmacy, billing and reporting.",
    ),
)]
pub struct ApiDoc;

pub fn create_docs_routes() -> Router<ChelalServer> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_registers_bearer_scheme_and_dispense_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/inventory/{id}/dispense"));
        let schemes = doc.components.map(|c| c.security_schemes).unwrap_or_default();
        assert!(schemes.contains_key("bearer_auth"));
    }
}
