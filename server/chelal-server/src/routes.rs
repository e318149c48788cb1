pub mod paths;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{
    handlers::{
        appointments, audit_logs::{self, AuditLog}, auth,
        billing::{self, Bill, BillItem, Payment},
        common::{delete_one, get_one},
        dispensing::{self, DispensingLog},
        encounters::{self, Encounter},
        health,
        inventory::{self, InventoryItem},
        lab_orders::{self, LabOrder},
        login_activity,
        medications::{self, Medication},
        notifications,
        patients::{self, Patient},
        prescriptions::{self, Prescription},
        profile, reports,
        role_change_requests,
        roles::{self, Role},
        stock_batches,
        system_settings::{self, SystemSetting},
        users::{self, User},
        vitals::{self, Vital},
    },
    openapi,
    server::ChelalServer,
};
use pharmacy_service::StockBatch;

/// Liveness, readiness and version. No token required.
pub fn health_routes() -> Router<ChelalServer> {
    Router::new()
        .route(paths::health::HEALTH, get(health::health_check))
        .route(paths::health::READY, get(health::readiness))
        .route(paths::health::VERSION, get(health::version_info))
}

/// Token issuance and self-registration. No token required.
pub fn auth_routes() -> Router<ChelalServer> {
    use paths::auth::*;
    Router::new()
        .route(LOGIN, post(auth::login))
        .route(REFRESH, post(auth::refresh))
        .route(REGISTER, post(auth::register))
}

pub fn account_routes() -> Router<ChelalServer> {
    use paths::accounts::*;
    Router::new()
        .route(ROLES, get(roles::list_roles).post(roles::create_role))
        .route(
            ROLE_BY_ID,
            get(get_one::<Role>)
                .put(roles::update_role)
                .patch(roles::update_role)
                .delete(delete_one::<Role>),
        )
        .route(USERS, get(users::list_users).post(users::create_user))
        .route(USERS_ME, get(users::me))
        .route(
            USER_BY_ID,
            get(get_one::<User>)
                .put(users::update_user)
                .patch(users::update_user)
                .delete(delete_one::<User>),
        )
        .route(USER_ACTIVATE, post(users::activate_user))
        .route(USER_DEACTIVATE, post(users::deactivate_user))
        .route(USER_RESET_PASSWORD, post(users::reset_password))
        .route(USER_ASSIGN_ROLE, post(users::assign_role))
        .route(PROFILE, get(profile::get_profile).put(profile::update_profile))
        .route(
            PREFERENCES,
            get(profile::get_preferences).put(profile::update_preferences),
        )
        .route(LOGIN_ACTIVITY, get(login_activity::list_login_activity))
        .route(
            ROLE_CHANGE_REQUESTS,
            get(role_change_requests::list_requests).post(role_change_requests::create_request),
        )
        .route(ROLE_CHANGE_ASSIGN, post(role_change_requests::assign_role))
        .route(ROLE_CHANGE_REQUEST_BY_ID, get(role_change_requests::get_request))
        .route(ROLE_CHANGE_APPROVE, post(role_change_requests::approve_request))
        .route(ROLE_CHANGE_REJECT, post(role_change_requests::reject_request))
}

pub fn clinical_routes() -> Router<ChelalServer> {
    use paths::clinical::*;
    Router::new()
        .route(PATIENTS, get(patients::list_patients).post(patients::create_patient))
        .route(
            PATIENT_BY_ID,
            get(get_one::<Patient>)
                .put(patients::update_patient)
                .patch(patients::update_patient)
                .delete(delete_one::<Patient>),
        )
        .route(PATIENT_VITALS, get(patients::patient_vitals))
        .route(
            APPOINTMENTS,
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            APPOINTMENT_BY_ID,
            get(appointments::get_appointment)
                .put(appointments::update_appointment)
                .patch(appointments::update_appointment)
                .delete(delete_one::<appointments::Appointment>),
        )
        .route(
            ENCOUNTERS,
            get(encounters::list_encounters).post(encounters::create_encounter),
        )
        .route(
            ENCOUNTER_BY_ID,
            get(get_one::<Encounter>)
                .put(encounters::update_encounter)
                .patch(encounters::update_encounter)
                .delete(delete_one::<Encounter>),
        )
        .route(
            ENCOUNTER_VITALS,
            get(encounters::encounter_vitals).post(encounters::record_encounter_vitals),
        )
        .route(
            ENCOUNTER_LAB_ORDERS,
            get(encounters::encounter_lab_orders).post(encounters::order_encounter_lab_tests),
        )
        .route(VITALS, get(vitals::list_vitals).post(vitals::create_vitals))
        .route(
            VITAL_BY_ID,
            get(get_one::<Vital>)
                .put(vitals::update_vitals)
                .patch(vitals::update_vitals)
                .delete(delete_one::<Vital>),
        )
        .route(
            LAB_ORDERS,
            get(lab_orders::list_lab_orders).post(lab_orders::create_lab_order),
        )
        .route(
            LAB_ORDER_BY_ID,
            get(lab_orders::get_lab_order)
                .put(lab_orders::update_lab_order)
                .patch(lab_orders::update_lab_order)
                .delete(delete_one::<LabOrder>),
        )
        .route(LAB_ORDER_ITEMS, post(lab_orders::add_lab_tests))
        .route(LAB_ORDER_RESULTS, put(lab_orders::record_results))
        .route(
            PRESCRIPTIONS,
            get(prescriptions::list_prescriptions).post(prescriptions::create_prescription),
        )
        .route(CHECK_ALLERGY, post(prescriptions::check_allergy))
        .route(
            PRESCRIPTION_BY_ID,
            get(get_one::<Prescription>)
                .put(prescriptions::update_prescription)
                .patch(prescriptions::update_prescription)
                .delete(delete_one::<Prescription>),
        )
}

pub fn pharmacy_routes() -> Router<ChelalServer> {
    use paths::pharmacy::*;
    Router::new()
        .route(
            MEDICATIONS,
            get(medications::list_medications).post(medications::create_medication),
        )
        .route(MEDICATIONS_BELOW_REORDER, get(medications::list_below_reorder))
        .route(
            MEDICATION_BY_ID,
            get(get_one::<Medication>)
                .put(medications::update_medication)
                .patch(medications::update_medication)
                .delete(delete_one::<Medication>),
        )
        .route(INVENTORY, get(inventory::list_items).post(inventory::create_item))
        .route(INVENTORY_NEAR_EXPIRY, get(inventory::list_near_expiry))
        .route(INVENTORY_VALUATION, get(inventory::stock_valuation_report))
        .route(
            INVENTORY_BY_ID,
            get(get_one::<InventoryItem>)
                .put(inventory::update_item)
                .patch(inventory::update_item)
                .delete(delete_one::<InventoryItem>),
        )
        .route(INVENTORY_BATCHES, get(inventory::item_batches))
        .route(INVENTORY_ADJUST, post(inventory::adjust_stock))
        .route(INVENTORY_DISPENSE, post(inventory::dispense))
        .route(
            STOCK_BATCHES,
            get(stock_batches::list_batches).post(stock_batches::create_batch),
        )
        .route(
            STOCK_BATCH_BY_ID,
            get(get_one::<StockBatch>)
                .put(stock_batches::update_batch)
                .patch(stock_batches::update_batch)
                .delete(stock_batches::delete_batch),
        )
        .route(
            DISPENSING_LOGS,
            get(dispensing::list_dispensing_logs).post(dispensing::create_dispensing_log),
        )
        .route(DISPENSING_LOG_BY_ID, get(get_one::<DispensingLog>))
}

pub fn billing_routes() -> Router<ChelalServer> {
    use paths::billing::*;
    Router::new()
        .route(BILLS, get(billing::list_bills).post(billing::create_bill))
        .route(
            BILL_BY_ID,
            get(billing::get_bill)
                .put(billing::update_bill)
                .patch(billing::update_bill)
                .delete(delete_one::<Bill>),
        )
        .route(
            BILL_PAYMENTS,
            get(billing::list_bill_payments).post(billing::add_bill_payment),
        )
        .route(
            BILL_ITEMS,
            get(billing::list_bill_items).post(billing::create_bill_item),
        )
        .route(
            BILL_ITEM_BY_ID,
            get(get_one::<BillItem>)
                .put(billing::update_bill_item)
                .patch(billing::update_bill_item)
                .delete(billing::delete_bill_item),
        )
        .route(PAYMENTS, get(billing::list_payments).post(billing::create_payment))
        .route(
            PAYMENT_BY_ID,
            get(get_one::<Payment>)
                .put(billing::update_payment)
                .patch(billing::update_payment)
                .delete(billing::delete_payment),
        )
}

pub fn admin_routes() -> Router<ChelalServer> {
    use paths::admin::*;
    Router::new()
        .route(
            NOTIFICATIONS,
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route(NOTIFICATIONS_MARK_ALL_READ, post(notifications::mark_all_read))
        .route(NOTIFICATIONS_UNREAD_COUNT, get(notifications::unread_count))
        .route(
            NOTIFICATION_BY_ID,
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route(NOTIFICATION_MARK_READ, post(notifications::mark_read))
        // Audit rows are append-only: no update or delete routes.
        .route(AUDIT_LOGS, get(audit_logs::list_audit_logs))
        .route(AUDIT_LOG_BY_ID, get(get_one::<AuditLog>))
        .route(
            SYSTEM_SETTINGS,
            get(system_settings::list_settings).post(system_settings::create_setting),
        )
        .route(SYSTEM_SETTINGS_PUBLIC, get(system_settings::public_settings))
        .route(
            SYSTEM_SETTING_BY_ID,
            get(get_one::<SystemSetting>)
                .put(system_settings::update_setting)
                .patch(system_settings::update_setting)
                .delete(delete_one::<SystemSetting>),
        )
}

pub fn report_routes() -> Router<ChelalServer> {
    use paths::reports::*;
    Router::new()
        .route(DASHBOARD, get(reports::dashboard))
        .route(DASHBOARD_STATS, get(reports::dashboard_stats))
        .route(PATIENT_COUNT, get(reports::patient_count))
        .route(APPOINTMENTS_TODAY, get(reports::appointments_today))
        .route(APPOINTMENTS_BY_DOCTOR, get(reports::appointments_by_doctor))
        .route(TOP_MEDICATIONS, get(reports::top_prescribed_medications))
        .route(BILLING_STATS, get(reports::billing_stats))
}

/// Everything under `/api`. Handlers other than auth require a bearer token
/// through their `AuthContext` argument.
pub fn api_routes() -> Router<ChelalServer> {
    Router::new()
        .merge(auth_routes())
        .merge(account_routes())
        .merge(clinical_routes())
        .merge(pharmacy_routes())
        .merge(billing_routes())
        .merge(admin_routes())
        .merge(report_routes())
}

pub fn create_routes() -> Router<ChelalServer> {
    Router::new()
        .merge(health_routes())
        .merge(openapi::create_docs_routes())
        .nest(paths::API, api_routes())
}
