pub mod appointments;
pub mod audit_logs;
pub mod auth;
pub mod billing;
pub mod common;
pub mod dispensing;
pub mod encounters;
pub mod health;
pub mod inventory;
pub mod lab_orders;
pub mod login_activity;
pub mod medications;
pub mod notifications;
pub mod patients;
pub mod prescriptions;
pub mod profile;
pub mod reports;
pub mod role_change_requests;
pub mod roles;
pub mod stock_batches;
pub mod system_settings;
pub mod users;
pub mod vitals;
