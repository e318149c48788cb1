//! Route path constants
//!
//! Everything except the health endpoints is nested under [`API`]. The
//! `#[utoipa::path]` attributes need string literals, so keep them in sync
//! with these by hand.

pub const API: &str = "/api";

pub mod health {
    pub const HEALTH: &str = "/health";
    pub const READY: &str = "/health/ready";
    pub const VERSION: &str = "/version";
}

pub mod auth {
    pub const LOGIN: &str = "/auth/login";
    pub const REFRESH: &str = "/auth/refresh";
    pub const REGISTER: &str = "/register";
}

pub mod accounts {
    pub const ROLES: &str = "/roles";
    pub const ROLE_BY_ID: &str = "/roles/:id";
    pub const USERS: &str = "/users";
    pub const USERS_ME: &str = "/users/me";
    pub const USER_BY_ID: &str = "/users/:id";
    pub const USER_ACTIVATE: &str = "/users/:id/activate";
    pub const USER_DEACTIVATE: &str = "/users/:id/deactivate";
    pub const USER_RESET_PASSWORD: &str = "/users/:id/reset-password";
    pub const USER_ASSIGN_ROLE: &str = "/users/:id/assign-role";
    pub const PROFILE: &str = "/profile";
    pub const PREFERENCES: &str = "/preferences";
    pub const LOGIN_ACTIVITY: &str = "/login-activity";
    pub const ROLE_CHANGE_REQUESTS: &str = "/role-change-requests";
    pub const ROLE_CHANGE_REQUEST_BY_ID: &str = "/role-change-requests/:id";
    pub const ROLE_CHANGE_APPROVE: &str = "/role-change-requests/:id/approve";
    pub const ROLE_CHANGE_REJECT: &str = "/role-change-requests/:id/reject";
    pub const ROLE_CHANGE_ASSIGN: &str = "/role-change-requests/assign-role";
}

pub mod clinical {
    pub const PATIENTS: &str = "/patients";
    pub const PATIENT_BY_ID: &str = "/patients/:id";
    pub const PATIENT_VITALS: &str = "/patients/:id/vitals";
    pub const APPOINTMENTS: &str = "/appointments";
    pub const APPOINTMENT_BY_ID: &str = "/appointments/:id";
    pub const ENCOUNTERS: &str = "/encounters";
    pub const ENCOUNTER_BY_ID: &str = "/encounters/:id";
    pub const ENCOUNTER_VITALS: &str = "/encounters/:id/vitals";
    pub const ENCOUNTER_LAB_ORDERS: &str = "/encounters/:id/lab-orders";
    pub const VITALS: &str = "/vitals";
    pub const VITAL_BY_ID: &str = "/vitals/:id";
    pub const LAB_ORDERS: &str = "/lab-orders";
    pub const LAB_ORDER_BY_ID: &str = "/lab-orders/:id";
    pub const LAB_ORDER_ITEMS: &str = "/lab-orders/:id/items";
    pub const LAB_ORDER_RESULTS: &str = "/lab-orders/:id/results";
    pub const PRESCRIPTIONS: &str = "/prescriptions";
    pub const PRESCRIPTION_BY_ID: &str = "/prescriptions/:id";
    pub const CHECK_ALLERGY: &str = "/prescriptions/check-allergy";
}

pub mod pharmacy {
    pub const MEDICATIONS: &str = "/medications";
    pub const MEDICATION_BY_ID: &str = "/medications/:id";
    pub const MEDICATIONS_BELOW_REORDER: &str = "/medications/below-reorder";
    pub const INVENTORY: &str = "/inventory";
    pub const INVENTORY_BY_ID: &str = "/inventory/:id";
    pub const INVENTORY_BATCHES: &str = "/inventory/:id/batches";
    pub const INVENTORY_ADJUST: &str = "/inventory/:id/adjust-stock";
    pub const INVENTORY_DISPENSE: &str = "/inventory/:id/dispense";
    pub const INVENTORY_NEAR_EXPIRY: &str = "/inventory/near-expiry";
    pub const INVENTORY_VALUATION: &str = "/inventory/stock-valuation";
    pub const STOCK_BATCHES: &str = "/stock-batches";
    pub const STOCK_BATCH_BY_ID: &str = "/stock-batches/:id";
    pub const DISPENSING_LOGS: &str = "/dispensing-logs";
    pub const DISPENSING_LOG_BY_ID: &str = "/dispensing-logs/:id";
}

pub mod billing {
    pub const BILLS: &str = "/bills";
    pub const BILL_BY_ID: &str = "/bills/:id";
    pub const BILL_PAYMENTS: &str = "/bills/:id/payments";
    pub const BILL_ITEMS: &str = "/bill-items";
    pub const BILL_ITEM_BY_ID: &str = "/bill-items/:id";
    pub const PAYMENTS: &str = "/payments";
    pub const PAYMENT_BY_ID: &str = "/payments/:id";
}

pub mod admin {
    pub const NOTIFICATIONS: &str = "/notifications";
    pub const NOTIFICATION_BY_ID: &str = "/notifications/:id";
    pub const NOTIFICATION_MARK_READ: &str = "/notifications/:id/mark-read";
    pub const NOTIFICATIONS_MARK_ALL_READ: &str = "/notifications/mark-all-read";
    pub const NOTIFICATIONS_UNREAD_COUNT: &str = "/notifications/unread-count";
    pub const AUDIT_LOGS: &str = "/audit-logs";
    pub const AUDIT_LOG_BY_ID: &str = "/audit-logs/:id";
    pub const SYSTEM_SETTINGS: &str = "/system-settings";
    pub const SYSTEM_SETTING_BY_ID: &str = "/system-settings/:id";
    pub const SYSTEM_SETTINGS_PUBLIC: &str = "/system-settings/public";
}

pub mod reports {
    pub const DASHBOARD: &str = "/dashboard";
    pub const DASHBOARD_STATS: &str = "/dashboard-stats";
    pub const PATIENT_COUNT: &str = "/report/patient-count";
    pub const APPOINTMENTS_TODAY: &str = "/report/appointments-today";
    pub const APPOINTMENTS_BY_DOCTOR: &str = "/report/appointments-by-doctor";
    pub const TOP_MEDICATIONS: &str = "/report/top-prescribed-medications";
    pub const BILLING_STATS: &str = "/report/billing-stats";
}
