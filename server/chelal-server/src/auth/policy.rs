//! Role gate
//!
//! Every resource carries a [`Policy`]: an OR over independent predicates.
//! Admins always pass. Read-only verbs pass when the policy includes
//! [`Predicate::ReadOnly`] or [`Predicate::PublicRead`]; only the latter
//! admits callers without a token. Wrong role and missing role produce the
//! same 403 body.

use crate::error::{ApiError, ApiResult};
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RoleName {
    Admin,
    Doctor,
    Nurse,
    Pharmacist,
    Receptionist,
    Patient,
}

impl RoleName {
    pub const ALL: [RoleName; 6] = [
        RoleName::Admin,
        RoleName::Doctor,
        RoleName::Nurse,
        RoleName::Pharmacist,
        RoleName::Receptionist,
        RoleName::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "Admin",
            RoleName::Doctor => "Doctor",
            RoleName::Nurse => "Nurse",
            RoleName::Pharmacist => "Pharmacist",
            RoleName::Receptionist => "Receptionist",
            RoleName::Patient => "Patient",
        }
    }

    /// Case-insensitive comparison against a stored role name.
    pub fn matches(&self, role: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(role.trim())
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleName::ALL
            .into_iter()
            .find(|role| role.matches(s))
            .ok_or_else(|| ApiError::validation(format!("Unknown role: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// GET, HEAD and OPTIONS for any caller, with or without a token
    PublicRead,
    /// GET, HEAD and OPTIONS for any signed-in caller
    ReadOnly,
    /// Every verb for holders of the role
    Role(RoleName),
    /// Every verb for any authenticated caller
    Authenticated,
}

impl Predicate {
    fn allows(&self, method: &Method, role: Option<&str>) -> bool {
        match self {
            Predicate::PublicRead | Predicate::ReadOnly => is_read_only(method),
            Predicate::Role(required) => role.is_some_and(|r| required.matches(r)),
            Predicate::Authenticated => true,
        }
    }
}

pub fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub resource: &'static str,
    /// Empty means admin only.
    pub predicates: &'static [Predicate],
}

impl Policy {
    pub const fn new(resource: &'static str, predicates: &'static [Predicate]) -> Self {
        Self {
            resource,
            predicates,
        }
    }

    pub fn allows(&self, method: &Method, role: Option<&str>) -> bool {
        if role.is_some_and(|r| RoleName::Admin.matches(r)) {
            return true;
        }
        self.predicates.iter().any(|p| p.allows(method, role))
    }

    /// Whether a caller without a token may use `method` on this resource.
    pub fn allows_anonymous(&self, method: &Method) -> bool {
        is_read_only(method) && self.predicates.contains(&Predicate::PublicRead)
    }

    pub fn authorize(&self, method: &Method, role: Option<&str>) -> ApiResult<()> {
        if self.allows(method, role) {
            Ok(())
        } else {
            tracing::info!(
                resource = self.resource,
                method = %method,
                role = role.unwrap_or("<none>"),
                "Permission denied"
            );
            Err(ApiError::authorization(PERMISSION_DENIED))
        }
    }
}

use Predicate::{Authenticated, PublicRead, ReadOnly, Role};
use RoleName::{Doctor, Nurse, Pharmacist, Receptionist};

pub const ROLES: Policy = Policy::new("roles", &[PublicRead]);
pub const USERS: Policy = Policy::new("users", &[PublicRead]);
pub const PATIENTS: Policy =
    Policy::new("patients", &[PublicRead, Role(Receptionist), Role(Doctor)]);
pub const APPOINTMENTS: Policy =
    Policy::new("appointments", &[ReadOnly, Role(Receptionist), Role(Doctor)]);
pub const ENCOUNTERS: Policy = Policy::new("encounters", &[PublicRead, Role(Doctor)]);
pub const PRESCRIPTIONS: Policy = Policy::new("prescriptions", &[PublicRead, Role(Doctor)]);
pub const VITALS: Policy = Policy::new("vitals", &[PublicRead, Role(Nurse), Role(Doctor)]);
pub const LAB_ORDERS: Policy = Policy::new("lab_orders", &[ReadOnly, Role(Doctor), Role(Nurse)]);
pub const MEDICATIONS: Policy = Policy::new("medications", &[ReadOnly, Role(Doctor), Role(Pharmacist)]);
pub const INVENTORY: Policy = Policy::new("inventory", &[PublicRead, Role(Pharmacist)]);
pub const STOCK_BATCHES: Policy = Policy::new("stock_batches", &[PublicRead, Role(Pharmacist)]);
pub const DISPENSING: Policy = Policy::new("dispensing_logs", &[PublicRead, Role(Pharmacist)]);
pub const BILLING: Policy = Policy::new("billing", &[ReadOnly, Role(Receptionist)]);
pub const NOTIFICATIONS: Policy = Policy::new("notifications", &[Authenticated]);
pub const ROLE_CHANGE_REQUESTS: Policy = Policy::new("role_change_requests", &[Authenticated]);
pub const PROFILE: Policy = Policy::new("profile", &[Authenticated]);
pub const REPORTS: Policy = Policy::new("reports", &[ReadOnly]);
pub const AUDIT_LOGS: Policy = Policy::new("audit_logs", &[]);
pub const SYSTEM_SETTINGS: Policy = Policy::new("system_settings", &[]);
/// Admin-only actions on otherwise readable resources.
pub const ADMIN_ONLY: Policy = Policy::new("admin", &[]);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MUTATING: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

    const ROLE_RESTRICTED: [(Policy, &[RoleName]); 10] = [
        (PATIENTS, &[Receptionist, Doctor]),
        (APPOINTMENTS, &[Receptionist, Doctor]),
        (ENCOUNTERS, &[Doctor]),
        (PRESCRIPTIONS, &[Doctor]),
        (VITALS, &[Nurse, Doctor]),
        (LAB_ORDERS, &[Doctor, Nurse]),
        (MEDICATIONS, &[Doctor, Pharmacist]),
        (INVENTORY, &[Pharmacist]),
        (BILLING, &[Receptionist]),
        (AUDIT_LOGS, &[]),
    ];

    #[test]
    fn role_names_are_case_insensitive() {
        assert!(Nurse.matches("nurse"));
        assert!(Nurse.matches("NURSE "));
        assert!(!Nurse.matches("Nurses"));
        assert_eq!("pharmacist".parse::<RoleName>().unwrap(), Pharmacist);
    }

    #[test]
    fn admin_passes_everything() {
        for method in MUTATING {
            assert!(AUDIT_LOGS.allows(&method, Some("admin")));
            assert!(INVENTORY.allows(&method, Some("Admin")));
        }
    }

    #[test]
    fn reads_pass_unless_admin_only() {
        assert!(INVENTORY.allows(&Method::GET, None));
        assert!(PATIENTS.allows(&Method::HEAD, Some("Patient")));
        assert!(!AUDIT_LOGS.allows(&Method::GET, Some("Doctor")));
        assert!(!SYSTEM_SETTINGS.allows(&Method::GET, None));
    }

    #[test]
    fn only_public_reads_admit_anonymous_callers() {
        assert!(PATIENTS.allows_anonymous(&Method::GET));
        assert!(INVENTORY.allows_anonymous(&Method::HEAD));
        assert!(!PATIENTS.allows_anonymous(&Method::POST));
        assert!(!BILLING.allows_anonymous(&Method::GET));
        assert!(!APPOINTMENTS.allows_anonymous(&Method::GET));
        assert!(!NOTIFICATIONS.allows_anonymous(&Method::GET));
        assert!(!AUDIT_LOGS.allows_anonymous(&Method::GET));
    }

    #[test]
    fn nurse_may_record_vitals() {
        assert!(VITALS.allows(&Method::POST, Some("Nurse")));
    }

    #[test]
    fn receptionist_may_not_touch_inventory() {
        let err = INVENTORY
            .authorize(&Method::POST, Some("Receptionist"))
            .unwrap_err();
        assert_eq!(err.to_string(), PERMISSION_DENIED);
    }

    #[test]
    fn no_role_and_wrong_role_look_the_same() {
        let no_role = BILLING.authorize(&Method::POST, None).unwrap_err();
        let wrong_role = BILLING.authorize(&Method::POST, Some("Nurse")).unwrap_err();
        assert_eq!(no_role.to_string(), wrong_role.to_string());
        assert_eq!(no_role.status_code(), wrong_role.status_code());
    }

    #[test]
    fn authenticated_predicate_allows_any_role() {
        assert!(NOTIFICATIONS.allows(&Method::POST, None));
        assert!(ROLE_CHANGE_REQUESTS.allows(&Method::POST, Some("Patient")));
    }

    proptest! {
        #[test]
        fn mutations_need_a_listed_role(
            role_idx in 1usize..6,
            method_idx in 0usize..4,
            policy_idx in 0usize..10,
        ) {
            let role = RoleName::ALL[role_idx];
            let method = &MUTATING[method_idx];
            let (policy, allowed) = ROLE_RESTRICTED[policy_idx];

            let permitted = policy.allows(method, Some(role.as_str()));
            prop_assert_eq!(permitted, allowed.contains(&role));
        }
    }
}
