//! The permission table.
//!
//! A closed mapping from [`Role`] to the permissions it grants, plus the
//! resource-scoped rules in [`resource`]. This is the only place the table
//! is defined: the portal uses it for optimistic UI checks and the API
//! server uses it for the authoritative ones.

pub mod resource;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{Role, User};

pub use resource::{Action, Resource, ResourceKind, can_access_resource};

// =============================================================================
// Permission strings
// =============================================================================

pub const VIEW_OWN_RECORDS: &str = "view_own_records";
pub const VIEW_MEDICAL_RECORDS: &str = "view_medical_records";
pub const EDIT_MEDICAL_RECORDS: &str = "edit_medical_records";
pub const UPDATE_VITALS: &str = "update_vitals";

pub const VIEW_APPOINTMENTS: &str = "view_appointments";
pub const BOOK_APPOINTMENTS: &str = "book_appointments";
pub const MANAGE_APPOINTMENTS: &str = "manage_appointments";
pub const MANAGE_SCHEDULE: &str = "manage_schedule";

pub const VIEW_PRESCRIPTIONS: &str = "view_prescriptions";
pub const PRESCRIBE_MEDICATION: &str = "prescribe_medication";

pub const VIEW_PATIENTS: &str = "view_patients";
pub const MANAGE_PATIENTS: &str = "manage_patients";

pub const VIEW_BILLING: &str = "view_billing";
pub const MANAGE_BILLING: &str = "manage_billing";

pub const SEND_MESSAGES: &str = "send_messages";
pub const VIEW_REPORTS: &str = "view_reports";
pub const MANAGE_USERS: &str = "manage_users";
pub const MANAGE_SETTINGS: &str = "manage_settings";

const PATIENT: &[&str] = &[
    VIEW_OWN_RECORDS,
    VIEW_APPOINTMENTS,
    BOOK_APPOINTMENTS,
    VIEW_PRESCRIPTIONS,
    VIEW_BILLING,
    SEND_MESSAGES,
];

const DOCTOR: &[&str] = &[
    VIEW_PATIENTS,
    VIEW_MEDICAL_RECORDS,
    EDIT_MEDICAL_RECORDS,
    PRESCRIBE_MEDICATION,
    VIEW_PRESCRIPTIONS,
    VIEW_APPOINTMENTS,
    MANAGE_SCHEDULE,
    SEND_MESSAGES,
    VIEW_REPORTS,
];

const NURSE: &[&str] = &[
    VIEW_PATIENTS,
    VIEW_MEDICAL_RECORDS,
    UPDATE_VITALS,
    VIEW_PRESCRIPTIONS,
    VIEW_APPOINTMENTS,
    SEND_MESSAGES,
];

const RECEPTIONIST: &[&str] = &[
    VIEW_PATIENTS,
    MANAGE_PATIENTS,
    VIEW_APPOINTMENTS,
    BOOK_APPOINTMENTS,
    MANAGE_APPOINTMENTS,
    MANAGE_SCHEDULE,
    VIEW_BILLING,
    MANAGE_BILLING,
    SEND_MESSAGES,
];

const ADMIN: &[&str] = &[
    VIEW_OWN_RECORDS,
    VIEW_MEDICAL_RECORDS,
    EDIT_MEDICAL_RECORDS,
    UPDATE_VITALS,
    VIEW_APPOINTMENTS,
    BOOK_APPOINTMENTS,
    MANAGE_APPOINTMENTS,
    MANAGE_SCHEDULE,
    VIEW_PRESCRIPTIONS,
    PRESCRIBE_MEDICATION,
    VIEW_PATIENTS,
    MANAGE_PATIENTS,
    VIEW_BILLING,
    MANAGE_BILLING,
    SEND_MESSAGES,
    VIEW_REPORTS,
    MANAGE_USERS,
    MANAGE_SETTINGS,
];

/// Authorization lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Invalid role: {0}")]
    UnknownRole(String),

    #[error("Invalid resource: {0}")]
    UnknownResource(String),

    #[error("Invalid action: {0}")]
    UnknownAction(String),
}

/// Static permission slice for a role.
pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::Patient => PATIENT,
        Role::Doctor => DOCTOR,
        Role::Nurse => NURSE,
        Role::Receptionist => RECEPTIONIST,
        Role::Admin => ADMIN,
    }
}

/// Owned permission set for a role, as stored on an issued identity.
pub fn permission_set(role: Role) -> BTreeSet<String> {
    permissions_for(role).iter().map(|p| p.to_string()).collect()
}

/// Look up a role by name. Fails for names outside the closed enumeration.
pub fn get_permissions_for_role(role: &str) -> Result<BTreeSet<String>, PermissionError> {
    let role: Role = role.parse()?;
    Ok(permission_set(role))
}

/// True iff `permission` is in the identity's granted set.
pub fn has_permission(user: &User, permission: &str) -> bool {
    user.permissions.contains(permission)
}

/// True iff any of `permissions` is granted.
pub fn has_any_permission(user: &User, permissions: &[&str]) -> bool {
    permissions.iter().any(|p| has_permission(user, p))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Preferences;

    pub(crate) fn user_with_role(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            role,
            permissions: permission_set(role),
            is_active: true,
            phone: None,
            specialty: None,
            license_number: None,
            patient_id: None,
            preferences: Preferences::default(),
        }
    }

    #[test]
    fn every_role_has_permissions() {
        for role in Role::ALL {
            assert!(!permissions_for(role).is_empty(), "{role} has no permissions");
        }
    }

    #[test]
    fn admin_holds_every_permission() {
        let admin: BTreeSet<&str> = ADMIN.iter().copied().collect();
        for role in Role::ALL {
            for p in permissions_for(role) {
                assert!(admin.contains(p), "admin is missing {p}");
            }
        }
    }

    #[test]
    fn lookup_by_name_matches_table() {
        let perms = get_permissions_for_role("doctor").unwrap();
        assert!(perms.contains(PRESCRIBE_MEDICATION));
        assert!(!perms.contains(MANAGE_USERS));
        assert_eq!(perms.len(), DOCTOR.len());
    }

    #[test]
    fn lookup_unknown_role_fails() {
        assert_eq!(
            get_permissions_for_role("unknown_role").unwrap_err(),
            PermissionError::UnknownRole("unknown_role".into())
        );
    }

    #[test]
    fn has_permission_checks_granted_set_only() {
        let mut user = user_with_role("u-1", Role::Patient);
        assert!(has_permission(&user, VIEW_BILLING));
        assert!(!has_permission(&user, MANAGE_BILLING));

        user.permissions.clear();
        assert!(!has_permission(&user, VIEW_BILLING));
    }

    #[test]
    fn has_any_permission_matches_one() {
        let user = user_with_role("u-1", Role::Nurse);
        assert!(has_any_permission(&user, &[MANAGE_USERS, UPDATE_VITALS]));
        assert!(!has_any_permission(&user, &[MANAGE_USERS, MANAGE_BILLING]));
        assert!(!has_any_permission(&user, &[]));
    }

    #[test]
    fn patients_cannot_prescribe() {
        assert!(!permissions_for(Role::Patient).contains(&PRESCRIBE_MEDICATION));
    }
}
