//! Resource-scoped authorization.
//!
//! Role membership alone is not enough for patient-owned data: a patient
//! identity may only act on resource instances it owns, whatever its
//! permission set says. Ownership is checked before any permission lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{
    BOOK_APPOINTMENTS, EDIT_MEDICAL_RECORDS, MANAGE_APPOINTMENTS, MANAGE_BILLING, MANAGE_PATIENTS,
    MANAGE_SCHEDULE, MANAGE_SETTINGS, MANAGE_USERS, PRESCRIBE_MEDICATION, PermissionError,
    SEND_MESSAGES, UPDATE_VITALS, VIEW_APPOINTMENTS, VIEW_BILLING, VIEW_MEDICAL_RECORDS,
    VIEW_OWN_RECORDS, VIEW_PATIENTS, VIEW_PRESCRIPTIONS, VIEW_REPORTS, has_any_permission,
};
use crate::models::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Appointment,
    MedicalRecord,
    Prescription,
    Billing,
    Patient,
    Message,
    Report,
    Schedule,
    User,
    Settings,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Appointment,
        ResourceKind::MedicalRecord,
        ResourceKind::Prescription,
        ResourceKind::Billing,
        ResourceKind::Patient,
        ResourceKind::Message,
        ResourceKind::Report,
        ResourceKind::Schedule,
        ResourceKind::User,
        ResourceKind::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Appointment => "appointment",
            ResourceKind::MedicalRecord => "medical_record",
            ResourceKind::Prescription => "prescription",
            ResourceKind::Billing => "billing",
            ResourceKind::Patient => "patient",
            ResourceKind::Message => "message",
            ResourceKind::Report => "report",
            ResourceKind::Schedule => "schedule",
            ResourceKind::User => "user",
            ResourceKind::Settings => "settings",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = PermissionError;

    /// Accepts singular or plural names (`appointment` / `appointments`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let singular = s.strip_suffix('s').unwrap_or(s);
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.as_str() == singular)
            .ok_or_else(|| PermissionError::UnknownResource(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" | "view" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" | "edit" | "write" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(PermissionError::UnknownAction(other.to_string())),
        }
    }
}

/// A concrete resource instance, optionally tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    /// User or patient-record id owning the instance.
    pub owner_id: Option<String>,
}

impl Resource {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            owner_id: None,
        }
    }

    pub fn owned_by(kind: ResourceKind, owner_id: impl Into<String>) -> Self {
        Self {
            kind,
            owner_id: Some(owner_id.into()),
        }
    }
}

/// Permissions that each satisfy `action` on `kind`. Empty means admin only.
fn satisfying_permissions(kind: ResourceKind, action: Action) -> &'static [&'static str] {
    use Action::*;
    use ResourceKind as K;

    match (kind, action) {
        (K::Appointment, Read) => &[VIEW_APPOINTMENTS],
        (K::Appointment, Create) => &[BOOK_APPOINTMENTS, MANAGE_APPOINTMENTS],
        (K::Appointment, Update | Delete) => &[MANAGE_APPOINTMENTS, BOOK_APPOINTMENTS],

        (K::MedicalRecord, Read) => &[VIEW_MEDICAL_RECORDS, VIEW_OWN_RECORDS],
        (K::MedicalRecord, Create | Update) => &[EDIT_MEDICAL_RECORDS, UPDATE_VITALS],
        (K::MedicalRecord, Delete) => &[],

        (K::Prescription, Read) => &[VIEW_PRESCRIPTIONS],
        (K::Prescription, _) => &[PRESCRIBE_MEDICATION],

        (K::Billing, Read) => &[VIEW_BILLING],
        (K::Billing, _) => &[MANAGE_BILLING],

        (K::Patient, Read) => &[VIEW_PATIENTS, VIEW_OWN_RECORDS],
        (K::Patient, Create | Update) => &[MANAGE_PATIENTS],
        (K::Patient, Delete) => &[],

        (K::Message, _) => &[SEND_MESSAGES],

        (K::Report, Read) => &[VIEW_REPORTS],
        (K::Report, _) => &[],

        (K::Schedule, Read) => &[MANAGE_SCHEDULE, VIEW_APPOINTMENTS],
        (K::Schedule, _) => &[MANAGE_SCHEDULE],

        (K::User, _) => &[MANAGE_USERS],
        (K::Settings, _) => &[MANAGE_SETTINGS],
    }
}

/// Resource-scoped check.
///
/// Inactive identities are denied everything. Patient identities are
/// restricted to resources they own before permissions are consulted;
/// admins pass every rule.
pub fn can_access_resource(user: &User, resource: &Resource, action: Action) -> bool {
    if !user.is_active {
        return false;
    }

    if user.role == Role::Patient {
        let owned = resource
            .owner_id
            .as_deref()
            .is_some_and(|owner| user.owns(owner));
        if !owned {
            return false;
        }
    }

    if user.role == Role::Admin {
        return true;
    }

    has_any_permission(user, satisfying_permissions(resource.kind, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::has_permission;
    use crate::permissions::tests::user_with_role;

    #[test]
    fn patient_reads_own_record() {
        let patient = user_with_role("p-1", Role::Patient);
        let record = Resource::owned_by(ResourceKind::MedicalRecord, "p-1");
        assert!(can_access_resource(&patient, &record, Action::Read));
    }

    #[test]
    fn patient_denied_other_patients_record_despite_permission() {
        let patient = user_with_role("p-1", Role::Patient);
        assert!(has_permission(&patient, VIEW_OWN_RECORDS));

        let record = Resource::owned_by(ResourceKind::MedicalRecord, "p-2");
        assert!(!can_access_resource(&patient, &record, Action::Read));

        let bill = Resource::owned_by(ResourceKind::Billing, "p-2");
        assert!(has_permission(&patient, VIEW_BILLING));
        assert!(!can_access_resource(&patient, &bill, Action::Read));
    }

    #[test]
    fn patient_denied_unowned_resource() {
        let patient = user_with_role("p-1", Role::Patient);
        let any = Resource::new(ResourceKind::Appointment);
        assert!(!can_access_resource(&patient, &any, Action::Read));
    }

    #[test]
    fn patient_ownership_does_not_grant_missing_permission() {
        let patient = user_with_role("p-1", Role::Patient);
        let rx = Resource::owned_by(ResourceKind::Prescription, "p-1");
        assert!(can_access_resource(&patient, &rx, Action::Read));
        assert!(!can_access_resource(&patient, &rx, Action::Create));
    }

    #[test]
    fn patient_linked_record_counts_as_owned() {
        let mut patient = user_with_role("u-1", Role::Patient);
        patient.patient_id = Some("p-77".into());
        let appt = Resource::owned_by(ResourceKind::Appointment, "p-77");
        assert!(can_access_resource(&patient, &appt, Action::Update));
    }

    #[test]
    fn doctor_reads_any_patients_record() {
        let doctor = user_with_role("d-1", Role::Doctor);
        let record = Resource::owned_by(ResourceKind::MedicalRecord, "p-2");
        assert!(can_access_resource(&doctor, &record, Action::Read));
        assert!(can_access_resource(&doctor, &record, Action::Update));
        assert!(!can_access_resource(&doctor, &record, Action::Delete));
    }

    #[test]
    fn receptionist_manages_billing_not_prescriptions() {
        let desk = user_with_role("r-1", Role::Receptionist);
        assert!(can_access_resource(&desk, &Resource::new(ResourceKind::Billing), Action::Update));
        assert!(!can_access_resource(
            &desk,
            &Resource::new(ResourceKind::Prescription),
            Action::Create
        ));
    }

    #[test]
    fn admin_passes_admin_only_rules() {
        let admin = user_with_role("a-1", Role::Admin);
        let record = Resource::owned_by(ResourceKind::MedicalRecord, "p-2");
        assert!(can_access_resource(&admin, &record, Action::Delete));
        assert!(can_access_resource(&admin, &Resource::new(ResourceKind::Report), Action::Delete));
    }

    #[test]
    fn inactive_identity_is_denied() {
        let mut admin = user_with_role("a-1", Role::Admin);
        admin.is_active = false;
        assert!(!can_access_resource(&admin, &Resource::new(ResourceKind::User), Action::Read));
    }

    #[test]
    fn parses_resource_and_action_names() {
        assert_eq!("appointments".parse::<ResourceKind>().unwrap(), ResourceKind::Appointment);
        assert_eq!("medical_record".parse::<ResourceKind>().unwrap(), ResourceKind::MedicalRecord);
        assert_eq!("settings".parse::<ResourceKind>().unwrap(), ResourceKind::Settings);
        assert_eq!("edit".parse::<Action>().unwrap(), Action::Update);
        assert!(matches!(
            "spaceship".parse::<ResourceKind>(),
            Err(PermissionError::UnknownResource(_))
        ));
        assert!(matches!("launch".parse::<Action>(), Err(PermissionError::UnknownAction(_))));
    }
}
