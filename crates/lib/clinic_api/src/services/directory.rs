//! In-memory account directory.
//!
//! Accounts are keyed by id with a secondary email index. Permissions on
//! every stored identity are derived from its role when the account is
//! created and are never edited independently.

use clinic_core::auth::AuthError;
use clinic_core::auth::password::hash_password;
use clinic_core::models::{Preferences, ProfileUpdate, Role, User};
use clinic_core::permissions::permission_set;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

/// Password shared by the seeded demo accounts.
pub const DEMO_PASSWORD: &str = "clinic-demo-pass";

/// Two-factor code enrolled on the seeded admin account.
pub const DEMO_TWO_FACTOR_CODE: &str = "246810";

/// Stored account: identity plus credentials.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
    pub two_factor_code: Option<String>,
}

/// Input for [`UserDirectory::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub patient_id: Option<String>,
}

impl NewUser {
    pub fn new(email: &str, name: &str, role: Role, password: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            role,
            password: password.to_string(),
            phone: None,
            specialty: None,
            license_number: None,
            patient_id: None,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<String, UserRecord>,
    emails: DashMap<String, String>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account, returning the issued identity.
    ///
    /// The email is claimed atomically; concurrent registrations of one
    /// address yield exactly one account.
    pub fn create_user(&self, new: NewUser) -> Result<User, AuthError> {
        let email = normalize_email(&new.email);

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            name: new.name,
            role: new.role,
            permissions: permission_set(new.role),
            is_active: true,
            phone: new.phone,
            specialty: new.specialty.filter(|_| new.role.is_staff()),
            license_number: new.license_number.filter(|_| new.role.is_staff()),
            patient_id: new.patient_id.filter(|_| !new.role.is_staff()),
            preferences: Preferences::default(),
        };
        let record = UserRecord {
            user: user.clone(),
            password_hash: hash_password(&new.password)?,
            two_factor_code: None,
        };

        match self.emails.entry(email) {
            Entry::Occupied(_) => Err(AuthError::ValidationError(
                "Email already registered".into(),
            )),
            Entry::Vacant(slot) => {
                self.users.insert(user.id.clone(), record);
                slot.insert(user.id.clone());
                Ok(user)
            }
        }
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        let id = self.emails.get(&normalize_email(email))?.value().clone();
        self.users.get(&id).map(|r| r.value().clone())
    }

    pub fn get_record(&self, user_id: &str) -> Option<UserRecord> {
        self.users.get(user_id).map(|r| r.value().clone())
    }

    pub fn get(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|r| r.user.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Apply a profile update, returning the updated identity.
    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Option<User> {
        let mut record = self.users.get_mut(user_id)?;
        record.user.apply_update(update);
        Some(record.user.clone())
    }

    pub fn set_password_hash(&self, user_id: &str, password_hash: String) -> bool {
        match self.users.get_mut(user_id) {
            Some(mut record) => {
                record.password_hash = password_hash;
                true
            }
            None => false,
        }
    }

    pub fn enroll_two_factor(&self, user_id: &str, code: &str) -> bool {
        match self.users.get_mut(user_id) {
            Some(mut record) => {
                record.two_factor_code = Some(code.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_active(&self, user_id: &str, active: bool) -> bool {
        match self.users.get_mut(user_id) {
            Some(mut record) => {
                record.user.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Seed one account per role, all sharing [`DEMO_PASSWORD`].
    pub fn seed_demo_accounts(&self) -> Result<(), AuthError> {
        for role in Role::ALL {
            let email = format!("{role}@example.com");
            if self.emails.contains_key(&email) {
                continue;
            }
            let mut new = NewUser::new(&email, &demo_name(role), role, DEMO_PASSWORD);
            match role {
                Role::Patient => new.patient_id = Some("patient-0001".into()),
                Role::Doctor => {
                    new.specialty = Some("Family Medicine".into());
                    new.license_number = Some("MD-100200".into());
                }
                Role::Nurse => new.license_number = Some("RN-300400".into()),
                Role::Receptionist | Role::Admin => {}
            }
            let user = self.create_user(new)?;
            if role == Role::Admin {
                self.enroll_two_factor(&user.id, DEMO_TWO_FACTOR_CODE);
            }
            info!(email = %user.email, role = %role, "seeded demo account");
        }
        Ok(())
    }
}

fn demo_name(role: Role) -> String {
    match role {
        Role::Patient => "Pat Example",
        Role::Doctor => "Dr. Dana Example",
        Role::Nurse => "Nora Example",
        Role::Receptionist => "Rae Example",
        Role::Admin => "Ada Example",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_user_permissions_follow_role() {
        let dir = UserDirectory::new();
        let user = dir
            .create_user(NewUser::new("Nurse@Example.com ", "N", Role::Nurse, "password1"))
            .unwrap();
        assert_eq!(user.email, "nurse@example.com");
        assert_eq!(user.permissions, permission_set(Role::Nurse));
        assert!(dir.find_by_email("NURSE@example.com").is_some());
    }

    #[test]
    fn duplicate_email_rejected() {
        let dir = UserDirectory::new();
        dir.create_user(NewUser::new("a@example.com", "A", Role::Admin, "password1"))
            .unwrap();
        let err = dir
            .create_user(NewUser::new("a@example.com", "B", Role::Doctor, "password1"))
            .unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[test]
    fn concurrent_registrations_of_one_email_create_one_account() {
        let dir = UserDirectory::new();
        let created = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let dir = &dir;
                    scope.spawn(move || {
                        dir.create_user(NewUser::new(
                            "race@example.com",
                            &format!("Racer {i}"),
                            Role::Receptionist,
                            "password1",
                        ))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(Result::is_ok)
                .count()
        });
        assert_eq!(created, 1);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn patient_cannot_carry_staff_fields() {
        let dir = UserDirectory::new();
        let mut new = NewUser::new("p@example.com", "P", Role::Patient, "password1");
        new.specialty = Some("surgery".into());
        new.patient_id = Some("pr-1".into());
        let user = dir.create_user(new).unwrap();
        assert!(user.specialty.is_none());
        assert_eq!(user.patient_id.as_deref(), Some("pr-1"));
    }

    #[test]
    fn seeding_is_idempotent() {
        let dir = UserDirectory::new();
        dir.seed_demo_accounts().unwrap();
        dir.seed_demo_accounts().unwrap();
        assert_eq!(dir.len(), Role::ALL.len());
        let admin = dir.find_by_email("admin@example.com").unwrap();
        assert_eq!(admin.two_factor_code.as_deref(), Some(DEMO_TWO_FACTOR_CODE));
    }
}
