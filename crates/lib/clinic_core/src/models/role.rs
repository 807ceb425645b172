//! The closed role enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionError;

/// Role held by an identity. Permissions are derived from it at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Nurse,
    Receptionist,
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::Patient,
        Role::Doctor,
        Role::Nurse,
        Role::Receptionist,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Admin => "admin",
        }
    }

    /// Staff roles carry specialty/license attributes instead of a patient link.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Patient)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| PermissionError::UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_role_name() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "unknown_role".parse::<Role>().unwrap_err();
        assert!(matches!(err, PermissionError::UnknownRole(r) if r == "unknown_role"));
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Receptionist).unwrap(), "\"receptionist\"");
    }
}
