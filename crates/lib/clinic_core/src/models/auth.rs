//! Authentication domain models.
//!
//! `User` and `Session` are shared verbatim by the API server (which issues
//! them) and the portal client (which holds and persists them). The wire
//! shape of a login/refresh answer is kept loose in [`AuthResponse`] so the
//! client can tell a malformed answer apart from a rejected one.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::Role;

/// Schema version written into [`PersistedSession`].
pub const PERSISTED_SESSION_VERSION: u32 = 1;

/// Errors raised while turning server or storage data into a [`Session`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Response did not contain an access token")]
    MissingAccessToken,

    #[error("Response did not contain a user")]
    MissingUser,

    #[error("Malformed user in response: {0}")]
    MalformedUser(String),

    #[error("Response did not contain an expiry")]
    MissingExpiry,

    #[error("Unsupported persisted session version {0}")]
    UnsupportedVersion(u32),
}

/// Notification channels a user has opted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: false,
            push: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Per-user portal preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: String,
    #[serde(default)]
    pub notifications: NotificationPreferences,
    #[serde(default)]
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            notifications: NotificationPreferences::default(),
            theme: Theme::default(),
        }
    }
}

/// Partial update of [`Preferences`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationPreferences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl Preferences {
    pub fn apply(&mut self, update: &PreferencesUpdate) {
        if let Some(language) = &update.language {
            self.language = language.clone();
        }
        if let Some(notifications) = &update.notifications {
            self.notifications = notifications.clone();
        }
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Granted permissions, derived from `role` when the session was issued.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Staff only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    /// Staff only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    /// Patients only: the patient record this account is linked to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Merge server-confirmed profile fields, keeping everything else.
    pub fn apply_update(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(phone) = &update.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(specialty) = &update.specialty {
            self.specialty = Some(specialty.clone());
        }
        if let Some(license) = &update.license_number {
            self.license_number = Some(license.clone());
        }
        if let Some(prefs) = &update.preferences {
            self.preferences.apply(prefs);
        }
    }

    /// True if `owner_id` names this identity or the patient record it is linked to.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.id == owner_id || self.patient_id.as_deref() == Some(owner_id)
    }
}

/// Profile fields a user may change about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<PreferencesUpdate>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

/// Login/refresh answer as it arrives on the wire.
///
/// Every field is optional here; [`Session::from_auth_response`] decides
/// whether the answer is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until expiry, used when `expires_at` is absent.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// One authenticated browser instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    /// Validate a server answer and build a session from it.
    pub fn from_auth_response(resp: AuthResponse, now: DateTime<Utc>) -> Result<Self, SessionError> {
        let access_token = resp
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingAccessToken)?;

        let user_json = resp.user.ok_or(SessionError::MissingUser)?;
        let user: User = serde_json::from_value(user_json)
            .map_err(|e| SessionError::MalformedUser(e.to_string()))?;
        if user.id.is_empty() || user.email.is_empty() {
            return Err(SessionError::MalformedUser("empty id or email".into()));
        }

        let expires_at = match (resp.expires_at, resp.expires_in) {
            (Some(at), _) => at,
            (None, Some(secs)) => now + Duration::seconds(secs),
            (None, None) => return Err(SessionError::MissingExpiry),
        };

        Ok(Self {
            access_token,
            refresh_token: resp.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            user,
        })
    }

    /// A session is valid only while `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Time left before expiry; negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Reduce to the shape written to durable storage.
    pub fn to_persisted(&self, last_login: Option<DateTime<Utc>>) -> PersistedSession {
        PersistedSession {
            version: PERSISTED_SESSION_VERSION,
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
            user: self.user.clone(),
            last_login,
        }
    }

    /// Rebuild a session (and its last-login marker) from durable storage.
    pub fn from_persisted(
        persisted: PersistedSession,
    ) -> Result<(Self, Option<DateTime<Utc>>), SessionError> {
        if persisted.version != PERSISTED_SESSION_VERSION {
            return Err(SessionError::UnsupportedVersion(persisted.version));
        }
        let session = Self {
            access_token: persisted.access_token,
            refresh_token: persisted.refresh_token,
            expires_at: persisted.expires_at,
            user: persisted.user,
        };
        Ok((session, persisted.last_login))
    }
}

/// Serialization boundary for a session surviving a reload.
///
/// Decoupled from any in-memory store shape: loading/error flags never land
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    pub last_login: Option<DateTime<Utc>>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}
