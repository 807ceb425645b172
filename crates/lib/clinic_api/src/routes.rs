//! Route paths served by [`crate::router`].

pub const POST_AUTH_LOGIN: &str = "/api/auth/login";
pub const POST_AUTH_LOGOUT: &str = "/api/auth/logout";
pub const POST_AUTH_REFRESH: &str = "/api/auth/refresh";
pub const PATCH_AUTH_PROFILE: &str = "/api/auth/profile";
pub const POST_AUTH_VERIFY_2FA: &str = "/api/auth/verify-2fa";
pub const POST_AUTH_RESET_PASSWORD: &str = "/api/auth/reset-password";
pub const POST_AUTH_CHANGE_PASSWORD: &str = "/api/auth/change-password";

pub const GET_PERMISSIONS_CHECK: &str = "/api/permissions/check";
pub const GET_PERMISSIONS_ME: &str = "/api/permissions/me";
pub const GET_PERMISSIONS_ROLE: &str = "/api/permissions/role/{role}";
pub const POST_PERMISSIONS_VALIDATE: &str = "/api/permissions/validate";
