//! Permission query handlers.
//!
//! Read-only views over `clinic_core::permissions`, keyed off the identity
//! attached by the auth middleware.

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use clinic_core::models::Role;
use clinic_core::permissions::{
    self, Action, Resource, ResourceKind, can_access_resource, get_permissions_for_role,
};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    MyPermissionsResponse, PermissionCheckQuery, PermissionCheckResponse,
    RolePermissionsResponse, ValidateRequest, ValidateResponse,
};

/// `GET /api/permissions/check?permission=...` or `?resource=...&action=...`.
pub async fn check_handler(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<PermissionCheckQuery>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let allowed = match (&query.permission, &query.resource, &query.action) {
        (Some(permission), _, _) => permissions::has_permission(&user, permission),
        (None, Some(resource), Some(action)) => {
            let kind: ResourceKind = resource.parse()?;
            let action: Action = action.parse()?;
            let resource = Resource {
                kind,
                owner_id: query.owner_id.clone(),
            };
            can_access_resource(&user, &resource, action)
        }
        _ => {
            return Err(AppError::Validation(
                "Provide either permission, or resource and action".into(),
            ));
        }
    };

    Ok(Json(PermissionCheckResponse {
        has_permission: allowed,
        user_role: user.role,
        user_permissions: user.permissions,
    }))
}

/// `GET /api/permissions/me`: the caller's role and permission set.
pub async fn me_handler(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<MyPermissionsResponse> {
    Json(MyPermissionsResponse {
        role: user.role,
        permissions: user.permissions,
        is_active: user.is_active,
    })
}

/// `GET /api/permissions/role/{role}`: permissions granted to a role.
pub async fn role_permissions_handler(
    Path(role): Path<String>,
) -> AppResult<Json<RolePermissionsResponse>> {
    let permissions = get_permissions_for_role(&role)?;
    let role: Role = role.parse()?;
    Ok(Json(RolePermissionsResponse { role, permissions }))
}

/// `POST /api/permissions/validate`: resource check with an explicit target.
///
/// A patient naming any `targetUserId` other than their own is denied
/// before the generic rules run.
pub async fn validate_handler(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(body): Json<ValidateRequest>,
) -> AppResult<Json<ValidateResponse>> {
    let kind: ResourceKind = body.resource.parse()?;
    let action: Action = body.action.parse()?;

    if user.role == Role::Patient
        && let Some(target) = body.target_user_id.as_deref()
        && !user.owns(target)
    {
        debug!(
            user_id = %user.id,
            target_user_id = %target,
            "patient denied access to another identity"
        );
        return Ok(Json(ValidateResponse {
            can_perform_action: false,
            reason: "Patients can only access their own data".into(),
        }));
    }

    let owner_id = match (&body.target_user_id, user.role) {
        (Some(target), _) => Some(target.clone()),
        (None, Role::Patient) => Some(user.id.clone()),
        (None, _) => None,
    };
    let resource = Resource { kind, owner_id };
    let allowed = can_access_resource(&user, &resource, action);

    let reason = if allowed {
        "Access granted".to_string()
    } else {
        format!("Insufficient permissions to {action} {kind}")
    };

    Ok(Json(ValidateResponse {
        can_perform_action: allowed,
        reason,
    }))
}
