//! # clinic_api
//!
//! HTTP API library for the clinic portal: the authentication endpoints the
//! portal session store talks to, and the permission query endpoints that
//! answer authorization questions with the shared permission table.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, permissions};
use crate::services::directory::UserDirectory;
use crate::services::tokens::RefreshTokenStore;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Account directory.
    pub directory: Arc<UserDirectory>,
    /// Issued refresh tokens (hashed).
    pub refresh_tokens: Arc<RefreshTokenStore>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Empty directory and token store.
    pub fn new(config: ApiConfig) -> Self {
        Self {
            directory: Arc::new(UserDirectory::new()),
            refresh_tokens: Arc::new(RefreshTokenStore::new()),
            config,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(
            routes::POST_AUTH_RESET_PASSWORD,
            post(auth::reset_password_handler),
        )
        .route(
            routes::GET_PERMISSIONS_ROLE,
            get(permissions::role_permissions_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(
            routes::PATCH_AUTH_PROFILE,
            patch(auth::update_profile_handler),
        )
        .route(
            routes::POST_AUTH_VERIFY_2FA,
            post(auth::verify_two_factor_handler),
        )
        .route(
            routes::POST_AUTH_CHANGE_PASSWORD,
            post(auth::change_password_handler),
        )
        .route(routes::GET_PERMISSIONS_CHECK, get(permissions::check_handler))
        .route(routes::GET_PERMISSIONS_ME, get(permissions::me_handler))
        .route(
            routes::POST_PERMISSIONS_VALIDATE,
            post(permissions::validate_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
