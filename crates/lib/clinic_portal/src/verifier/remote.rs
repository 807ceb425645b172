//! HTTP credential exchange against the clinic API.

use async_trait::async_trait;
use clinic_core::models::{AuthResponse, ProfileUpdate};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{CredentialVerifier, LoginRequest};
use crate::error::{PortalError, VerifierError};

/// [`CredentialVerifier`] backed by the `/api/auth/*` endpoints.
#[derive(Debug, Clone)]
pub struct RemoteVerifier {
    client: Client,
    base: Url,
}

impl RemoteVerifier {
    pub fn new(base_url: &str) -> Result<Self, PortalError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, PortalError> {
        let base = Url::parse(base_url)
            .map_err(|e| PortalError::Config(format!("API URL {base_url:?}: {e}")))?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url, VerifierError> {
        self.base
            .join(path)
            .map_err(|e| VerifierError::Transport(format!("bad URL {path}: {e}")))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<RequestBuilder, VerifierError> {
        let mut builder = self.client.request(method, self.url(path)?);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<Response, VerifierError> {
        let resp = self
            .request(method, path, bearer)?
            .json(body)
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(rejection(resp).await)
    }

    async fn send_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<R, VerifierError> {
        self.send(method, path, bearer, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| VerifierError::Decode(e.to_string()))
    }
}

/// Turn a non-success response into a rejection carrying the server message.
async fn rejection(resp: Response) -> VerifierError {
    let status = resp.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string();
    let message = match resp.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(fallback),
        Err(_) => fallback,
    };
    VerifierError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CredentialVerifier for RemoteVerifier {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, VerifierError> {
        self.send_json(Method::POST, "/api/auth/login", None, request)
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, VerifierError> {
        self.send_json(
            Method::POST,
            "/api/auth/refresh",
            None,
            &json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn logout(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), VerifierError> {
        self.send(
            Method::POST,
            "/api/auth/logout",
            Some(access_token),
            &json!({ "refresh_token": refresh_token }),
        )
        .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileUpdate, VerifierError> {
        self.send_json(Method::PATCH, "/api/auth/profile", Some(access_token), update)
            .await
    }

    async fn verify_two_factor(
        &self,
        access_token: &str,
        code: &str,
    ) -> Result<(), VerifierError> {
        self.send(
            Method::POST,
            "/api/auth/verify-2fa",
            Some(access_token),
            &json!({ "code": code }),
        )
        .await?;
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), VerifierError> {
        self.send(
            Method::POST,
            "/api/auth/reset-password",
            None,
            &json!({ "email": email }),
        )
        .await?;
        Ok(())
    }

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), VerifierError> {
        self.send(
            Method::POST,
            "/api/auth/change-password",
            Some(access_token),
            &json!({
                "current_password": current_password,
                "new_password": new_password,
            }),
        )
        .await?;
        Ok(())
    }
}
