//! The network-level renewal routine.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use request_gateway::{
    decorate, error_from_response, AccessCredential, CredentialRenewer, CsrfProvider,
    GatewayError, RenewalFailure,
};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Exchanges the refresh cookie for a new access credential.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh/";

/// Returns the current user for a bearer credential.
pub const ME_PATH: &str = "/api/v1/auth/me/";

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Calls `/auth/refresh/` directly on the shared client.
///
/// Bypasses the gateway so a 401 from the refresh endpoint cannot recurse
/// into another renewal. The refresh cookie is attached by the cookie jar.
#[derive(Clone)]
pub struct RefreshClient {
    http: Client,
    base_url: Url,
    csrf: CsrfProvider,
}

impl RefreshClient {
    pub fn new(http: Client, base_url: Url, csrf: CsrfProvider) -> Self {
        Self {
            http,
            base_url,
            csrf,
        }
    }

    async fn request_refresh(&self) -> AuthResult<AccessCredential> {
        let url = self.base_url.join(REFRESH_PATH)?;
        let response = decorate(self.http.post(url), &Method::POST, None, &self.csrf)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match error_from_response(response).await {
                GatewayError::Api { status, message }
                    if status == StatusCode::UNAUTHORIZED.as_u16() =>
                {
                    AuthError::SessionExpired(message)
                }
                other => AuthError::Gateway(other),
            });
        }

        let body: RefreshResponse = response.json().await?;
        if body.access_token.is_empty() {
            return Err(AuthError::SessionExpired(
                "refresh returned an empty access token".to_string(),
            ));
        }
        Ok(AccessCredential::new(body.access_token))
    }
}

#[async_trait]
impl CredentialRenewer for RefreshClient {
    async fn renew(&self) -> Result<AccessCredential, RenewalFailure> {
        self.request_refresh().await.map_err(|e| {
            debug!(error = %e, "refresh request failed");
            RenewalFailure::new(e.to_string())
        })
    }
}
