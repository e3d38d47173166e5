//! The authenticated request gateway.

use crate::credential::AccessCredential;
use crate::csrf::{requires_csrf_token, CsrfProvider, CSRF_HEADER_NAME};
use crate::error::{GatewayError, GatewayResult};
use crate::renewal::{RenewalTrigger, SessionAuthority};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Description of an outbound call.
///
/// A fresh `reqwest::Request` is built from this on every attempt, so a
/// replay always carries the credential current at replay time.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    retry: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retry: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> GatewayResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn json_value(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once the request has been replayed after a renewal.
    pub fn is_retry(&self) -> bool {
        self.retry
    }

    fn into_retry(mut self) -> Self {
        self.retry = true;
        self
    }
}

/// Attach the bearer credential and, for state-changing methods, the CSRF
/// token. Missing values are not an error; the server decides.
pub fn decorate(
    builder: RequestBuilder,
    method: &Method,
    credential: Option<&AccessCredential>,
    csrf: &CsrfProvider,
) -> RequestBuilder {
    let mut builder = builder;
    if let Some(credential) = credential {
        builder = builder.bearer_auth(credential.as_str());
    }
    if requires_csrf_token(method.as_str()) {
        if let Some(token) = csrf.token() {
            builder = builder.header(CSRF_HEADER_NAME, token);
        }
    }
    builder
}

/// Turn a non-success response into [`GatewayError::Api`], keeping the
/// server's message as-is.
pub async fn error_from_response(response: Response) -> GatewayError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return GatewayError::Http(e),
    };

    let message = server_message(&body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            trimmed.to_string()
        }
    });

    GatewayError::Api {
        status: status.as_u16(),
        message,
    }
}

fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Wraps every business call with credential attachment and 401 recovery.
#[derive(Clone)]
pub struct ApiGateway {
    http: reqwest::Client,
    base_url: Url,
    csrf: CsrfProvider,
    authority: Arc<dyn SessionAuthority>,
}

impl ApiGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        csrf: CsrfProvider,
        authority: Arc<dyn SessionAuthority>,
    ) -> Self {
        Self {
            http,
            base_url,
            csrf,
            authority,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> GatewayResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request, recovering from a 401 once.
    ///
    /// Every response other than a recoverable 401 is returned unchanged,
    /// including error statuses. A replayed request that is rejected again
    /// is returned to the caller as-is.
    pub async fn send(&self, request: ApiRequest) -> GatewayResult<Response> {
        let used = self.authority.access_credential();
        let response = self.dispatch(&request, used.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if request.is_retry() {
            debug!(
                method = %request.method,
                path = %request.path,
                "replayed request rejected again, passing 401 through"
            );
            return Ok(response);
        }

        let request = request.into_retry();

        // Another caller may have renewed while this request was in flight.
        if let Some(current) = self.authority.access_credential() {
            if used.as_ref() != Some(&current) {
                debug!(path = %request.path, "credential changed since send, replaying");
                return self.dispatch(&request, Some(&current)).await;
            }
        }

        debug!(
            method = %request.method,
            path = %request.path,
            "unauthorized, renewing before replay"
        );
        let credential = self
            .authority
            .renew(RenewalTrigger::Unauthorized)
            .await
            .map_err(|failure| {
                warn!(path = %request.path, reason = %failure, "request abandoned, session expired");
                GatewayError::SessionExpired(failure)
            })?;

        self.dispatch(&request, Some(&credential)).await
    }

    /// Send and decode a JSON body, mapping non-success statuses to
    /// [`GatewayError::Api`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> GatewayResult<T> {
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&AccessCredential>,
    ) -> GatewayResult<Response> {
        let url = self.endpoint(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let builder = decorate(builder, &request.method, credential, &self.csrf);
        Ok(builder.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_prefers_error_key() {
        let body = r#"{"error": "Invalid token", "detail": "ignored"}"#;
        assert_eq!(server_message(body).as_deref(), Some("Invalid token"));
    }

    #[test]
    fn test_server_message_falls_back_to_detail() {
        let body = r#"{"detail": "Authentication credentials were not provided."}"#;
        assert_eq!(
            server_message(body).as_deref(),
            Some("Authentication credentials were not provided.")
        );
    }

    #[test]
    fn test_server_message_absent_for_plain_text() {
        assert_eq!(server_message("Bad Gateway"), None);
        assert_eq!(server_message(r#"{"code": 7}"#), None);
    }

    #[test]
    fn test_request_builder_helpers() {
        let request = ApiRequest::post("/api/v1/quotes/generate/")
            .query("source", "cli")
            .json(&serde_json::json!({"vin": "1HGCM"}))
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.path(), "/api/v1/quotes/generate/");
        assert!(!request.is_retry());
        assert!(request.clone().into_retry().is_retry());
    }
}
