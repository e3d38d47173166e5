//! Shared HTTP client construction.

use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;

/// Build the process-wide client.
///
/// The jar is shared with the [`crate::CsrfProvider`]; it stores the
/// refresh and CSRF cookies and sends them back on every call.
pub fn build_http_client(jar: Arc<Jar>, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(jar)
        .timeout(timeout)
        .user_agent(concat!("glassquote/", env!("CARGO_PKG_VERSION")))
        .build()
}
