//! Double-submit CSRF token lookup.

use reqwest::cookie::{CookieStore, Jar};
use std::sync::Arc;
use url::Url;

/// Readable cookie the backend sets with the anti-forgery token.
pub const CSRF_COOKIE_NAME: &str = "csrftoken";

/// Header the backend expects the token echoed in.
pub const CSRF_HEADER_NAME: &str = "X-CSRFToken";

const SAFE_METHODS: [&str; 4] = ["GET", "HEAD", "OPTIONS", "TRACE"];

/// Whether a request with this method must carry the CSRF header.
pub fn requires_csrf_token(method: &str) -> bool {
    let method = method.trim();
    !SAFE_METHODS
        .iter()
        .any(|safe| safe.eq_ignore_ascii_case(method))
}

/// Reads the CSRF token out of the shared cookie jar.
#[derive(Clone)]
pub struct CsrfProvider {
    jar: Arc<Jar>,
    origin: Url,
}

impl CsrfProvider {
    pub fn new(jar: Arc<Jar>, origin: Url) -> Self {
        Self { jar, origin }
    }

    /// Current token, if the server has set one. No side effects.
    pub fn token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let cookies = header.to_str().ok()?;

        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://quotes.test/").unwrap()
    }

    #[test]
    fn test_safe_methods_skip_csrf() {
        assert!(!requires_csrf_token("GET"));
        assert!(!requires_csrf_token("get"));
        assert!(!requires_csrf_token("HEAD"));
        assert!(!requires_csrf_token("Options"));
        assert!(!requires_csrf_token("trace"));
    }

    #[test]
    fn test_state_changing_methods_require_csrf() {
        assert!(requires_csrf_token("post"));
        assert!(requires_csrf_token("POST"));
        assert!(requires_csrf_token("DELETE"));
        assert!(requires_csrf_token("PUT"));
        assert!(requires_csrf_token("patch"));
    }

    #[test]
    fn test_token_absent_without_cookie() {
        let provider = CsrfProvider::new(Arc::new(Jar::default()), origin());
        assert_eq!(provider.token(), None);
    }

    #[test]
    fn test_token_read_among_other_cookies() {
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("sessionid=xyz; Path=/", &origin());
        jar.add_cookie_str("csrftoken=abc123; Path=/", &origin());

        let provider = CsrfProvider::new(jar, origin());
        assert_eq!(provider.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_refresh_cookie_is_not_visible_at_origin() {
        let jar = Arc::new(Jar::default());
        let auth_url = origin().join("/api/v1/auth/refresh/").unwrap();
        jar.add_cookie_str("refresh_token=r; Path=/api/v1/auth/; HttpOnly", &auth_url);

        let provider = CsrfProvider::new(jar, origin());
        assert_eq!(provider.token(), None);
    }
}
