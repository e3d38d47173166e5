//! Authenticated request gateway for the quote client.
//!
//! Every business call goes through [`ApiGateway`]. Before a request is sent
//! the current access credential and, for state-changing methods, the CSRF
//! token are attached. A 401 triggers a single shared renewal through the
//! [`RenewalCoordinator`]; concurrent failures wait on that one renewal and
//! replay together once it settles.

mod credential;
mod csrf;
mod error;
mod gateway;
mod http;
mod renewal;

pub use credential::{AccessCredential, CredentialStore};
pub use csrf::{requires_csrf_token, CsrfProvider, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{decorate, error_from_response, ApiGateway, ApiRequest};
pub use http::build_http_client;
pub use renewal::{
    CredentialRenewer, RenewalCoordinator, RenewalFailure, RenewalListener, RenewalTrigger,
    SessionAuthority,
};
