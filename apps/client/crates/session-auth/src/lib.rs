//! Session lifecycle for the quote client.
//!
//! [`SessionManager`] restores a session from the refresh cookie on cold
//! start, logs in with email and password, keeps the access credential fresh
//! with a proactive renewal task, and logs out. It shares one
//! [`request_gateway::RenewalCoordinator`] with the [`request_gateway::ApiGateway`]
//! it builds, so 401 recovery and the proactive timer never race each other.

pub mod auth_fsm;
mod error;
mod identity;
mod refresh;
mod session;

pub use auth_fsm::{SessionState, SessionStateChangedPayload};
pub use error::{AuthError, AuthResult};
pub use identity::UserIdentity;
pub use refresh::{RefreshClient, ME_PATH, REFRESH_PATH};
pub use session::{
    LoginRedirect, SessionManager, SessionManagerBuilder, SessionStateCallback, LOGIN_PATH,
    LOGOUT_PATH,
};
