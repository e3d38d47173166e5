//! CLI command implementations.

mod auth;
mod quotes;

pub use auth::whoami;
pub use quotes::{quote_approve, quote_generate, quote_preview, quote_status};

use crate::output::OutputFormat;
use anyhow::{bail, Context as _, Result};
use client_config_and_utils::Config;
use session_auth::{SessionManager, SessionManagerBuilder};
use tracing::warn;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub email: Option<String>,
}

/// Build a session, restore it from the cookie jar and sign in when an
/// email was given. Without an email the session stays anonymous.
async fn open_session(ctx: &Context) -> Result<SessionManager> {
    let session = SessionManagerBuilder::from_config(&ctx.config)?
        .login_redirect(|path| warn!(login_path = path, "session ended, sign in again"))
        .build()?;

    session.initialize().await;
    if session.is_authenticated() {
        return Ok(session);
    }

    let Some(email) = ctx.email.as_deref() else {
        return Ok(session);
    };

    let password = read_password()?;
    session
        .login(email, &password)
        .await
        .context("Login failed")?;
    Ok(session)
}

/// Log out if the command left a live session behind.
async fn close_session(session: &SessionManager) {
    if session.is_authenticated() {
        session.logout().await;
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("GLASSQUOTE_PASSWORD") {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}
