//! Identity commands.

use super::{close_session, open_session, Context};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use session_auth::AuthError;

/// Show the identity the backend associates with this session.
pub async fn whoami(ctx: &Context) -> Result<()> {
    let session = open_session(ctx).await?;
    let result = session.current_user().await;
    close_session(&session).await;
    let identity = match result {
        Err(AuthError::NotLoggedIn) => {
            bail!("Not logged in. Pass --email or set GLASSQUOTE_EMAIL")
        }
        other => other?,
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&identity),
        OutputFormat::Text => {
            output::print_heading("Session");
            output::print_row("User ID", identity.id.as_deref().unwrap_or("-"));
            output::print_row("Email", identity.email.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}
