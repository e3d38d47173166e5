//! Quote commands.

use super::{close_session, open_session, Context};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Context as _, Result};
use quote_jobs::{
    JobId, JobOutcome, PollLimit, QuoteId, QuoteJobTracker, QuoteRequest, StatusSnapshot,
};
use session_auth::SessionManager;
use std::path::Path;
use tracing::warn;

async fn open_tracker(ctx: &Context) -> Result<(SessionManager, QuoteJobTracker)> {
    let session = open_session(ctx).await?;
    let tracker = QuoteJobTracker::from_config(session.gateway(), &ctx.config);
    Ok((session, tracker))
}

async fn submit_and_wait(
    tracker: &QuoteJobTracker,
    request: &QuoteRequest,
    no_wait: bool,
    max_attempts: u32,
) -> Result<(JobId, Option<JobOutcome>)> {
    let job_id = tracker.submit(request).await?;
    if no_wait {
        return Ok((job_id, None));
    }
    let mut poller = tracker.poller(job_id.clone());
    let limit = PollLimit::attempts(max_attempts);
    loop {
        match poller.wait_until_terminal(limit).await {
            Ok(outcome) => return Ok((job_id, Some(outcome))),
            Err(e) if e.is_transient() => {
                warn!(job_id = %job_id, error = %e, "status poll failed, retrying at next interval");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Submit a quote request and, unless told otherwise, wait for the job.
pub async fn quote_generate(
    ctx: &Context,
    request_path: &Path,
    no_wait: bool,
    max_attempts: u32,
) -> Result<()> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read {}", request_path.display()))?;
    let request = QuoteRequest::from_json_str(&raw)?;

    let (session, tracker) = open_tracker(ctx).await?;
    let result = submit_and_wait(&tracker, &request, no_wait, max_attempts).await;
    close_session(&session).await;
    let (job_id, outcome) = result?;

    let Some(outcome) = outcome else {
        output::print_success(&format!("Quote job {} submitted", job_id), &ctx.format);
        return Ok(());
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&outcome),
        OutputFormat::Text => {
            output::print_heading("Quote job");
            output::print_row("Job ID", job_id.as_str());
            if let Some(snapshot) = outcome.last_snapshot() {
                print_snapshot(snapshot);
            }
        }
    }

    match outcome {
        JobOutcome::Completed(_) => Ok(()),
        JobOutcome::Failed(snapshot) => bail!(
            "Quote generation failed: {}",
            snapshot.error.as_deref().unwrap_or("no reason given")
        ),
        JobOutcome::GaveUp { .. } => bail!(
            "Job {} still running after {} polls, check it later with 'glassquote quote status {}'",
            job_id,
            max_attempts,
            job_id
        ),
    }
}

/// Poll a job once.
pub async fn quote_status(ctx: &Context, job_id: &str) -> Result<()> {
    let job_id = JobId::new(job_id);
    let (session, tracker) = open_tracker(ctx).await?;
    let result = tracker.poll(&job_id).await;
    close_session(&session).await;
    let snapshot = result?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&snapshot),
        OutputFormat::Text => {
            output::print_heading("Quote job");
            output::print_row("Job ID", snapshot.task_id.as_str());
            print_snapshot(&snapshot);
        }
    }
    Ok(())
}

/// Fetch a generated quote and record the view.
pub async fn quote_preview(ctx: &Context, quote_id: &str) -> Result<()> {
    let quote_id = QuoteId::new(quote_id);
    let (session, tracker) = open_tracker(ctx).await?;
    let result = tracker.preview(&quote_id).await;
    if result.is_ok() {
        tracker.track_view(&quote_id).await;
    }
    close_session(&session).await;
    let quote = result?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&quote),
        OutputFormat::Text => {
            output::print_heading("Quote");
            output::print_row("ID", quote.id().unwrap_or("-"));
            output::print_row("State", quote.state().unwrap_or("-"));
        }
    }
    Ok(())
}

/// Approve a quote with its emailed token.
pub async fn quote_approve(ctx: &Context, quote_id: &str, token: &str) -> Result<()> {
    let quote_id = QuoteId::new(quote_id);
    let (session, tracker) = open_tracker(ctx).await?;
    let result = tracker.approve(&quote_id, token).await;
    close_session(&session).await;
    let result = result?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&result),
        OutputFormat::Text => {
            let message = result.message.as_deref().unwrap_or(&result.status);
            output::print_success(message, &ctx.format);
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    output::print_row("Status", snapshot.status.as_str());
    if let Some(progress) = snapshot.progress {
        output::print_row("Progress", &format!("{:.0}%", progress));
    }
    if let Some(quote_id) = &snapshot.quote_id {
        output::print_row("Quote ID", quote_id.as_str());
    }
    if let Some(message) = &snapshot.message {
        output::print_row("Message", message);
    }
    if let Some(error) = &snapshot.error {
        output::print_row("Error", error);
    }
}
