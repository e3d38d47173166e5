//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  RestoreAttempt   ┌─────────────────┐
//! │    Anonymous    │ ────────────────► │    Restoring    │
//! │    (initial)    │ ◄──────────────── │                 │
//! └────────┬────────┘   RestoreFailed   └────────┬────────┘
//!          │ LoginSucceeded                      │ RestoreSucceeded
//!          ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Authenticated                      │
//! └────────┬──────────────────────────────────▲─────────────┘
//!          │ RenewalStarted                   │ RenewalSucceeded
//!          ▼                                  │
//! ┌─────────────────┐ ────────────────────────┘
//! │    Expiring     │
//! └────────┬────────┘
//!          │ RenewalFailed / LogoutRequested
//!          ▼
//!      Anonymous
//! ```
//!
//! `LogoutRequested` and `SessionEnded` also lead from `Authenticated`
//! straight back to `Anonymous`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Anonymous)

    Anonymous => {
        RestoreAttempt => Restoring,
        LoginSucceeded => Authenticated
    },
    Restoring => {
        RestoreSucceeded => Authenticated,
        RestoreFailed => Anonymous
    },
    Authenticated => {
        RenewalStarted => Expiring,
        LoginSucceeded => Authenticated,
        LogoutRequested => Anonymous,
        SessionEnded => Anonymous
    },
    Expiring => {
        RenewalSucceeded => Authenticated,
        RenewalFailed => Anonymous,
        LogoutRequested => Anonymous
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Public view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No access credential.
    Anonymous,
    /// Cold-start renewal from the refresh cookie in progress.
    Restoring,
    /// Access credential and identity present.
    Authenticated,
    /// Renewal in flight; the previous identity is still valid.
    Expiring,
}

impl SessionState {
    /// True while a user identity is attached, including mid-renewal.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Expiring)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Restoring => "restoring",
            SessionState::Authenticated => "authenticated",
            SessionState::Expiring => "expiring",
        }
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Anonymous => SessionState::Anonymous,
            SessionMachineState::Restoring => SessionState::Restoring,
            SessionMachineState::Authenticated => SessionState::Authenticated,
            SessionMachineState::Expiring => SessionState::Expiring,
        }
    }
}

/// Payload for session state change notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStateChangedPayload {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
