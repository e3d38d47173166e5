//! Session management with an explicit state machine.
//!
//! The [`SessionManager`] owns the credential store, the renewal coordinator
//! and the gateway built on top of them. Renewal outcomes flow back into the
//! session through [`RenewalListener`], whichever caller triggered them.

use crate::auth_fsm::{
    SessionMachine, SessionMachineInput, SessionState, SessionStateChangedPayload,
};
use crate::refresh::{RefreshClient, ME_PATH};
use crate::{AuthError, AuthResult, UserIdentity};
use client_config_and_utils::{
    Config, DEFAULT_LOGIN_PATH, DEFAULT_PROACTIVE_REFRESH_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use parking_lot::{Mutex, RwLock};
use request_gateway::{
    build_http_client, decorate, error_from_response, AccessCredential, ApiGateway,
    CredentialStore, CsrfProvider, GatewayError, RenewalCoordinator, RenewalFailure,
    RenewalListener, RenewalTrigger,
};
use reqwest::cookie::Jar;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

/// Email and password login.
pub const LOGIN_PATH: &str = "/api/v1/auth/login/";

/// Server-side invalidation of the refresh cookie.
pub const LOGOUT_PATH: &str = "/api/v1/auth/logout/";

/// Callback type for session state change notifications.
pub type SessionStateCallback = Box<dyn Fn(SessionStateChangedPayload) + Send + Sync>;

/// Invoked with the configured login path when the session cannot be renewed.
pub type LoginRedirect = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user: UserIdentity,
}

/// Periodic renewal task. Aborted when dropped.
struct ProactiveRenewal {
    handle: JoinHandle<()>,
}

impl Drop for ProactiveRenewal {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// State shared by the manager and the renewal listener.
struct SessionCore {
    fsm: Mutex<SessionMachine>,
    identity: RwLock<Option<UserIdentity>>,
    store: CredentialStore,
    login_path: String,
    state_callback: Option<SessionStateCallback>,
    login_redirect: Option<LoginRedirect>,
    proactive: Mutex<Option<ProactiveRenewal>>,
}

impl SessionCore {
    fn state(&self) -> SessionState {
        SessionState::from(self.fsm.lock().state())
    }

    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        Ok(self
            .transition_if(input, |_| true)?
            .unwrap_or_else(|| self.state()))
    }

    /// Apply `input` only when `allowed` accepts the current state.
    fn transition_if(
        &self,
        input: &SessionMachineInput,
        allowed: impl FnOnce(SessionState) -> bool,
    ) -> AuthResult<Option<SessionState>> {
        let mut fsm = self.fsm.lock();
        let old_state = SessionState::from(fsm.state());
        if !allowed(old_state) {
            return Ok(None);
        }

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = old_state.as_str(),
                new_state = new_state.as_str(),
                "Session state transition"
            );
            self.notify_state_change(new_state);
        }

        Ok(Some(new_state))
    }

    fn notify_state_change(&self, state: SessionState) {
        if let Some(callback) = &self.state_callback {
            let (user_id, email) = self
                .identity
                .read()
                .as_ref()
                .map(|identity| (identity.id.clone(), identity.email.clone()))
                .unwrap_or((None, None));

            callback(SessionStateChangedPayload {
                state,
                user_id,
                email,
            });
        }
    }

    fn stop_proactive_renewal(&self) {
        let task = self.proactive.lock().take();
        if task.is_some() {
            debug!("proactive renewal cancelled");
        }
        drop(task);
    }

    /// Clear every piece of local session state, then move to anonymous.
    fn end_session(&self, input: &SessionMachineInput) {
        self.stop_proactive_renewal();
        self.store.clear();
        *self.identity.write() = None;

        if let Err(e) = self.transition(input) {
            debug!(error = %e, "session already anonymous");
        }
    }

    fn redirect_to_login(&self) {
        match &self.login_redirect {
            Some(redirect) => redirect(&self.login_path),
            None => info!(login_path = %self.login_path, "login required"),
        }
    }
}

impl RenewalListener for SessionCore {
    fn renewal_started(&self, trigger: RenewalTrigger) {
        if trigger == RenewalTrigger::Restore {
            return;
        }
        let _ = self.transition_if(&SessionMachineInput::RenewalStarted, |state| {
            state == SessionState::Authenticated
        });
    }

    fn renewal_succeeded(&self, _trigger: RenewalTrigger) {
        let _ = self.transition_if(&SessionMachineInput::RenewalSucceeded, |state| {
            state == SessionState::Expiring
        });
    }

    fn renewal_failed(&self, trigger: RenewalTrigger, failure: &RenewalFailure) {
        // Cold start reports its own outcome.
        if trigger == RenewalTrigger::Restore {
            return;
        }

        match self.state() {
            SessionState::Expiring => self.end_session(&SessionMachineInput::RenewalFailed),
            SessionState::Authenticated => self.end_session(&SessionMachineInput::SessionEnded),
            _ => self.stop_proactive_renewal(),
        }

        warn!(
            trigger = trigger.as_str(),
            reason = %failure,
            "session could not be renewed, routing to login"
        );
        self.redirect_to_login();
    }
}

/// Clears local session state when dropped, so logout finishes locally even
/// if the server call is cancelled mid-flight.
struct LocalLogout<'a> {
    core: &'a SessionCore,
}

impl Drop for LocalLogout<'_> {
    fn drop(&mut self) {
        self.core
            .end_session(&SessionMachineInput::LogoutRequested);
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    base_url: Url,
    login_path: String,
    proactive_interval: Duration,
    request_timeout: Duration,
    jar: Option<Arc<Jar>>,
    state_callback: Option<SessionStateCallback>,
    login_redirect: Option<LoginRedirect>,
}

impl SessionManagerBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            proactive_interval: Duration::from_secs(DEFAULT_PROACTIVE_REFRESH_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            jar: None,
            state_callback: None,
            login_redirect: None,
        }
    }

    /// Start from a validated client configuration.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        Ok(Self::new(config.api_base_url()?)
            .login_path(config.login_path.clone())
            .proactive_interval(config.proactive_refresh_interval())
            .request_timeout(config.request_timeout()))
    }

    pub fn login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    pub fn proactive_interval(mut self, interval: Duration) -> Self {
        self.proactive_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Use an existing cookie jar instead of a fresh one.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    pub fn state_callback(
        mut self,
        callback: impl Fn(SessionStateChangedPayload) + Send + Sync + 'static,
    ) -> Self {
        self.state_callback = Some(Box::new(callback));
        self
    }

    pub fn login_redirect(mut self, redirect: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.login_redirect = Some(Box::new(redirect));
        self
    }

    pub fn build(self) -> AuthResult<SessionManager> {
        if self.proactive_interval.is_zero() {
            return Err(AuthError::Config(
                "proactive renewal interval must be greater than zero".to_string(),
            ));
        }

        let jar = self.jar.unwrap_or_default();
        let http = build_http_client(jar.clone(), self.request_timeout)?;
        let csrf = CsrfProvider::new(jar, self.base_url.clone());
        let store = CredentialStore::new();

        let core = Arc::new(SessionCore {
            fsm: Mutex::new(SessionMachine::new()),
            identity: RwLock::new(None),
            store: store.clone(),
            login_path: self.login_path,
            state_callback: self.state_callback,
            login_redirect: self.login_redirect,
            proactive: Mutex::new(None),
        });

        let renewer = Arc::new(RefreshClient::new(
            http.clone(),
            self.base_url.clone(),
            csrf.clone(),
        ));
        let coordinator =
            Arc::new(RenewalCoordinator::new(renewer, store).with_listener(core.clone()));
        let gateway = ApiGateway::new(
            http.clone(),
            self.base_url.clone(),
            csrf.clone(),
            coordinator.clone(),
        );

        Ok(SessionManager {
            core,
            coordinator,
            gateway,
            http,
            base_url: self.base_url,
            csrf,
            proactive_interval: self.proactive_interval,
        })
    }
}

/// Owns the session lifecycle and the gateway business calls go through.
pub struct SessionManager {
    core: Arc<SessionCore>,
    coordinator: Arc<RenewalCoordinator>,
    gateway: ApiGateway,
    http: Client,
    base_url: Url,
    csrf: CsrfProvider,
    proactive_interval: Duration,
}

impl SessionManager {
    pub fn builder(base_url: Url) -> SessionManagerBuilder {
        SessionManagerBuilder::new(base_url)
    }

    /// Gateway sharing this session's credential and renewal path.
    pub fn gateway(&self) -> ApiGateway {
        self.gateway.clone()
    }

    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.core.identity.read().clone()
    }

    pub fn access_credential(&self) -> Option<AccessCredential> {
        self.core.store.get()
    }

    /// True while the proactive renewal task is scheduled.
    pub fn has_proactive_renewal(&self) -> bool {
        self.core
            .proactive
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Restore a session from the refresh cookie on cold start.
    ///
    /// Never fails: a missing or expired cookie leaves the session anonymous.
    pub async fn initialize(&self) -> SessionState {
        if let Err(e) = self.core.transition(&SessionMachineInput::RestoreAttempt) {
            debug!(error = %e, "session already initialized");
            return self.state();
        }

        let credential = match self.coordinator.renew(RenewalTrigger::Restore).await {
            Ok(credential) => credential,
            Err(failure) => {
                info!(reason = %failure, "no session to restore");
                self.finish_restore(&SessionMachineInput::RestoreFailed);
                return self.state();
            }
        };

        match self.fetch_identity_with(&credential).await {
            Ok(identity) => {
                info!(
                    user_id = identity.id.as_deref().unwrap_or("unknown"),
                    "session restored"
                );
                *self.core.identity.write() = Some(identity);
                self.finish_restore(&SessionMachineInput::RestoreSucceeded);
                self.start_proactive_renewal();
            }
            Err(e) => {
                warn!(error = %e, "identity lookup failed after restore");
                self.core.store.clear();
                self.finish_restore(&SessionMachineInput::RestoreFailed);
            }
        }

        self.state()
    }

    fn finish_restore(&self, input: &SessionMachineInput) {
        if let Err(e) = self.core.transition(input) {
            warn!(error = %e, "restore finished outside the restoring state");
        }
    }

    /// Log in with email and password.
    ///
    /// The backend answers with the access credential and identity in one
    /// round trip and sets the refresh cookie.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<UserIdentity> {
        let state = self.state();
        if matches!(state, SessionState::Restoring | SessionState::Expiring) {
            return Err(AuthError::InvalidStateTransition(format!(
                "Cannot log in while {}",
                state.as_str()
            )));
        }

        let url = self.base_url.join(LOGIN_PATH)?;
        let request = self.http.post(url).json(&LoginRequest { email, password });
        let response = decorate(request, &Method::POST, None, &self.csrf)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match error_from_response(response).await {
                GatewayError::Api { status, message }
                    if status == StatusCode::UNAUTHORIZED.as_u16() =>
                {
                    AuthError::InvalidCredentials(message)
                }
                other => AuthError::Gateway(other),
            });
        }

        let body: LoginResponse = response.json().await?;
        if body.access_token.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "login returned an empty access token".to_string(),
            ));
        }

        self.core
            .store
            .set(Some(AccessCredential::new(body.access_token)));
        *self.core.identity.write() = Some(body.user.clone());
        self.core.transition(&SessionMachineInput::LoginSucceeded)?;
        self.start_proactive_renewal();

        info!(
            user_id = body.user.id.as_deref().unwrap_or("unknown"),
            "logged in"
        );
        Ok(body.user)
    }

    /// Log out.
    ///
    /// The server is told first, best-effort. Local state is cleared and the
    /// proactive timer cancelled regardless of how that call ends.
    pub async fn logout(&self) {
        let _local = LocalLogout { core: &self.core };

        let Some(credential) = self.core.store.get() else {
            debug!("logout without an access credential, skipping server call");
            return;
        };

        match self.notify_server_logout(&credential).await {
            Ok(()) => info!("logged out"),
            Err(e) => warn!(error = %e, "server logout failed, clearing local session anyway"),
        }
    }

    async fn notify_server_logout(&self, credential: &AccessCredential) -> AuthResult<()> {
        let url = self.base_url.join(LOGOUT_PATH)?;
        let response = decorate(self.http.post(url), &Method::POST, Some(credential), &self.csrf)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        Ok(())
    }

    /// Fetch the current identity through the gateway and cache it.
    ///
    /// Fails with [`AuthError::NotLoggedIn`] without a network call when the
    /// session is anonymous.
    pub async fn current_user(&self) -> AuthResult<UserIdentity> {
        if !self.is_authenticated() {
            return Err(AuthError::NotLoggedIn);
        }
        let identity: UserIdentity = self.gateway.get_json(ME_PATH).await?;
        *self.core.identity.write() = Some(identity.clone());
        Ok(identity)
    }

    /// Renew now through the shared single-flight path.
    pub async fn renew_now(&self) -> AuthResult<AccessCredential> {
        self.coordinator
            .renew(RenewalTrigger::Proactive)
            .await
            .map_err(|failure| AuthError::SessionExpired(failure.reason().to_string()))
    }

    async fn fetch_identity_with(&self, credential: &AccessCredential) -> AuthResult<UserIdentity> {
        let url = self.base_url.join(ME_PATH)?;
        let response = decorate(self.http.get(url), &Method::GET, Some(credential), &self.csrf)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await.into());
        }
        Ok(response.json().await?)
    }

    /// (Re)start the periodic renewal task. Replacing the slot aborts any
    /// previous task.
    fn start_proactive_renewal(&self) {
        let coordinator = self.coordinator.clone();
        let period = self.proactive_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                debug!("proactive renewal due");
                if coordinator.renew(RenewalTrigger::Proactive).await.is_err() {
                    break;
                }
            }
        });

        let previous = self
            .core
            .proactive
            .lock()
            .replace(ProactiveRenewal { handle });
        drop(previous);

        debug!(
            interval_secs = period.as_secs_f64(),
            "proactive renewal scheduled"
        );
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.core.stop_proactive_renewal();
    }
}
