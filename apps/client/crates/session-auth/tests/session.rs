use futures::future::join_all;
use request_gateway::{AccessCredential, ApiRequest, GatewayError};
use reqwest::cookie::Jar;
use serde_json::{json, Value};
use session_auth::{AuthError, SessionManager, SessionManagerBuilder, SessionState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATUS_PATH: &str = "/api/v1/quotes/status/task-1/";

fn origin(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap()
}

fn user() -> Value {
    json!({"id": 7, "email": "csr@example.com", "role": "csr"})
}

#[derive(Clone, Default)]
struct Recorder {
    states: Arc<Mutex<Vec<SessionState>>>,
    redirects: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn attach(&self, builder: SessionManagerBuilder) -> SessionManagerBuilder {
        let states = self.states.clone();
        let redirects = self.redirects.clone();
        builder
            .state_callback(move |payload| states.lock().unwrap().push(payload.state))
            .login_redirect(move |login_path| redirects.lock().unwrap().push(login_path.to_string()))
    }

    fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

async fn mount_login(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/"))
        .and(body_json(json!({"email": "csr@example.com", "password": "hunter2"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refresh_token=r9; Path=/api/v1/auth/; HttpOnly")
                .set_body_json(json!({"access_token": access_token, "user": user()})),
        )
        .mount(server)
        .await;
}

async fn refresh_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/api/v1/auth/refresh/")
        .count()
}

#[tokio::test]
async fn cold_start_with_refresh_cookie_restores_session() {
    let server = MockServer::start().await;
    let jar = Arc::new(Jar::default());
    jar.add_cookie_str(
        "refresh_token=r1; Path=/api/v1/auth/",
        &origin(&server).join("/api/v1/auth/").unwrap(),
    );

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .and(header("cookie", "refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me/"))
        .and(bearer_token("fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user()))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(SessionManager::builder(origin(&server)).cookie_jar(jar))
        .build()
        .unwrap();

    let state = session.initialize().await;

    assert_eq!(state, SessionState::Authenticated);
    let identity = session.identity().unwrap();
    assert_eq!(identity.id.as_deref(), Some("7"));
    assert_eq!(identity.email.as_deref(), Some("csr@example.com"));
    assert_eq!(session.access_credential(), Some(AccessCredential::new("fresh")));
    assert!(session.has_proactive_renewal());
    assert_eq!(
        recorder.states(),
        vec![SessionState::Restoring, SessionState::Authenticated]
    );
}

#[tokio::test]
async fn cold_start_without_cookie_stays_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Refresh token not found"})),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(SessionManager::builder(origin(&server)))
        .build()
        .unwrap();

    let state = session.initialize().await;

    assert_eq!(state, SessionState::Anonymous);
    assert!(session.identity().is_none());
    assert!(session.access_credential().is_none());
    assert!(!session.has_proactive_renewal());
    assert!(recorder.redirects().is_empty());
    assert_eq!(
        recorder.states(),
        vec![SessionState::Restoring, SessionState::Anonymous]
    );
}

#[tokio::test]
async fn login_stores_credential_and_identity() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;

    let session = SessionManager::builder(origin(&server)).build().unwrap();
    let identity = session.login("csr@example.com", "hunter2").await.unwrap();

    assert_eq!(identity.email.as_deref(), Some("csr@example.com"));
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.access_credential(), Some(AccessCredential::new("access-1")));
    assert!(session.has_proactive_renewal());
}

#[tokio::test]
async fn login_rejection_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "User account is disabled"})),
        )
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server)).build().unwrap();
    let err = session.login("csr@example.com", "hunter2").await.unwrap_err();

    match err {
        AuthError::InvalidCredentials(message) => assert_eq!(message, "User account is disabled"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(session.access_credential().is_none());
}

#[tokio::test]
async fn refresh_cookie_from_login_is_sent_on_renewal() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .and(header("cookie", "refresh_token=r9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "access-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server)).build().unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    let renewed = session.renew_now().await.unwrap();

    assert_eq!(renewed, AccessCredential::new("access-2"));
    assert_eq!(session.access_credential(), Some(renewed));
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn logout_clears_local_state_when_server_errors() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server)).build().unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    session.logout().await;

    assert!(session.access_credential().is_none());
    assert!(session.identity().is_none());
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(!session.has_proactive_renewal());
}

#[tokio::test]
async fn logout_clears_local_state_when_server_times_out() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout/"))
        .and(bearer_token("access-1"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server))
        .request_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    session.logout().await;

    assert!(session.access_credential().is_none());
    assert_eq!(session.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn proactive_renewal_rolls_the_credential() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "rolled"})))
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server))
        .proactive_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert!(refresh_count(&server).await >= 2);
    assert_eq!(session.access_credential(), Some(AccessCredential::new("rolled")));
    assert!(session.is_authenticated());
    assert!(session.has_proactive_renewal());
}

#[tokio::test]
async fn proactive_renewal_failure_ends_session_and_stops_timer() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "Invalid or expired refresh token"})),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(
            SessionManager::builder(origin(&server)).proactive_interval(Duration::from_millis(100)),
        )
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;

    assert_eq!(refresh_count(&server).await, 1);
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(session.access_credential().is_none());
    assert!(session.identity().is_none());
    assert!(!session.has_proactive_renewal());
    assert_eq!(recorder.redirects(), vec!["/login".to_string()]);
    assert_eq!(
        recorder.states(),
        vec![
            SessionState::Authenticated,
            SessionState::Expiring,
            SessionState::Anonymous
        ]
    );
}

#[tokio::test]
async fn gateway_401s_share_renewal_with_session() {
    let server = MockServer::start().await;
    mount_login(&server, "old").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({"access_token": "new"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(bearer_token("old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(bearer_token("new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-1", "status": "pending"})),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(SessionManager::builder(origin(&server)))
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();
    let gateway = session.gateway();

    let results = join_all((0..4).map(|_| gateway.get_json::<Value>(STATUS_PATH))).await;

    for result in results {
        assert_eq!(result.unwrap()["status"], "pending");
    }
    assert_eq!(session.coordinator().renewals_started(), 1);
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.access_credential(), Some(AccessCredential::new("new")));
    assert_eq!(
        recorder.states(),
        vec![
            SessionState::Authenticated,
            SessionState::Expiring,
            SessionState::Authenticated
        ]
    );
}

#[tokio::test]
async fn gateway_renewal_failure_routes_to_login() {
    let server = MockServer::start().await;
    mount_login(&server, "old").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Refresh token not found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(SessionManager::builder(origin(&server)).login_path("/staff/login"))
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    let err = session
        .gateway()
        .get_json::<Value>(STATUS_PATH)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::SessionExpired(_)));
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(!session.has_proactive_renewal());
    assert_eq!(recorder.redirects(), vec!["/staff/login".to_string()]);
}

#[tokio::test]
async fn logout_during_gateway_renewal_keeps_credential_cleared() {
    let server = MockServer::start().await;
    mount_login(&server, "old").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({"access_token": "new"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(bearer_token("old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(bearer_token("new"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-1", "status": "pending"})),
        )
        .expect(0)
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let session = recorder
        .attach(SessionManager::builder(origin(&server)))
        .build()
        .unwrap();
    session.login("csr@example.com", "hunter2").await.unwrap();

    let gateway = session.gateway();
    let pending = tokio::spawn(async move { gateway.get_json::<Value>(STATUS_PATH).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.coordinator().is_renewing());
    session.logout().await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, GatewayError::SessionExpired(_)));

    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(session.access_credential().is_none());
    assert!(recorder.redirects().is_empty());

    let anonymous = session.gateway().send(ApiRequest::get(STATUS_PATH)).await;
    assert!(anonymous.is_ok());
    let last = server.received_requests().await.unwrap().pop().unwrap();
    assert!(last.headers.get("authorization").is_none());
}

#[tokio::test]
async fn current_user_requires_a_session() {
    let server = MockServer::start().await;
    mount_login(&server, "access-1").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me/"))
        .and(bearer_token("access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user()))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::builder(origin(&server)).build().unwrap();

    let err = session.current_user().await.unwrap_err();
    assert!(matches!(err, AuthError::NotLoggedIn));
    assert_eq!(refresh_count(&server).await, 0);

    session.login("csr@example.com", "hunter2").await.unwrap();
    let identity = session.current_user().await.unwrap();
    assert_eq!(identity.email.as_deref(), Some("csr@example.com"));
}
