//! Integration tests for the session lifecycle

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use warden_core::{
    AuthBackend, KeyValueStore, MemoryHub, SessionError, SessionResult, SessionState, TokenGrant,
    TokenProvider,
};
use warden_session::{GateDecision, ResumePolicy, SessionConfig, SessionManager};

fn grant(token: &str, expires_in: &str) -> TokenGrant {
    TokenGrant {
        access_token: token.to_string(),
        expires_in: expires_in.to_string(),
    }
}

/// Scripted Auth API: pops one refresh result per call and counts calls
#[derive(Default)]
struct FakeBackend {
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    login_grant: Mutex<Option<SessionResult<TokenGrant>>>,
    refresh_grants: Mutex<VecDeque<SessionResult<TokenGrant>>>,
    refresh_delay: Option<Duration>,
}

impl FakeBackend {
    fn with_refresh(results: Vec<SessionResult<TokenGrant>>) -> Self {
        Self {
            refresh_grants: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    fn with_login(result: SessionResult<TokenGrant>) -> Self {
        Self {
            login_grant: Mutex::new(Some(result)),
            ..Self::default()
        }
    }

    fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn login(&self, _email: &str, _password: &str) -> SessionResult<TokenGrant> {
        self.login_grant
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(SessionError::login_failed("no login scripted")))
    }

    async fn refresh(&self) -> SessionResult<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        self.refresh_grants
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::session_expired("refresh credential gone")))
    }

    async fn logout(&self) -> SessionResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn manager(hub: &MemoryHub, backend: Arc<FakeBackend>, resume: ResumePolicy) -> SessionManager {
    let config = SessionConfig {
        resume,
        ..SessionConfig::default()
    };
    SessionManager::builder()
        .store(Arc::new(hub.tab()))
        .backend(backend)
        .config(config)
        .build()
        .unwrap()
}

fn seed_credentials(hub: &MemoryHub, token: &str, expires_in_secs: i64) {
    let tab = hub.tab();
    tab.set("accessToken", token);
    let expires_at = Utc::now() + chrono::Duration::seconds(expires_in_secs);
    tab.set("expiresAt", &expires_at.timestamp_millis().to_string());
}

/// Let spawned tasks run
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn failed_resume_settles_unauthenticated() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::default());
    let session = manager(&hub, backend.clone(), ResumePolicy::Always);

    assert_eq!(session.state(), SessionState::Initializing);
    assert_eq!(session.gate(), GateDecision::Pending);

    session.initialize().await;

    assert_eq!(
        session.state(),
        SessionState::Ready {
            authenticated: false
        }
    );
    assert_eq!(session.gate(), GateDecision::RedirectToLogin);
    assert_eq!(backend.refresh_count(), 1);
}

#[tokio::test]
async fn successful_resume_installs_the_grant() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::with_refresh(vec![Ok(grant("tok-1", "1m"))]));
    let session = manager(&hub, backend.clone(), ResumePolicy::Always);

    session.initialize().await;

    assert!(session.is_authenticated());
    assert_eq!(session.access_token().as_deref(), Some("tok-1"));
    assert_eq!(hub.tab().get("accessToken").as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn resume_policy_never_adopts_persisted_credentials() {
    let hub = MemoryHub::new();
    seed_credentials(&hub, "tok-persisted", 60);
    let backend = Arc::new(FakeBackend::default());
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);

    session.initialize().await;

    assert!(session.is_authenticated());
    assert_eq!(session.access_token().as_deref(), Some("tok-persisted"));
    assert_eq!(backend.refresh_count(), 0);
}

#[tokio::test]
async fn resume_probe_controls_the_refresh_call() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::default());
    let session = manager(
        &hub,
        backend.clone(),
        ResumePolicy::Probe(Arc::new(|| false)),
    );

    session.initialize().await;

    assert!(session.is_ready());
    assert_eq!(backend.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_persisted_credentials_leave_the_scheduler_quiescent() {
    let hub = MemoryHub::new();
    seed_credentials(&hub, "tok-old", -60);
    let backend = Arc::new(FakeBackend::default());
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);

    session.initialize().await;

    // Token is kept, stale expiry is dropped, and no timer loops on it
    assert!(session.is_authenticated());
    tokio::time::advance(std::time::Duration::from_secs(300)).await;
    settle().await;
    assert_eq!(backend.refresh_count(), 0);
}

#[tokio::test]
async fn login_writes_the_store_and_signals_other_tabs() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::with_login(Ok(grant("tok-1", "1m"))));
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;

    session.login("ada@example.com", "hunter2").await.unwrap();

    assert!(session.is_authenticated());
    let other_tab = hub.tab();
    assert_eq!(other_tab.get("accessToken").as_deref(), Some("tok-1"));
    assert!(other_tab.get("expiresAt").is_some());
    assert!(other_tab.get("auth_event").is_some());
}

#[tokio::test]
async fn rejected_login_surfaces_and_leaves_state_unchanged() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::with_login(Err(SessionError::login_failed(
        "bad credentials",
    ))));
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;

    let result = session.login("ada@example.com", "wrong").await;

    assert!(matches!(result, Err(SessionError::LoginFailed { .. })));
    assert!(!session.is_authenticated());
    assert_eq!(hub.tab().get("accessToken"), None);
}

#[tokio::test(start_paused = true)]
async fn scheduler_fires_ten_seconds_before_expiry() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::with_refresh(vec![Ok(grant("tok-2", "1m"))]));
    *backend.login_grant.lock().unwrap() = Some(Ok(grant("tok-1", "1m")));
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;
    session.login("ada@example.com", "hunter2").await.unwrap();

    // 60s grant: nothing at 49s, refresh in the [50s, 60s) window
    tokio::time::advance(std::time::Duration::from_secs(49)).await;
    settle().await;
    assert_eq!(backend.refresh_count(), 0);

    tokio::time::advance(std::time::Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(backend.refresh_count(), 1);
    assert_eq!(session.access_token().as_deref(), Some("tok-2"));
}

#[tokio::test(start_paused = true)]
async fn short_grant_refreshes_immediately_without_looping() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::with_refresh(vec![Ok(grant("tok-2", "60s"))]));
    *backend.login_grant.lock().unwrap() = Some(Ok(grant("tok-1", "10s")));
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;
    session.login("ada@example.com", "hunter2").await.unwrap();

    // timeLeft <= skew: refresh fires immediately, once
    settle().await;
    assert_eq!(backend.refresh_count(), 1);

    tokio::time::advance(std::time::Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(backend.refresh_count(), 1);
    assert_eq!(session.access_token().as_deref(), Some("tok-2"));
}

#[tokio::test(start_paused = true)]
async fn scheduled_refresh_failure_terminates_the_session() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend::default());
    *backend.login_grant.lock().unwrap() = Some(Ok(grant("tok-1", "1m")));
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;
    session.login("ada@example.com", "hunter2").await.unwrap();

    tokio::time::advance(std::time::Duration::from_secs(51)).await;
    settle().await;

    assert_eq!(backend.refresh_count(), 1);
    assert!(!session.is_authenticated());
    let other_tab = hub.tab();
    assert_eq!(other_tab.get("accessToken"), None);
    assert_eq!(other_tab.get("expiresAt"), None);
    assert!(other_tab.get("logout").is_some());
}

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_collapse_into_one_call() {
    let hub = MemoryHub::new();
    seed_credentials(&hub, "stale", 60);
    let backend = Arc::new(FakeBackend {
        refresh_delay: Some(Duration::from_millis(50)),
        ..FakeBackend::with_refresh(vec![Ok(grant("fresh", "1m"))])
    });
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;

    let (a, b, c) = tokio::join!(
        session.refresh_after_unauthorized(),
        session.refresh_after_unauthorized(),
        session.refresh_after_unauthorized(),
    );

    assert_eq!(backend.refresh_count(), 1);
    assert_eq!(a.unwrap(), "fresh");
    assert_eq!(b.unwrap(), "fresh");
    assert_eq!(c.unwrap(), "fresh");
}

#[tokio::test(start_paused = true)]
async fn resume_and_unauthorized_refresh_share_one_call() {
    let hub = MemoryHub::new();
    let backend = Arc::new(FakeBackend {
        refresh_delay: Some(Duration::from_millis(100)),
        ..FakeBackend::with_refresh(vec![Ok(grant("tok-1", "1m"))])
    });
    let session = manager(&hub, backend.clone(), ResumePolicy::Always);

    // A 401 can arrive while the silent resume is still settling; both
    // paths must collapse into one Auth API call
    let (_, refreshed) = tokio::join!(
        session.initialize(),
        session.refresh_after_unauthorized(),
    );

    assert_eq!(backend.refresh_count(), 1);
    assert_eq!(refreshed.unwrap(), "tok-1");
    assert!(session.is_authenticated());
    assert_eq!(session.access_token().as_deref(), Some("tok-1"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_refresh_failure_fails_every_waiter() {
    let hub = MemoryHub::new();
    seed_credentials(&hub, "stale", 60);
    let backend = Arc::new(FakeBackend {
        refresh_delay: Some(Duration::from_millis(50)),
        ..FakeBackend::default()
    });
    let session = manager(&hub, backend.clone(), ResumePolicy::Never);
    session.initialize().await;

    let (a, b, c) = tokio::join!(
        session.refresh_after_unauthorized(),
        session.refresh_after_unauthorized(),
        session.refresh_after_unauthorized(),
    );

    assert_eq!(backend.refresh_count(), 1);
    assert!(a.is_err());
    assert!(b.is_err());
    assert!(c.is_err());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn logout_in_one_tab_logs_out_the_other() {
    let hub = MemoryHub::new();
    seed_credentials(&hub, "tok-1", 60);

    let backend_a = Arc::new(FakeBackend::default());
    let backend_b = Arc::new(FakeBackend::default());
    let tab_a = manager(&hub, backend_a.clone(), ResumePolicy::Never);
    let tab_b = manager(&hub, backend_b.clone(), ResumePolicy::Never);
    tab_a.initialize().await;
    tab_b.initialize().await;
    assert!(tab_a.is_authenticated());
    assert!(tab_b.is_authenticated());

    let mut b_states = tab_b.subscribe();
    tab_a.logout().await;

    timeout(Duration::from_secs(1), b_states.wait_for(|s| !s.is_authenticated()))
        .await
        .expect("tab B should observe the logout")
        .unwrap();

    // Tab B cleared locally without its own Auth API call
    assert_eq!(backend_a.logout_count(), 1);
    assert_eq!(backend_b.logout_count(), 0);
    assert_eq!(tab_b.access_token(), None);
}

#[tokio::test]
async fn login_in_one_tab_is_adopted_by_the_other() {
    let hub = MemoryHub::new();
    let backend_a = Arc::new(FakeBackend::with_login(Ok(grant("tok-1", "1m"))));
    let backend_b = Arc::new(FakeBackend::default());
    let tab_a = manager(&hub, backend_a, ResumePolicy::Never);
    let tab_b = manager(&hub, backend_b.clone(), ResumePolicy::Never);
    tab_a.initialize().await;
    tab_b.initialize().await;
    assert!(!tab_b.is_authenticated());

    let mut b_states = tab_b.subscribe();
    tab_a.login("ada@example.com", "hunter2").await.unwrap();

    timeout(Duration::from_secs(1), b_states.wait_for(|s| s.is_authenticated()))
        .await
        .expect("tab B should adopt the login")
        .unwrap();

    assert_eq!(tab_b.access_token().as_deref(), Some("tok-1"));
    // Adoption reads the store; tab B makes no Auth API calls
    assert_eq!(backend_b.refresh_count(), 0);
}

mod end_to_end {
    //! The full pipeline: ApiClient -> SessionManager -> AuthClient

    use super::*;
    use serde_json::json;
    use warden_http::{ApiClient, AuthClient};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn many_unauthorized_requests_one_refresh_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "accessToken": "fresh",
                        "expiresIn": "1m"
                    }))
                    // Keep the refresh in flight long enough for every 401
                    // to queue up behind it
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/me"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "user-1",
                "email": "ada@example.com"
            })))
            .mount(&mock_server)
            .await;

        let hub = MemoryHub::new();
        seed_credentials(&hub, "stale", 60);
        let config = SessionConfig {
            resume: ResumePolicy::Never,
            ..SessionConfig::default()
        };
        let session = SessionManager::builder()
            .store(Arc::new(hub.tab()))
            .backend(Arc::new(AuthClient::new(mock_server.uri()).unwrap()))
            .config(config)
            .build()
            .unwrap();
        session.initialize().await;

        let client = ApiClient::builder()
            .base_url(mock_server.uri())
            .session(Arc::new(session.clone()))
            .build()
            .unwrap();

        let (a, b, c) = tokio::join!(client.me(), client.me(), client.me());
        assert_eq!(a.unwrap().id, "user-1");
        assert_eq!(b.unwrap().id, "user-1");
        assert_eq!(c.unwrap().id, "user-1");

        assert_eq!(session.access_token().as_deref(), Some("fresh"));
    }
}
