//! Session manager facade

use crate::config::{ResumePolicy, SessionConfig};
use crate::gate::GateDecision;
use crate::scheduler::RefreshScheduler;
use crate::sync;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_core::{
    AuthBackend, Clock, CredentialStore, Credentials, KeyValueStore, SessionError, SessionResult,
    SessionState, SystemClock, TokenGrant, TokenProvider,
};

/// The single authority for authentication state
///
/// Cheap to clone; all clones share one session. Built via
/// [`SessionManager::builder`] with an injected store, Auth API backend,
/// and clock. Call [`initialize`](Self::initialize) once after
/// construction to attempt the silent resume; until it settles the
/// published state is [`SessionState::Initializing`] and protected views
/// must render nothing.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) credentials: CredentialStore,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) backend: Arc<dyn AuthBackend>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SessionConfig,
    /// In-memory mirror of the store; reconciled on every cross-tab event
    pub(crate) cache: RwLock<Option<Credentials>>,
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) scheduler: RefreshScheduler,
    /// Single-flight guard around Auth API refresh calls
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped on every credential change; timers and queued refreshers
    /// compare against their snapshot to detect being superseded
    generation: AtomicU64,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a new builder
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to session state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether the initial resume attempt has settled
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Whether the session is ready and authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Access decision for protected views
    pub fn gate(&self) -> GateDecision {
        GateDecision::from(self.state())
    }

    /// Attempt to silently resume a session
    ///
    /// Adopts persisted credentials, then (per [`ResumePolicy`]) makes one
    /// refresh call. Settles into `Ready` regardless of outcome; a failed
    /// resume is "no session", not an error.
    pub async fn initialize(&self) {
        let inner = &self.inner;

        if let Some(mut creds) = inner.credentials.credentials() {
            // A stored expiry already in the past is dropped; the token is
            // kept and may be replaced by the resume below
            if let Some(expires_at) = creds.expires_at {
                if expires_at <= inner.clock.now() {
                    creds.expires_at = None;
                }
            }
            *inner.cache.write().unwrap() = Some(creds);
        }

        let attempt = match &inner.config.resume {
            ResumePolicy::Always => true,
            ResumePolicy::Never => false,
            ResumePolicy::Probe(probe) => probe(),
        };

        if attempt {
            // A 401-triggered refresh can already be in flight: requests
            // may go out before the resume settles. Share the single-flight
            // lock and adopt its outcome instead of refreshing again.
            let generation = inner.generation();
            let _guard = inner.refresh_lock.lock().await;
            if inner.generation() == generation {
                match inner.backend.refresh().await {
                    Ok(grant) => {
                        if let Err(err) = inner.install_grant(grant) {
                            warn!("resume produced an unusable grant: {err}");
                            inner.clear_session(false);
                        }
                    }
                    Err(err) => {
                        // No usable refresh credential; clear locally
                        // without notifying other tabs
                        debug!("silent resume failed: {err}");
                        inner.clear_session(false);
                    }
                }
            }
        }

        let authenticated = inner.cached_token().is_some();
        inner
            .state_tx
            .send_replace(SessionState::Ready { authenticated });
        inner.arm_scheduler();
        info!(authenticated, "session initialized");
    }

    /// Log in with email and password
    ///
    /// On success the grant is installed, the scheduler armed, and other
    /// tabs notified. Failures surface to the caller for display.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<()> {
        let grant = self.inner.backend.login(email, password).await?;
        self.inner.install_grant(grant)?;
        self.inner
            .state_tx
            .send_replace(SessionState::Ready {
                authenticated: true,
            });
        // Tell other tabs the session changed
        self.inner
            .credentials
            .touch(&self.inner.config.keys.auth_event, self.inner.clock.as_ref());
        info!("login succeeded");
        Ok(())
    }

    /// Log out everywhere
    ///
    /// The Auth API call is best-effort; local logout and the cross-tab
    /// broadcast always proceed.
    pub async fn logout(&self) {
        if let Err(err) = self.inner.backend.logout().await {
            warn!("logout API call failed: {err}");
        }
        self.inner.clear_session(true);
        self.inner
            .state_tx
            .send_replace(SessionState::Ready {
                authenticated: false,
            });
        info!("logged out");
    }

    /// Stop background work (refresh timer and cross-tab listener)
    pub fn shutdown(&self) {
        self.inner.scheduler.cancel();
        if let Some(task) = self.inner.sync_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl TokenProvider for SessionManager {
    fn access_token(&self) -> Option<String> {
        self.inner.cached_token()
    }

    async fn refresh_after_unauthorized(&self) -> SessionResult<String> {
        self.inner.refresh_once().await
    }
}

impl Inner {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cached_token(&self) -> Option<String> {
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub(crate) fn cached_expires_at(&self) -> Option<DateTime<Utc>> {
        self.cache.read().unwrap().as_ref().and_then(|c| c.expires_at)
    }

    /// Publish `Ready { authenticated }` unless still initializing
    pub(crate) fn publish_if_ready(&self, authenticated: bool) {
        self.state_tx.send_if_modified(|state| {
            if !state.is_ready() {
                return false;
            }
            let next = SessionState::Ready { authenticated };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Install a grant: derive the expiry once, write token and expiry to
    /// the store together, mirror them in the cache, and re-arm the timer
    pub(crate) fn install_grant(self: &Arc<Self>, grant: TokenGrant) -> SessionResult<()> {
        let lifetime = grant.lifetime()?;
        let expires_at = self.clock.now() + lifetime;
        self.credentials.set(&grant.access_token, expires_at);
        *self.cache.write().unwrap() = Some(Credentials {
            access_token: grant.access_token,
            expires_at: Some(expires_at),
        });
        self.bump_generation();
        self.publish_if_ready(true);
        self.arm_scheduler();
        debug!(%expires_at, "installed access credential");
        Ok(())
    }

    /// Clear credentials locally; optionally notify other tabs
    ///
    /// Remote applications must pass `broadcast: false` so tabs cannot
    /// ping-pong logout notifications.
    pub(crate) fn clear_session(&self, broadcast: bool) {
        self.credentials.clear();
        *self.cache.write().unwrap() = None;
        self.bump_generation();
        self.scheduler.cancel();
        if broadcast {
            self.credentials
                .touch(&self.config.keys.auth_event, self.clock.as_ref());
            self.credentials
                .touch(&self.config.keys.logout, self.clock.as_ref());
        }
        self.publish_if_ready(false);
    }

    /// Adopt credentials written by another tab without writing the store
    pub(crate) fn adopt_remote_credentials(self: &Arc<Self>, creds: Option<Credentials>) {
        let authenticated = creds.is_some();
        *self.cache.write().unwrap() = creds;
        self.bump_generation();
        self.publish_if_ready(authenticated);
        self.arm_scheduler();
    }

    pub(crate) fn arm_scheduler(self: &Arc<Self>) {
        crate::scheduler::arm(self);
    }

    /// Single-flight refresh
    ///
    /// The first caller performs the Auth API call; callers that arrive
    /// while it is in flight wait on the lock and share its outcome via
    /// the generation check. Failure terminates the session and notifies
    /// other tabs.
    pub(crate) async fn refresh_once(self: &Arc<Self>) -> SessionResult<String> {
        let generation = self.generation();
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != generation {
            // Settled by a concurrent caller (or a remote tab) while we
            // waited; adopt its result instead of refreshing again
            return self.cached_token().ok_or_else(|| {
                SessionError::session_expired("session terminated while refreshing")
            });
        }

        match self.backend.refresh().await {
            Ok(grant) => {
                let token = grant.access_token.clone();
                match self.install_grant(grant) {
                    Ok(()) => Ok(token),
                    Err(err) => {
                        warn!("refresh returned an unusable grant: {err}");
                        self.clear_session(true);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                warn!("refresh failed, terminating session: {err}");
                self.clear_session(true);
                Err(err)
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Builder for [`SessionManager`]
///
/// `build` spawns the cross-tab listener, so it must be called within a
/// tokio runtime.
pub struct SessionManagerBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    backend: Option<Arc<dyn AuthBackend>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionManagerBuilder {
    fn new() -> Self {
        Self {
            store: None,
            backend: None,
            clock: Arc::new(SystemClock),
            config: SessionConfig::default(),
        }
    }

    /// Set the origin-scoped persistent store (required)
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the Auth API backend (required)
    pub fn backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Override the clock (defaults to the system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the manager and start its cross-tab listener
    pub fn build(self) -> SessionResult<SessionManager> {
        let store = self
            .store
            .ok_or_else(|| SessionError::config("store is required"))?;
        let backend = self
            .backend
            .ok_or_else(|| SessionError::config("backend is required"))?;

        let credentials = CredentialStore::new(store.clone(), self.config.keys.clone());
        let (state_tx, _) = watch::channel(SessionState::Initializing);

        let inner = Arc::new(Inner {
            credentials,
            store,
            backend,
            clock: self.clock,
            config: self.config,
            cache: RwLock::new(None),
            state_tx,
            scheduler: RefreshScheduler::new(),
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            sync_task: Mutex::new(None),
        });

        let task = sync::spawn(&inner);
        *inner.sync_task.lock().unwrap() = Some(task);

        Ok(SessionManager { inner })
    }
}
