//! Session store
//!
//! Holds the authentication state of the client: the bearer token, the
//! current user and the loading/error flags a UI renders from. The store is
//! an explicitly owned handle; clones share the same state.
//!
//! Phases:
//!
//! ```text
//!   Anonymous ──authenticate──▶ Authenticating ──ok──▶ Authenticated
//!       ▲                            │
//!       │                            └──err──▶ AuthFailed
//!       └──────────── end_session (from any phase)
//! ```
//!
//! A store created while a persisted token exists starts in `Authenticating`
//! and waits for the owner to call [`SessionStore::load_current_user`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use conciliar_common::{Credentials, Role, TokenStore, User, UserUpdate};

use crate::api::{ApiError, ApiResult, AuthApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    AuthFailed,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub token: Option<String>,
    pub current_user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub phase: SessionPhase,
    /// Bumped whenever the session is torn down; results from an older epoch are dropped.
    epoch: u64,
}

impl SessionState {
    fn fail(&mut self, error: &ApiError) {
        self.token = None;
        self.current_user = None;
        self.is_authenticated = false;
        self.is_loading = false;
        self.last_error = Some(error.to_string());
        self.phase = SessionPhase::AuthFailed;
    }
}

/// Outcome of a role check against the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    LoginRequired,
    Forbidden,
}

pub struct SessionStore<A> {
    inner: Arc<SessionInner<A>>,
}

struct SessionInner<A> {
    api: A,
    tokens: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    disposed: AtomicBool,
}

impl<A> Clone for SessionStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AuthApi> SessionStore<A> {
    /// Creates the store, picking up a persisted token if there is one.
    pub fn new(api: A, tokens: Arc<dyn TokenStore>) -> Self {
        let persisted = match tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not read persisted token: {}", e);
                None
            }
        };

        let mut state = SessionState::default();
        if let Some(token) = persisted {
            debug!("Found persisted token, waiting for profile load");
            state.token = Some(token);
            state.phase = SessionPhase::Authenticating;
        }

        Self {
            inner: Arc::new(SessionInner {
                api,
                tokens,
                state: Mutex::new(state),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> ApiResult<User> {
        let epoch = {
            let mut state = self.inner.state.lock();
            if state.is_loading {
                debug!("Ignoring login for {}: request already pending", credentials.email);
                return Err(ApiError::Busy);
            }
            state.is_loading = true;
            state.last_error = None;
            state.phase = SessionPhase::Authenticating;
            state.epoch
        };

        let result = self.inner.api.login(credentials).await;

        let mut state = self.inner.state.lock();
        if self.is_stale(&state, epoch) {
            return Err(ApiError::Cancelled);
        }

        match result {
            Ok(response) => {
                state.token = Some(response.token.clone());
                state.current_user = Some(response.user.clone());
                state.is_authenticated = true;
                state.is_loading = false;
                state.last_error = None;
                state.phase = SessionPhase::Authenticated;
                drop(state);

                if let Err(e) = self.inner.tokens.save(&response.token) {
                    warn!("Could not persist token: {}", e);
                }
                info!("Logged in as {}", response.user.email);
                Ok(response.user)
            }
            Err(e) => {
                state.fail(&e);
                drop(state);

                self.forget_token();
                warn!("Login failed for {}: {}", credentials.email, e);
                Err(e)
            }
        }
    }

    /// Fetches the profile for the held token.
    ///
    /// Fails with [`ApiError::NoToken`] without touching the state or the
    /// network when no token is held.
    pub async fn load_current_user(&self) -> ApiResult<User> {
        let (token, epoch) = {
            let mut state = self.inner.state.lock();
            let token = state.token.clone().ok_or(ApiError::NoToken)?;
            if state.is_loading {
                return Err(ApiError::Busy);
            }
            state.is_loading = true;
            state.phase = SessionPhase::Authenticating;
            (token, state.epoch)
        };

        let result = self.inner.api.current_user(&token).await;

        let mut state = self.inner.state.lock();
        if self.is_stale(&state, epoch) {
            return Err(ApiError::Cancelled);
        }

        match result {
            Ok(user) => {
                state.current_user = Some(user.clone());
                state.is_authenticated = true;
                state.is_loading = false;
                state.last_error = None;
                state.phase = SessionPhase::Authenticated;
                info!("Session restored for {}", user.email);
                Ok(user)
            }
            Err(e) => {
                state.fail(&e);
                drop(state);

                self.forget_token();
                warn!("Could not restore session: {}", e);
                Err(e)
            }
        }
    }

    /// Tears the session down. Never fails.
    pub async fn end_session(&self) {
        {
            let mut state = self.inner.state.lock();
            let epoch = state.epoch + 1;
            *state = SessionState {
                epoch,
                ..SessionState::default()
            };
        }

        self.forget_token();

        if let Err(e) = self.inner.api.logout().await {
            debug!("Logout hook failed: {}", e);
        }
        info!("Session ended");
    }

    pub fn clear_error(&self) {
        self.inner.state.lock().last_error = None;
    }

    /// Merges locally known profile changes into the current user.
    pub fn update_profile(&self, update: &UserUpdate) {
        if let Some(user) = self.inner.state.lock().current_user.as_mut() {
            user.apply(update);
        }
    }

    /// Role check for guarded views. An empty `allowed` list admits any
    /// authenticated user.
    pub fn authorize(&self, allowed: &[Role]) -> Access {
        let state = self.inner.state.lock();
        if !state.is_authenticated {
            return Access::LoginRequired;
        }
        match &state.current_user {
            Some(user) if allowed.is_empty() || allowed.contains(&user.role) => Access::Granted,
            Some(_) => Access::Forbidden,
            None => Access::LoginRequired,
        }
    }

    /// Makes results that arrive from now on into no-ops.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.lock().token.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.lock().current_user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().is_authenticated
    }

    fn is_stale(&self, state: &SessionState, epoch: u64) -> bool {
        self.inner.disposed.load(Ordering::SeqCst) || state.epoch != epoch
    }

    fn forget_token(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            warn!("Could not remove persisted token: {}", e);
        }
    }
}
