//! Paginated user directory
//!
//! Accumulates pages of user records from the server, keyed by the current
//! role filter and the settled search term. Any change of those criteria
//! throws the accumulated pages away and starts again from page 1; a fetch
//! started under old criteria is discarded when it lands.

mod debounce;

pub use debounce::Debouncer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use conciliar_common::{RoleFilter, User, UserQuery};

use crate::api::{ApiError, ApiResult, DirectoryApi};
use crate::config::DirectorySettings;

#[derive(Debug, Clone)]
pub struct DirectoryState {
    pub items: Vec<User>,
    pub filter_role: RoleFilter,
    /// Raw search input, echoed back immediately.
    pub search_input: String,
    /// Search term the current items were queried with.
    pub search_term: String,
    /// Highest page fetched so far (1-based).
    pub page: u32,
    pub has_more: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    fetched: bool,
    generation: u64,
}

impl Default for DirectoryState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            filter_role: RoleFilter::All,
            search_input: String::new(),
            search_term: String::new(),
            page: 1,
            has_more: true,
            is_loading: false,
            last_error: None,
            fetched: false,
            generation: 0,
        }
    }
}

impl DirectoryState {
    fn reset(&mut self) {
        self.generation += 1;
        self.items.clear();
        self.page = 1;
        self.fetched = false;
        self.has_more = true;
        self.is_loading = false;
        self.last_error = None;
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|u| u.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { page: u32, count: usize, has_more: bool },
    /// A load was already running or the server has no more pages.
    Skipped,
}

pub struct DirectoryLoader<A> {
    inner: Arc<LoaderInner<A>>,
}

struct LoaderInner<A> {
    api: A,
    page_size: u32,
    state: Mutex<DirectoryState>,
    search_debounce: Debouncer,
    disposed: AtomicBool,
}

impl<A> Clone for DirectoryLoader<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: DirectoryApi + 'static> DirectoryLoader<A> {
    pub fn new(api: A, settings: &DirectorySettings) -> Self {
        Self::with_options(api, settings.page_size, settings.search_debounce())
    }

    pub fn with_options(api: A, page_size: u32, search_debounce: Duration) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                api,
                page_size: page_size.max(1),
                state: Mutex::new(DirectoryState::default()),
                search_debounce: Debouncer::new(search_debounce),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the role filter without fetching anything.
    pub fn with_filter(self, role: RoleFilter) -> Self {
        {
            let mut state = self.inner.state.lock();
            if state.filter_role != role {
                state.filter_role = role;
                state.reset();
            }
        }
        self
    }

    /// Fetches the next page under the current criteria.
    ///
    /// `is_loading` doubles as the re-entrancy guard: a call made while
    /// another is outstanding returns [`LoadOutcome::Skipped`] without a
    /// request. After a failure `has_more` stays false until the next reset.
    pub async fn load_next_page(&self) -> ApiResult<LoadOutcome> {
        if self.is_disposed() {
            return Err(ApiError::Cancelled);
        }

        let (query, generation) = {
            let mut state = self.inner.state.lock();
            if state.is_loading || !state.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            let page = if state.fetched { state.page + 1 } else { 1 };
            state.is_loading = true;
            let query = UserQuery {
                page,
                limit: self.inner.page_size,
                role: state.filter_role,
                search: state.search_term.clone(),
            };
            (query, state.generation)
        };

        debug!("Loading directory page {} ({})", query.page, query.role.as_query_value());
        let result = self.inner.api.list_users(&query).await;

        let mut state = self.inner.state.lock();
        if self.is_disposed() || state.generation != generation {
            debug!("Dropping stale directory page {}", query.page);
            return Err(ApiError::Cancelled);
        }
        state.is_loading = false;

        match result {
            Ok(page) => {
                let count = page.users.len();
                state.items.extend(page.users);
                state.page = query.page;
                state.fetched = true;
                state.has_more = page.has_more;
                state.last_error = None;
                Ok(LoadOutcome::Loaded {
                    page: query.page,
                    count,
                    has_more: page.has_more,
                })
            }
            Err(e) => {
                warn!("Directory page {} failed: {}", query.page, e);
                state.last_error = Some(e.to_string());
                state.has_more = false;
                Err(e)
            }
        }
    }

    pub async fn set_filter(&self, role: RoleFilter) -> ApiResult<LoadOutcome> {
        if self.is_disposed() {
            return Err(ApiError::Cancelled);
        }
        {
            let mut state = self.inner.state.lock();
            if state.filter_role == role && state.fetched {
                return Ok(LoadOutcome::Skipped);
            }
            state.filter_role = role;
            state.reset();
        }
        self.load_next_page().await
    }

    /// Records the raw input and schedules the settled-term update.
    ///
    /// Calls arriving within the debounce window replace each other; only
    /// the last value is ever queried. Must be called from within a tokio
    /// runtime, since the timer runs as a spawned task.
    pub fn set_search_term(&self, raw: impl Into<String>) {
        let raw = raw.into();
        self.inner.state.lock().search_input = raw.clone();

        if self.is_disposed() {
            return;
        }

        let weak: Weak<LoaderInner<A>> = Arc::downgrade(&self.inner);
        self.inner.search_debounce.schedule(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let loader = DirectoryLoader { inner };
            if let Err(e) = loader.apply_search_term(raw).await {
                debug!("Debounced search did not complete: {}", e);
            }
        });
    }

    /// Applies a search term immediately, bypassing the debounce timer.
    pub async fn apply_search_term(&self, term: impl Into<String>) -> ApiResult<LoadOutcome> {
        if self.is_disposed() {
            return Err(ApiError::Cancelled);
        }
        let term = term.into().trim().to_string();
        {
            let mut state = self.inner.state.lock();
            if state.search_term == term && state.fetched {
                return Ok(LoadOutcome::Skipped);
            }
            state.search_term = term;
            state.reset();
        }
        self.load_next_page().await
    }

    /// Starts over from page 1 with the current criteria.
    pub async fn refresh(&self) -> ApiResult<LoadOutcome> {
        if self.is_disposed() {
            return Err(ApiError::Cancelled);
        }
        self.inner.state.lock().reset();
        self.load_next_page().await
    }

    /// Sets `is_active` on one record after the server confirmed the change.
    pub fn mark_active(&self, id: &str, is_active: bool) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(id) {
            Some(index) => {
                state.items[index].is_active = is_active;
                true
            }
            None => false,
        }
    }

    /// Drops one record after the server confirmed the deletion.
    pub fn remove_by_id(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(id) {
            Some(index) => {
                state.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Swaps in the server's copy of an edited record, keeping its position.
    pub fn replace_user(&self, user: User) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(&user.id) {
            Some(index) => {
                state.items[index] = user;
                true
            }
            None => false,
        }
    }

    /// Clears the error banner; loaded items stay.
    pub fn dismiss_error(&self) {
        self.inner.state.lock().last_error = None;
    }

    /// Cancels the pending search timer and ignores any result still in flight.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.search_debounce.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> DirectoryState {
        self.inner.state.lock().clone()
    }

    pub fn items(&self) -> Vec<User> {
        self.inner.state.lock().items.clone()
    }

    pub fn search_pending(&self) -> bool {
        self.inner.search_debounce.is_pending()
    }
}
