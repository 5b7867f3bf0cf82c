//! Per-user cart sessions.
//!
//! One [`CartStore`] per authenticated user, constructed on first use with
//! that session's bearer token and dropped on logout. Each session owns a
//! background refresh task whose cancellation token dies with the entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::HttpBackend;
use crate::session::refresh::{self, RefreshHandle};
use crate::session::CartStore;

pub struct SessionRegistry {
    backend: HttpBackend,
    refresh_period: Duration,
    sessions: Mutex<HashMap<i64, SessionEntry>>,
}

struct SessionEntry {
    store: Arc<Mutex<CartStore<HttpBackend>>>,
    refresh: RefreshHandle,
}

impl SessionRegistry {
    pub fn new(backend: HttpBackend, refresh_period: Duration) -> Self {
        Self {
            backend,
            refresh_period,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The cart store for a user, created on first use.
    pub async fn store_for(&self, user_id: i64, token: &str) -> Arc<Mutex<CartStore<HttpBackend>>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get(&user_id) {
            return Arc::clone(&entry.store);
        }
        debug!(user_id, "starting cart session");
        let mut store = CartStore::new(self.backend.with_token(token));
        store.set_user(Some(user_id));
        let store = Arc::new(Mutex::new(store));
        let refresh = refresh::spawn(Arc::clone(&store), self.refresh_period);
        sessions.insert(
            user_id,
            SessionEntry {
                store: Arc::clone(&store),
                refresh,
            },
        );
        store
    }

    /// Nudges the session's refresh task (the tab-visibility analog).
    pub async fn wake(&self, user_id: i64) {
        if let Some(entry) = self.sessions.lock().await.get(&user_id) {
            entry.refresh.wake();
        }
    }

    /// Ends a user's session on logout. Dropping the entry cancels its
    /// refresh task.
    pub async fn end_session(&self, user_id: i64) {
        if self.sessions.lock().await.remove(&user_id).is_some() {
            debug!(user_id, "cart session ended");
        }
    }
}
