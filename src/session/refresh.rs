//! Background cart refresh.
//!
//! Periodic reload plus an explicit wake signal (the tab-visibility analog
//! of the browser storefront), both tied to the owning handle's lifetime
//! through a cancellation token so no refresh lands after the consumer is
//! gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::BackendApi;
use crate::session::CartStore;

pub struct RefreshHandle {
    token: CancellationToken,
    wake_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Requests an immediate out-of-band reload. Coalesces: a wake while
    /// one is already queued is dropped.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        // The task exits at its next select point; nothing runs against a
        // store whose handle is gone.
        self.token.cancel();
    }
}

/// Spawns the refresh task for one session's cart store.
pub fn spawn<B>(store: Arc<Mutex<CartStore<B>>>, period: Duration) -> RefreshHandle
where
    B: BackendApi + 'static,
{
    let token = CancellationToken::new();
    let (wake_tx, mut wake_rx) = mpsc::channel(1);
    let task_token = token.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; the initial load is the
        // session's job, not the refresher's.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {}
                Some(()) = wake_rx.recv() => {}
            }
            let mut store = store.lock().await;
            if store.items_loading() {
                debug!("skipping refresh, mutation in flight");
                continue;
            }
            store.force_reload_cart().await;
        }
        debug!("refresh task stopped");
    });
    RefreshHandle {
        token,
        wake_tx,
        task,
    }
}
