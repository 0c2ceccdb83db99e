use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
struct Pending {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Debounced "registry stayed empty" timer.
///
/// Every [`arm`](Self::arm) supersedes the previous timer; [`cancel`](Self::cancel)
/// drops it. A timer only fires if it is still the current generation when
/// its window elapses.
#[derive(Debug, Clone)]
pub struct IdleShutdown {
    window: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl IdleShutdown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts (or restarts) the timer; `on_fire` runs once the window
    /// elapses without another `arm` or `cancel`.
    pub fn arm<F>(&self, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut pending = self.lock();
            if let Some(old) = pending.token.replace(token.clone()) {
                old.cancel();
            }
            pending.generation += 1;
            pending.generation
        };

        let window = self.window;
        let shared = self.pending.clone();
        debug!(window_ms = window.as_millis() as u64, "idle shutdown armed");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    let current = {
                        let mut pending = shared.lock().unwrap_or_else(PoisonError::into_inner);
                        let current = pending.generation == generation && !token.is_cancelled();
                        if current {
                            pending.token = None;
                        }
                        current
                    };
                    if current {
                        debug!("idle shutdown fired");
                        on_fire();
                    }
                }
            }
        });
    }

    pub fn cancel(&self) {
        let mut pending = self.lock();
        if let Some(token) = pending.token.take() {
            token.cancel();
            pending.generation += 1;
            debug!("idle shutdown cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().token.is_some()
    }
}
