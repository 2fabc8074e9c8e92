use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cooperative stop request shared between the control loop and whoever may
/// end it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown::default()
    }

    pub fn trigger(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration`, waking early on shutdown. Returns true when
    /// shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Request shutdown on SIGINT, SIGTERM or SIGHUP. Can only be installed
    /// once per process.
    pub fn trigger_on_signal(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Stop requested by signal");
            shutdown.trigger();
        })
    }

    /// Request shutdown once `duration` has elapsed.
    pub fn trigger_after(&self, duration: Duration) -> JoinHandle<()> {
        let shutdown = self.clone();
        thread::spawn(move || {
            if !shutdown.sleep(duration) {
                tracing::info!("Run time of {:?} elapsed, stopping", duration);
                shutdown.trigger();
            }
        })
    }
}
