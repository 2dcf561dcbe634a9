//! Background thread that drains the event queue into the mix graph.
//!
//! The thread sleeps on the queue until events arrive, then dispatches the
//! whole batch under one acquisition of the engine lock. It wakes at least
//! every [`POLL_INTERVAL`] to notice a stop request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Longest time the thread sleeps before re-checking its running flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handle to the dispatcher thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct Dispatcher {
    running: Arc<AtomicBool>,
    dispatched: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start dispatching events queued on `engine`.
    pub fn spawn(engine: Arc<Engine>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let dispatched = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = Arc::clone(&running);
            let dispatched = Arc::clone(&dispatched);
            std::thread::Builder::new()
                .name("cadenza-midi".into())
                .spawn(move || {
                    tracing::debug!("dispatcher started");
                    while running.load(Ordering::Acquire) {
                        if let Some(events) = engine.queue().wait_drain_timeout(POLL_INTERVAL) {
                            let n = engine.dispatch_events(events);
                            dispatched.fetch_add(n as u64, Ordering::Relaxed);
                        }
                    }
                    tracing::debug!("dispatcher stopped");
                })
                .map_err(EngineError::ThreadSpawn)?
        };

        Ok(Self {
            running,
            dispatched,
            handle: Some(handle),
        })
    }

    /// Events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// True until [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the thread and wait for it. Events still queued stay queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("dispatcher thread panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
