//! Periodic server pings while the session is bound.
//!
//! [`KeepAlive`] is a module for registration purposes only; the work is done
//! by an internal [`SessionListener`] it installs on the session. Entering
//! `bound` starts a pinger thread, leaving it stops the thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::Ping;
use crate::error::XmppError;
use crate::module::Module;
use crate::session::{Session, SessionListener, SessionState, WeakSession};
use crate::stanza::Stanza;
use crate::sync::Semaphore;

#[derive(Debug, Default)]
struct Stats {
    sent: AtomicU64,
    answered: AtomicU64,
    failed: AtomicU64,
}

struct Pinger {
    interval: Duration,
    timeout: Duration,
    stats: Arc<Stats>,
    /// Stop signal of the running loop.
    running: Mutex<Option<Arc<Semaphore>>>,
}

impl Pinger {
    fn start(&self, session: &Session) {
        let stop = Arc::new(Semaphore::new(0));
        if let Some(previous) = self.running.lock().replace(Arc::clone(&stop)) {
            previous.post();
        }

        let weak = session.downgrade();
        let stats = Arc::clone(&self.stats);
        let (interval, timeout) = (self.interval, self.timeout);
        let spawned = thread::Builder::new()
            .name("keepalive".to_string())
            .spawn(move || run(&weak, &stop, &stats, interval, timeout));
        match spawned {
            Ok(_) => tracing::debug!(session = session.id(), ?interval, "keepalive started"),
            Err(e) => tracing::warn!(session = session.id(), error = %e, "keepalive thread failed to start"),
        }
    }

    fn stop(&self) {
        if let Some(stop) = self.running.lock().take() {
            stop.post();
        }
    }
}

fn run(weak: &WeakSession, stop: &Semaphore, stats: &Stats, interval: Duration, timeout: Duration) {
    while !stop.wait_timeout(interval) {
        let Some(session) = weak.upgrade() else {
            break;
        };
        if session.state() != SessionState::Bound {
            break;
        }

        stats.sent.fetch_add(1, Ordering::Relaxed);
        match Ping::ping(&session, None, Some(timeout)) {
            Ok(rtt) => {
                stats.answered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(session = session.id(), ?rtt, "keepalive answered");
            },
            Err(XmppError::SessionClosed) => break,
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session = session.id(), error = %e, "keepalive ping failed");
            },
        }
    }
    tracing::debug!("keepalive stopped");
}

impl SessionListener for Pinger {
    fn on_state_change(&self, session: &Session, new: SessionState, _old: SessionState) {
        if new == SessionState::Bound {
            self.start(session);
        } else {
            self.stop();
        }
    }
}

/// Pings the server every `interval` while bound.
pub struct KeepAlive {
    pinger: Arc<Pinger>,
}

impl KeepAlive {
    /// Ping every `interval`; each ping waits at most `interval` for a pong.
    pub fn new(interval: Duration) -> Self {
        Self::with_timeout(interval, interval)
    }

    /// Ping every `interval`, waiting at most `timeout` for each pong.
    pub fn with_timeout(interval: Duration, timeout: Duration) -> Self {
        Self {
            pinger: Arc::new(Pinger {
                interval,
                timeout,
                stats: Arc::default(),
                running: Mutex::new(None),
            }),
        }
    }

    /// Pings sent so far.
    pub fn pings_sent(&self) -> u64 {
        self.pinger.stats.sent.load(Ordering::Relaxed)
    }

    /// Pings that got an answer.
    pub fn pongs(&self) -> u64 {
        self.pinger.stats.answered.load(Ordering::Relaxed)
    }

    /// Pings that timed out or failed.
    pub fn failures(&self) -> u64 {
        self.pinger.stats.failed.load(Ordering::Relaxed)
    }

    /// Whether a pinger thread has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.pinger.running.lock().is_some()
    }
}

impl std::fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("interval", &self.pinger.interval)
            .field("timeout", &self.pinger.timeout)
            .field("stats", &self.pinger.stats)
            .finish()
    }
}

impl Module for KeepAlive {
    fn name(&self) -> &str {
        "keepalive"
    }

    fn registered(&self, session: &Session) {
        session.add_listener(self.pinger.clone());
        if session.state() == SessionState::Bound {
            self.pinger.start(session);
        }
    }

    fn unregistered(&self, session: &Session) {
        session.remove_listener(&self.pinger);
        self.pinger.stop();
    }

    fn consume(&self, _session: &Session, _stanza: &Stanza) -> bool {
        false
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.pinger.stop();
    }
}
