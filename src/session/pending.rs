//! Request/response correlation.
//!
//! Every outstanding `get`/`set` IQ has one entry keyed by its id. The entry
//! is installed before the request reaches the transport, so a response can
//! never arrive ahead of it. Removal from the map is the single point that
//! decides who owns the outcome: whoever removes the entry (the response
//! path, the timeout path or session teardown) is the one that completes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Result, XmppError};
use crate::jid::Jid;
use crate::stanza::Iq;
use crate::sync::Semaphore;

/// Blocking handle shared between a caller and the response path.
#[derive(Default)]
struct Waiter {
    ready: Semaphore,
    outcome: Mutex<Option<Result<Iq>>>,
}

impl Waiter {
    fn complete(&self, outcome: Result<Iq>) {
        *self.outcome.lock() = Some(outcome);
        self.ready.post();
    }

    fn take(&self) -> Result<Iq> {
        self.outcome.lock().take().unwrap_or(Err(XmppError::SessionClosed))
    }
}

struct Entry {
    waiter: Arc<Waiter>,
    to: Option<Jid>,
    submitted: Instant,
}

impl Entry {
    /// A response must come from the entity we asked. Requests without a
    /// recipient went to our own server, which may answer with or without
    /// a `from`.
    fn accepts_from(&self, from: Option<&Jid>) -> bool {
        match (&self.to, from) {
            (None, _) | (Some(_), None) => true,
            (Some(to), Some(from)) => from == to || (to.is_bare() && from.bare() == *to),
        }
    }
}

#[derive(Default)]
struct TableState {
    entries: HashMap<String, Entry>,
    accepting: bool,
}

/// Outstanding requests of one session.
#[derive(Default)]
pub(crate) struct PendingTable {
    state: Mutex<TableState>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allow new entries (the session reached `bound`).
    pub(crate) fn accept(&self) {
        self.state.lock().accepting = true;
    }

    /// Install an entry for `id`.
    pub(crate) fn insert(
        self: &Arc<Self>,
        id: &str,
        to: Option<Jid>,
        timeout: Option<Duration>,
    ) -> Result<PendingRequest> {
        let waiter = Arc::new(Waiter::default());
        {
            let mut state = self.state.lock();
            if !state.accepting {
                return Err(XmppError::SessionClosed);
            }
            if state.entries.contains_key(id) {
                return Err(XmppError::DuplicateRequestId(id.to_string()));
            }
            state.entries.insert(
                id.to_string(),
                Entry {
                    waiter: Arc::clone(&waiter),
                    to,
                    submitted: Instant::now(),
                },
            );
        }

        Ok(PendingRequest {
            id: id.to_string(),
            waiter,
            table: Arc::clone(self),
            timeout,
        })
    }

    /// Hand a response to its waiter. Gives the IQ back when no entry
    /// matches, so the caller can log it.
    pub(crate) fn complete(&self, iq: Iq) -> std::result::Result<(), Iq> {
        let entry = {
            let mut state = self.state.lock();
            match state.entries.get(iq.id()) {
                Some(entry) if entry.accepts_from(iq.header.from.as_ref()) => {},
                Some(entry) => {
                    tracing::warn!(
                        id = iq.id(),
                        expected = ?entry.to.as_ref().map(Jid::to_string),
                        from = ?iq.header.from.as_ref().map(Jid::to_string),
                        "response sender does not match request recipient"
                    );
                    return Err(iq);
                },
                None => return Err(iq),
            }
            state.entries.remove(iq.id())
        };

        if let Some(entry) = entry {
            tracing::debug!(
                id = iq.id(),
                elapsed_ms = entry.submitted.elapsed().as_millis() as u64,
                "response correlated"
            );
            entry.waiter.complete(Ok(iq));
        }
        Ok(())
    }

    /// Drop the entry for `id` without completing it, but only if it still
    /// belongs to `waiter`. Once a request completes its id is free again,
    /// and a later request reusing it must not be withdrawn by the stale
    /// handle. Returns whether the entry was removed.
    fn cancel_own(&self, id: &str, waiter: &Arc<Waiter>) -> bool {
        let mut state = self.state.lock();
        match state.entries.get(id) {
            Some(entry) if Arc::ptr_eq(&entry.waiter, waiter) => {
                state.entries.remove(id);
                true
            },
            _ => false,
        }
    }

    /// Fail every outstanding entry with `SessionClosed` and refuse new ones
    /// until [`PendingTable::accept`] is called again.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<Entry> = {
            let mut state = self.state.lock();
            state.accepting = false;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            entry.waiter.complete(Err(XmppError::SessionClosed));
        }
        count
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

/// An outstanding request. Dropping it without waiting withdraws the entry.
pub struct PendingRequest {
    id: String,
    waiter: Arc<Waiter>,
    table: Arc<PendingTable>,
    timeout: Option<Duration>,
}

impl PendingRequest {
    /// The request id used for correlation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait bound applied by [`PendingRequest::wait`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Block until the response arrives, the timeout expires or the session
    /// closes.
    ///
    /// An `error` IQ is a successful return: inspect [`Iq::kind`] or call
    /// [`Iq::into_result`].
    pub fn wait(self) -> Result<Iq> {
        let Some(timeout) = self.timeout else {
            self.waiter.ready.wait();
            return self.waiter.take();
        };

        if !self.waiter.ready.wait_timeout(timeout) {
            if self.table.cancel_own(&self.id, &self.waiter) {
                tracing::debug!(id = %self.id, ?timeout, "request timed out");
                return Err(XmppError::Timeout(timeout));
            }
            // The response path removed the entry first; its post is imminent
            self.waiter.ready.wait();
        }
        self.waiter.take()
    }

    /// Non-blocking check for a completed outcome.
    pub fn try_take(&self) -> Option<Result<Iq>> {
        self.waiter.ready.try_wait().then(|| self.waiter.take())
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.cancel_own(&self.id, &self.waiter);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
