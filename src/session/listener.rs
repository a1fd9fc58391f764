//! Session observers.

use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::{Session, SessionState};
use crate::features::StreamFeatures;

/// Receives session lifecycle events, in registration order.
///
/// Callbacks run synchronously after the new state is visible through
/// [`Session::state`]. Transitions reach listeners one at a time and in the
/// order they happened, even when they are made on different threads; the
/// call that made a transition returns only after its listeners ran. A
/// transition made from inside a callback is delivered once that callback
/// returns.
///
/// A listener must not block on a correlated request
/// ([`Session::send_request`]) from inside a callback: the response would be
/// delivered by the thread it is blocking.
pub trait SessionListener: Send + Sync {
    /// State changed from `old` to `new`.
    fn on_state_change(&self, session: &Session, new: SessionState, old: SessionState) {
        let _ = (session, new, old);
    }

    /// The server advertised stream features. Fires once per stream
    /// (re)start during negotiation.
    fn on_features(&self, session: &Session, features: &StreamFeatures) {
        let _ = (session, features);
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    seq: u64,
    from: SessionState,
    to: SessionState,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Transition>,
    next_seq: u64,
    delivered: u64,
    drainer: Option<ThreadId>,
}

/// Orders state-change notifications.
///
/// Transitions are queued under the state lock, so queue order is
/// transition order. One thread at a time drains the queue; every other
/// thread waits until its own transition has been delivered.
#[derive(Default)]
pub(super) struct Notifier {
    queue: Mutex<Queue>,
    delivered: Condvar,
}

impl Notifier {
    /// Queue a transition. Must be called with the state lock held.
    pub(super) fn enqueue(&self, from: SessionState, to: SessionState) -> u64 {
        let mut queue = self.queue.lock();
        queue.next_seq += 1;
        let seq = queue.next_seq;
        queue.pending.push_back(Transition { seq, from, to });
        seq
    }

    /// Return once transition `seq` has been handed to `notify`.
    pub(super) fn deliver(&self, seq: u64, notify: impl Fn(SessionState, SessionState)) {
        let me = thread::current().id();
        {
            let mut queue = self.queue.lock();
            loop {
                if queue.delivered >= seq {
                    return;
                }
                match queue.drainer {
                    None => {
                        queue.drainer = Some(me);
                        break;
                    },
                    // Nested in our own callback; the outer drain delivers it
                    Some(drainer) if drainer == me => return,
                    Some(_) => self.delivered.wait(&mut queue),
                }
            }
        }

        let _draining = Draining { notifier: self, thread: me };
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(transition) => transition,
                    None => {
                        queue.drainer = None;
                        self.delivered.notify_all();
                        return;
                    },
                }
            };
            notify(next.from, next.to);
            self.queue.lock().delivered = next.seq;
            self.delivered.notify_all();
        }
    }
}

/// Gives up the drainer role if a listener panics mid-drain.
struct Draining<'a> {
    notifier: &'a Notifier,
    thread: ThreadId,
}

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        let mut queue = self.notifier.queue.lock();
        if queue.drainer == Some(self.thread) {
            queue.drainer = None;
            self.notifier.delivered.notify_all();
        }
    }
}
