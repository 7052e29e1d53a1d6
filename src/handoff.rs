//! The two-party rendezvous state machine (§3, §4.1 of the design doc).
//!
//! A [`Handoff`] mediates exactly one potential exchange of a value `V`
//! between one sender and one receiver. It is the object a [`crate::channel::Channel`]
//! parks in its waiter queues and the object [`crate::select`] arms and
//! races between candidate cases.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::CachePadded;

use crate::spawn::Spawn;

/// Callback fired exactly once, the first time a [`Handoff`] becomes
/// [`Phase::Ready`]. Never invoked inline under the handoff's mutex —
/// always dispatched through the handoff's [`Spawn`] so that the cheap
/// commit/cancel paths never need to reason about reentrancy.
pub(crate) type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

enum Phase<V> {
    Empty,
    ReaderPresent,
    ValuePresent(V),
    Ready(V),
    Done(Done<V>),
}

enum Done<V> {
    Completed(V),
    /// `Some(v)` iff a value had already been deposited (phase was
    /// `ValuePresent`/`Ready`) at the moment of cancellation; `None` if
    /// cancelled while still `Empty`/`ReaderPresent`.
    Cancelled(Option<V>),
}

struct State<V> {
    phase: Phase<V>,
    ready_cb: Option<ReadyCallback>,
}

/// Outcome observed by the party that called [`Handoff::arrive_as_sender`].
pub(crate) enum SendOutcome<V> {
    /// The value was delivered to a receiver.
    Completed,
    /// The value was not delivered; here it is back, for the caller to
    /// retry elsewhere or drop.
    Cancelled(V),
}

/// Outcome observed by the party that called [`Handoff::arrive_as_receiver`].
pub(crate) enum RecvOutcome<V> {
    Completed(V),
    Cancelled,
}

/// Outcome of a non-blocking sender arrival attempt.
pub(crate) enum SendArrival<V> {
    /// The arrival landed; the caller may now block on
    /// [`Handoff::finish_as_sender`].
    Accepted,
    /// The handoff had already reached `Done` before this arrival could
    /// land — it was cancelled while still parked in a channel queue
    /// (e.g. a losing `select` case) and nobody ever dequeued it. The
    /// value is handed back unused so the caller can retry against a
    /// different handoff instead of panicking (§4.2).
    Dead(V),
}

/// Outcome of a non-blocking receiver arrival attempt; see [`SendArrival`].
pub(crate) enum RecvArrival {
    Accepted,
    Dead,
}

pub(crate) struct Handoff<V> {
    state: Mutex<State<V>>,
    cv: Condvar,
    /// Lock-free mirror of "phase is Ready or Done", so [`Handoff::is_ready`]
    /// (called repeatedly by select while scanning many armed handoffs) need
    /// not take the mutex. Cache-padded: many handoffs are scanned
    /// concurrently by different select calls and must not false-share.
    ready_flag: CachePadded<AtomicBool>,
    /// Lock-free mirror of "phase is Done", checked by [`Channel`](crate::channel::Channel)
    /// when it dequeues a parked handoff so a handoff cancelled while
    /// still sitting in a waiter queue is skipped rather than re-armed.
    done_flag: CachePadded<AtomicBool>,
    spawner: Arc<dyn Spawn>,
}

impl<V: Send + 'static> Handoff<V> {
    /// Creates a fresh handoff with the default committer installed: as
    /// soon as the phase becomes `Ready`, it proceeds on its own (§4.1
    /// "Default committer"). Plain `Channel::send`/`recv` rely on this;
    /// `select` overrides it via [`Handoff::on_ready`] before arming.
    pub(crate) fn new(spawner: Arc<dyn Spawn>) -> Arc<Self> {
        let this = Arc::new(Self {
            state: Mutex::new(State {
                phase: Phase::Empty,
                ready_cb: None,
            }),
            cv: Condvar::new(),
            ready_flag: CachePadded::new(AtomicBool::new(false)),
            done_flag: CachePadded::new(AtomicBool::new(false)),
            spawner,
        });

        // Weak avoids a self-cycle: the default committer must not keep
        // the handoff alive forever if it never fires (e.g. the handoff
        // is cancelled while still Empty).
        let weak: Weak<Self> = Arc::downgrade(&this);
        this.state.lock().unwrap().ready_cb = Some(Box::new(move || {
            if let Some(h) = weak.upgrade() {
                h.proceed();
            }
        }));
        this
    }

    /// Installs `cb` as the one-shot ready callback, replacing whatever
    /// was there (the default committer, on a freshly-created handoff).
    /// If the handoff is already `Ready` (or `Done`), `cb` is dispatched
    /// immediately via the spawner rather than invoked here.
    pub(crate) fn on_ready(&self, cb: ReadyCallback) {
        let mut state = self.state.lock().unwrap();
        match state.phase {
            Phase::Ready(_) | Phase::Done(_) => {
                drop(state);
                self.spawner.spawn(cb);
            }
            _ => state.ready_cb = Some(cb),
        }
    }

    /// True iff the phase is `Ready` or `Done`. Never blocks.
    pub(crate) fn is_ready(&self) -> bool {
        self.ready_flag.load(Ordering::Acquire)
    }

    /// True iff the phase is `Done`. Never blocks. Used by [`Channel`](crate::channel::Channel)
    /// to skip a handoff it dequeues that was cancelled while still
    /// parked, rather than arriving on a dead handoff.
    pub(crate) fn is_done(&self) -> bool {
        self.done_flag.load(Ordering::Acquire)
    }

    /// Non-blocking sender arrival: `Empty -> ValuePresent(v)` or
    /// `ReaderPresent -> Ready(v)`. Panics if this handoff already has a
    /// sender (one-shot contract, §4.1). If the handoff is already
    /// `Done` — cancelled while still parked in a channel queue, e.g. a
    /// losing `select` case nobody dequeued — returns `Dead(v)` instead
    /// of panicking, so the caller can retry against a different
    /// handoff (§4.2).
    pub(crate) fn arrive_as_sender(&self, v: V) -> SendArrival<V> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut state.phase, Phase::Empty) {
            Phase::Empty => {
                state.phase = Phase::ValuePresent(v);
                self.finish_arrival(state, false);
                SendArrival::Accepted
            }
            Phase::ReaderPresent => {
                state.phase = Phase::Ready(v);
                self.finish_arrival(state, true);
                SendArrival::Accepted
            }
            Phase::Done(done) => {
                state.phase = Phase::Done(done);
                drop(state);
                SendArrival::Dead(v)
            }
            other @ (Phase::ValuePresent(_) | Phase::Ready(_)) => {
                state.phase = other;
                drop(state);
                panic!("Handoff::arrive_as_sender called on a handoff that already has a sender");
            }
        }
    }

    /// Non-blocking receiver arrival: `Empty -> ReaderPresent` or
    /// `ValuePresent(v) -> Ready(v)`. Panics if this handoff already has
    /// a receiver. Returns `Dead` on an already-`Done` handoff; see
    /// [`Handoff::arrive_as_sender`].
    pub(crate) fn arrive_as_receiver(&self) -> RecvArrival {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut state.phase, Phase::Empty) {
            Phase::Empty => {
                state.phase = Phase::ReaderPresent;
                self.finish_arrival(state, false);
                RecvArrival::Accepted
            }
            Phase::ValuePresent(v) => {
                state.phase = Phase::Ready(v);
                self.finish_arrival(state, true);
                RecvArrival::Accepted
            }
            Phase::Done(done) => {
                state.phase = Phase::Done(done);
                drop(state);
                RecvArrival::Dead
            }
            other @ (Phase::ReaderPresent | Phase::Ready(_)) => {
                state.phase = other;
                drop(state);
                panic!(
                    "Handoff::arrive_as_receiver called on a handoff that already has a receiver"
                );
            }
        }
    }

    /// Shared tail of both arrival methods: mark the fast-path ready
    /// flag and, if this arrival caused `Ready`, dispatch the ready
    /// callback on a worker (never inline, per §4.1).
    fn finish_arrival(&self, mut state: std::sync::MutexGuard<'_, State<V>>, became_ready: bool) {
        if !became_ready {
            return;
        }
        self.ready_flag.store(true, Ordering::Release);
        let cb = state.ready_cb.take();
        drop(state);
        if let Some(cb) = cb {
            self.spawner.spawn(cb);
        }
    }

    /// Attempts to commit: if `Ready(v)`, transitions to
    /// `Done(Completed(v))`; otherwise forces `Done(Cancelled(..))`.
    /// Idempotent: a handoff already `Done` is untouched. Wakes both
    /// parked parties.
    pub(crate) fn proceed(&self) {
        self.settle(true);
    }

    /// Forces `Done(Cancelled(..))` unless already `Done`. Idempotent.
    /// Wakes both parked parties.
    pub(crate) fn cancel(&self) {
        self.settle(false);
    }

    fn settle(&self, commit: bool) {
        let mut state = self.state.lock().unwrap();
        let phase = std::mem::replace(&mut state.phase, Phase::Empty);
        state.phase = match phase {
            Phase::Done(done) => Phase::Done(done),
            Phase::Ready(v) if commit => Phase::Done(Done::Completed(v)),
            Phase::Ready(v) => Phase::Done(Done::Cancelled(Some(v))),
            Phase::ValuePresent(v) => Phase::Done(Done::Cancelled(Some(v))),
            Phase::Empty | Phase::ReaderPresent => Phase::Done(Done::Cancelled(None)),
        };
        self.ready_flag.store(true, Ordering::Release);
        self.done_flag.store(true, Ordering::Release);
        let cb = state.ready_cb.take();
        drop(state);
        self.cv.notify_all();
        if let Some(cb) = cb {
            self.spawner.spawn(cb);
        }
    }

    /// Blocks until `Done`, then resolves this handoff from the
    /// sender's side. On `Completed`, the delivered value is left in
    /// place for [`Handoff::finish_as_receiver`] to take; on
    /// `Cancelled`, the caller's original value (if any was deposited)
    /// is returned here.
    pub(crate) fn finish_as_sender(&self) -> SendOutcome<V> {
        let mut state = self.state.lock().unwrap();
        loop {
            match &mut state.phase {
                Phase::Done(Done::Completed(_)) => return SendOutcome::Completed,
                Phase::Done(Done::Cancelled(v)) => {
                    let v = v.take();
                    return match v {
                        Some(v) => SendOutcome::Cancelled(v),
                        None => unreachable!(
                            "a handoff cancelled after a sender arrived always carries the sender's value back"
                        ),
                    };
                }
                _ => state = self.cv.wait(state).unwrap(),
            }
        }
    }

    /// Blocks until `Done`, then resolves this handoff from the
    /// receiver's side, taking ownership of the delivered value on
    /// success.
    pub(crate) fn finish_as_receiver(&self) -> RecvOutcome<V> {
        let mut state = self.state.lock().unwrap();
        loop {
            match &mut state.phase {
                Phase::Done(Done::Completed(_)) => {
                    let Phase::Done(Done::Completed(v)) =
                        std::mem::replace(&mut state.phase, Phase::Done(Done::Cancelled(None)))
                    else {
                        unreachable!()
                    };
                    return RecvOutcome::Completed(v);
                }
                Phase::Done(Done::Cancelled(_)) => return RecvOutcome::Cancelled,
                _ => state = self.cv.wait(state).unwrap(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::default_spawner;
    use std::thread;

    #[test]
    fn sender_then_receiver_completes() {
        let h = Handoff::<i32>::new(default_spawner());
        h.arrive_as_sender(7);
        h.arrive_as_receiver();
        match h.finish_as_receiver() {
            RecvOutcome::Completed(v) => assert_eq!(v, 7),
            RecvOutcome::Cancelled => panic!("expected completion"),
        }
    }

    #[test]
    fn receiver_then_sender_completes() {
        let h = Handoff::<&'static str>::new(default_spawner());
        h.arrive_as_receiver();
        h.arrive_as_sender("hi");
        match h.finish_as_sender() {
            SendOutcome::Completed => {}
            SendOutcome::Cancelled(_) => panic!("expected completion"),
        }
    }

    #[test]
    fn cancel_before_ready_returns_value_to_sender() {
        let h = Handoff::<i32>::new(default_spawner());
        h.arrive_as_sender(42);
        h.cancel();
        match h.finish_as_sender() {
            SendOutcome::Cancelled(v) => assert_eq!(v, 42),
            SendOutcome::Completed => panic!("expected cancellation"),
        }
    }

    #[test]
    fn cancel_is_idempotent() {
        let h = Handoff::<i32>::new(default_spawner());
        h.cancel();
        h.cancel();
        h.proceed(); // no-op, already Done
        assert!(h.is_ready());
    }

    #[test]
    fn is_ready_reflects_ready_and_done() {
        let h = Handoff::<i32>::new(default_spawner());
        assert!(!h.is_ready());
        h.arrive_as_receiver();
        assert!(!h.is_ready());
        h.arrive_as_sender(1);
        assert!(h.is_ready());
    }

    #[test]
    #[should_panic(expected = "already has a sender")]
    fn double_sender_arrival_panics() {
        let h = Handoff::<i32>::new(default_spawner());
        h.arrive_as_sender(1);
        h.arrive_as_sender(2);
    }

    #[test]
    fn on_ready_fires_immediately_when_already_ready() {
        use std::sync::mpsc;
        let h = Handoff::<i32>::new(default_spawner());
        h.arrive_as_receiver();
        h.arrive_as_sender(9);
        assert!(h.is_ready());

        let (tx, rx) = mpsc::channel();
        h.on_ready(Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn default_committer_unblocks_both_parties_across_threads() {
        let h = Arc::new(Handoff::<i32>::new(default_spawner()));
        let h2 = Arc::clone(&h);

        let receiver = thread::spawn(move || {
            h2.arrive_as_receiver();
            h2.finish_as_receiver()
        });

        // Give the receiver a chance to park before the sender arrives.
        thread::sleep(std::time::Duration::from_millis(20));
        h.arrive_as_sender(100);
        match h.finish_as_sender() {
            SendOutcome::Completed => {}
            SendOutcome::Cancelled(_) => panic!("expected completion"),
        }

        match receiver.join().unwrap() {
            RecvOutcome::Completed(v) => assert_eq!(v, 100),
            RecvOutcome::Cancelled => panic!("expected completion"),
        }
    }
}
