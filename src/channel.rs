//! The waiter queues that pair senders with receivers (§4.2 of the
//! design doc).
//!
//! A [`Channel`] holds no value itself — it only matches a party with a
//! parked [`Handoff`] left by the other side, or parks a fresh one when
//! no counterpart is waiting yet. At most one of the two queues is
//! non-empty at any instant: a channel is never simultaneously owed a
//! sender and a receiver, since arrival always pairs the two off.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::handoff::{Handoff, ReadyCallback, RecvArrival, RecvOutcome, SendArrival, SendOutcome};
use crate::spawn::{default_spawner, Spawn};

struct Queues<V> {
    waiting_senders: VecDeque<Arc<Handoff<V>>>,
    waiting_receivers: VecDeque<Arc<Handoff<V>>>,
}

/// The shared, unbuffered rendezvous point underlying [`crate::Sender`]
/// and [`crate::Receiver`]. Cloning a `Sender`/`Receiver` clones an
/// `Arc` around the same `Channel`; the channel itself is never cloned.
pub struct Channel<V> {
    queues: Mutex<Queues<V>>,
    spawner: Arc<dyn Spawn>,
}

impl<V: Send + 'static> Channel<V> {
    /// Creates a channel using the default one-thread-per-job spawner.
    pub fn new() -> Arc<Self> {
        Self::with_spawner(default_spawner())
    }

    /// Creates a channel whose ready callbacks are dispatched through a
    /// caller-supplied [`Spawn`] (§5, §12).
    pub fn with_spawner(spawner: Arc<dyn Spawn>) -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(Queues {
                waiting_senders: VecDeque::new(),
                waiting_receivers: VecDeque::new(),
            }),
            spawner,
        })
    }

    /// Blocks until `v` has been delivered to some receiver on this
    /// channel. If the handoff this send lands on turns out to be dead
    /// — already cancelled by a losing `select` case before this send
    /// ever reached it, or cancelled out from under it after arriving —
    /// the send restarts from the top with the same value (§4.2).
    pub fn send(&self, mut v: V) {
        loop {
            let handoff = self.obtain_for_send();
            match handoff.arrive_as_sender(v) {
                SendArrival::Dead(back) => {
                    v = back;
                    continue;
                }
                SendArrival::Accepted => {}
            }
            match handoff.finish_as_sender() {
                SendOutcome::Completed => return,
                SendOutcome::Cancelled(back) => v = back,
            }
        }
    }

    /// Blocks until some sender offers a value, restarting on
    /// cancellation exactly as [`Channel::send`] does.
    pub fn recv(&self) -> V {
        loop {
            let handoff = self.obtain_for_recv();
            match handoff.arrive_as_receiver() {
                RecvArrival::Dead => continue,
                RecvArrival::Accepted => {}
            }
            match handoff.finish_as_receiver() {
                RecvOutcome::Completed(v) => return v,
                RecvOutcome::Cancelled => continue,
            }
        }
    }

    /// Arms a send candidate for [`crate::select`]: finds or creates a
    /// handoff, installs `ready_cb` *before* depositing `v` so a
    /// dequeued counterpart's stale default committer never fires
    /// ahead of the select coordinator, then performs the non-blocking
    /// arrival. `ready_cb` is wrapped so it survives being installed on
    /// more than one handoff: if the handoff obtained this attempt is
    /// already dead (cancelled while parked, per §4.2), a fresh one is
    /// obtained and `ready_cb` is (re)installed there instead; the
    /// wrapper guarantees the underlying callback still fires at most
    /// once even if an earlier dead handoff's `on_ready` dispatched it
    /// eagerly.
    pub(crate) fn try_arm_send(&self, mut v: V, ready_cb: ReadyCallback) -> Arc<Handoff<V>> {
        let ready_cb = Arc::new(Mutex::new(Some(ready_cb)));
        loop {
            let handoff = self.obtain_for_send();
            let ready_cb = Arc::clone(&ready_cb);
            handoff.on_ready(Box::new(move || {
                if let Some(cb) = ready_cb.lock().unwrap().take() {
                    cb();
                }
            }));
            match handoff.arrive_as_sender(v) {
                SendArrival::Accepted => return handoff,
                SendArrival::Dead(back) => v = back,
            }
        }
    }

    /// Arms a receive candidate for [`crate::select`]; see
    /// [`Channel::try_arm_send`].
    pub(crate) fn try_arm_recv(&self, ready_cb: ReadyCallback) -> Arc<Handoff<V>> {
        let ready_cb = Arc::new(Mutex::new(Some(ready_cb)));
        loop {
            let handoff = self.obtain_for_recv();
            let ready_cb = Arc::clone(&ready_cb);
            handoff.on_ready(Box::new(move || {
                if let Some(cb) = ready_cb.lock().unwrap().take() {
                    cb();
                }
            }));
            match handoff.arrive_as_receiver() {
                RecvArrival::Accepted => return handoff,
                RecvArrival::Dead => {}
            }
        }
    }

    pub(crate) fn spawner(&self) -> Arc<dyn Spawn> {
        Arc::clone(&self.spawner)
    }

    /// Pops the first live (not already `Done`) waiting receiver, if
    /// any. A handoff can sit `Done` in this queue when a `select` case
    /// armed it and then lost the race without this channel ever
    /// dequeuing it in between (§4.2); such stale entries are dropped
    /// here instead of being handed to a new arrival.
    fn obtain_for_send(&self) -> Arc<Handoff<V>> {
        let mut q = self.queues.lock().unwrap();
        while let Some(h) = q.waiting_receivers.pop_front() {
            if !h.is_done() {
                return h;
            }
        }
        let h = Handoff::new(Arc::clone(&self.spawner));
        q.waiting_senders.push_back(Arc::clone(&h));
        h
    }

    /// Symmetric with [`Channel::obtain_for_send`].
    fn obtain_for_recv(&self) -> Arc<Handoff<V>> {
        let mut q = self.queues.lock().unwrap();
        while let Some(h) = q.waiting_senders.pop_front() {
            if !h.is_done() {
                return h;
            }
        }
        let h = Handoff::new(Arc::clone(&self.spawner));
        q.waiting_receivers.push_back(Arc::clone(&h));
        h
    }
}
