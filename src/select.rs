//! The multi-way nondeterministic choice coordinator (§4.3 of the
//! design doc).
//!
//! `select` arms every candidate case against a shared ready signal,
//! waits for the first signal, picks uniformly among whatever is
//! actually ready at that instant, commits the winner and cancels the
//! rest. If the scan comes up empty (every candidate got raced away
//! between signal and scan), it re-arms and tries again.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use rand::Rng;

use crate::channel::Channel;
use crate::handoff::{Handoff, ReadyCallback, RecvOutcome, SendOutcome};

/// The one user-visible usage error `select` can report (§7, §10):
/// everything else about a candidate losing the race is normal,
/// expected control flow, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    /// `select` was called with no cases.
    EmptyCaseSet,
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::EmptyCaseSet => write!(f, "select called with an empty case set"),
        }
    }
}

impl std::error::Error for SelectError {}

/// A single candidate operation in a [`select`] call: either a receive
/// from a channel or a send of a value to one, paired with the
/// callback to run iff this case wins.
pub struct SelectCase<'a> {
    inner: Box<dyn Case + 'a>,
}

/// Builds a receive candidate: if chosen, `on_recv` is invoked with the
/// received value.
pub fn recv_from<'a, V, F>(channel: &Arc<Channel<V>>, on_recv: F) -> SelectCase<'a>
where
    V: Send + 'static,
    F: FnOnce(V) + 'a,
{
    SelectCase {
        inner: Box::new(RecvCase {
            channel: Arc::clone(channel),
            handoff: RefCell::new(None),
            callback: RefCell::new(Some(on_recv)),
        }),
    }
}

/// Builds a send candidate: if chosen, `v` is delivered and `on_sent`
/// is invoked afterward.
pub fn send_to<'a, V, F>(channel: &Arc<Channel<V>>, v: V, on_sent: F) -> SelectCase<'a>
where
    V: Send + 'static,
    F: FnOnce() + 'a,
{
    SelectCase {
        inner: Box::new(SendCase {
            channel: Arc::clone(channel),
            handoff: RefCell::new(None),
            value: RefCell::new(Some(v)),
            callback: RefCell::new(Some(on_sent)),
        }),
    }
}

/// Type-erased seam between [`SelectCase`] and the coordinator loop
/// below. Every method runs on the thread calling [`select`]; only the
/// ready callback passed to [`Case::arm`] crosses threads.
trait Case {
    fn arm(&self, ready_cb: ReadyCallback);
    fn is_ready(&self) -> bool;
    fn commit(&self);
    fn cancel(&self);
}

struct RecvCase<V, F> {
    channel: Arc<Channel<V>>,
    handoff: RefCell<Option<Arc<Handoff<V>>>>,
    callback: RefCell<Option<F>>,
}

impl<V: Send + 'static, F: FnOnce(V)> Case for RecvCase<V, F> {
    fn arm(&self, ready_cb: ReadyCallback) {
        let handoff = self.channel.try_arm_recv(ready_cb);
        *self.handoff.borrow_mut() = Some(handoff);
    }

    fn is_ready(&self) -> bool {
        self.handoff
            .borrow()
            .as_ref()
            .is_some_and(|h| h.is_ready())
    }

    fn commit(&self) {
        let handoff = self
            .handoff
            .borrow_mut()
            .take()
            .expect("Case::commit called before Case::arm");
        handoff.proceed();
        match handoff.finish_as_receiver() {
            RecvOutcome::Completed(v) => {
                let cb = self
                    .callback
                    .borrow_mut()
                    .take()
                    .expect("Case::commit called twice");
                cb(v);
            }
            RecvOutcome::Cancelled => {
                // Lost a contention race against another select arming
                // the same channel (§9 open question): the handoff we
                // chose as our winner was re-armed and committed
                // elsewhere first. No callback runs for this case.
            }
        }
    }

    fn cancel(&self) {
        if let Some(handoff) = self.handoff.borrow_mut().take() {
            handoff.cancel();
        }
    }
}

struct SendCase<V, F> {
    channel: Arc<Channel<V>>,
    handoff: RefCell<Option<Arc<Handoff<V>>>>,
    value: RefCell<Option<V>>,
    callback: RefCell<Option<F>>,
}

impl<V: Send + 'static, F: FnOnce()> Case for SendCase<V, F> {
    fn arm(&self, ready_cb: ReadyCallback) {
        let v = self
            .value
            .borrow_mut()
            .take()
            .expect("Case::arm called twice on a send case");
        let handoff = self.channel.try_arm_send(v, ready_cb);
        *self.handoff.borrow_mut() = Some(handoff);
    }

    fn is_ready(&self) -> bool {
        self.handoff
            .borrow()
            .as_ref()
            .is_some_and(|h| h.is_ready())
    }

    fn commit(&self) {
        let handoff = self
            .handoff
            .borrow_mut()
            .take()
            .expect("Case::commit called before Case::arm");
        handoff.proceed();
        match handoff.finish_as_sender() {
            SendOutcome::Completed => {
                let cb = self
                    .callback
                    .borrow_mut()
                    .take()
                    .expect("Case::commit called twice");
                cb();
            }
            SendOutcome::Cancelled(v) => {
                // See RecvCase::commit: lost a contention race. The
                // value never left this case; it would need to be
                // resubmitted by the caller on a future select.
                drop(v);
            }
        }
    }

    fn cancel(&self) {
        if let Some(handoff) = self.handoff.borrow_mut().take() {
            handoff.cancel();
            // The handoff is now Done; finish_as_sender returns
            // immediately rather than blocking. Recover the value so a
            // subsequent Case::arm (select's own internal retry when a
            // round comes up with nothing ready) has something to send
            // instead of panicking on an already-empty `value`.
            if let SendOutcome::Cancelled(v) = handoff.finish_as_sender() {
                *self.value.borrow_mut() = Some(v);
            }
        }
    }
}

/// Coalesces N "ready" notifications into a single wakeup.
struct Signal {
    fired: Mutex<bool>,
    cv: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            fired: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn fire(&self) {
        let mut fired = self.fired.lock().unwrap();
        *fired = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.cv.wait(fired).unwrap();
        }
    }
}

/// Drives exactly one of `cases` to completion, invoking that case's
/// callback, and cancels the rest. Retries internally if a race leaves
/// nothing actually ready at scan time (§4.3 step 6).
///
/// # Panics
///
/// None directly; misuse of an individual [`Handoff`] (e.g. double
/// arrival) panics from within the core, per §7.
pub fn select(cases: Vec<SelectCase<'_>>) -> Result<(), SelectError> {
    if cases.is_empty() {
        return Err(SelectError::EmptyCaseSet);
    }

    loop {
        let signal = Arc::new(Signal::new());
        for case in &cases {
            let sig = Arc::clone(&signal);
            case.inner.arm(Box::new(move || sig.fire()));
        }

        signal.wait();

        let ready: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| c.inner.is_ready())
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            // Every candidate got raced away between the signal firing
            // and this scan. Cancel this round's armings before
            // re-arming with a fresh signal — otherwise the stale
            // handoffs stay parked in their channels' queues, armed
            // with a ready_cb tied to a signal nobody is waiting on
            // anymore, and could be paired by a real counterparty that
            // then blocks forever waiting for a `proceed`/`cancel` that
            // will never come.
            for case in &cases {
                case.inner.cancel();
            }
            continue;
        }

        let winner = ready[rand::thread_rng().gen_range(0..ready.len())];

        for (i, case) in cases.iter().enumerate() {
            if i == winner {
                case.inner.commit();
            } else {
                case.inner.cancel();
            }
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn empty_case_set_is_rejected() {
        assert_eq!(select(vec![]), Err(SelectError::EmptyCaseSet));
    }

    #[test]
    fn picks_the_only_ready_receive_case() {
        let a = Channel::<i32>::new();
        let b = Channel::<i32>::new();

        let a2 = Arc::clone(&a);
        let sender = thread::spawn(move || a2.send(7));

        let got = Cell::new(None);
        loop {
            let result = select(vec![
                recv_from(&a, |v| got.set(Some(("a", v)))),
                recv_from(&b, |v| got.set(Some(("b", v)))),
            ]);
            assert!(result.is_ok());
            if got.get().is_some() {
                break;
            }
        }
        assert_eq!(got.into_inner(), Some(("a", 7)));
        sender.join().unwrap();
    }

    #[test]
    fn send_case_delivers_and_fires_callback() {
        let ch = Channel::<&'static str>::new();
        let ch2 = Arc::clone(&ch);
        let receiver = thread::spawn(move || ch2.recv());

        let fired = Cell::new(false);
        loop {
            let result = select(vec![send_to(&ch, "hi", || fired.set(true))]);
            assert!(result.is_ok());
            if fired.get() {
                break;
            }
        }
        assert_eq!(receiver.join().unwrap(), "hi");
    }

    #[test]
    fn fairness_over_many_ready_channels() {
        const ROUNDS: usize = 200;
        let channels: Vec<_> = (0..3).map(|_| Channel::<usize>::new()).collect();

        let mut producers = Vec::new();
        for (i, ch) in channels.iter().enumerate() {
            let ch = Arc::clone(ch);
            producers.push(thread::spawn(move || loop {
                ch.send(i);
            }));
        }

        let mut counts = HashMap::new();
        for _ in 0..ROUNDS {
            let chosen = Cell::new(None);
            let cases = channels
                .iter()
                .enumerate()
                .map(|(i, ch)| recv_from(ch, |_v| chosen.set(Some(i))))
                .collect();
            select(cases).unwrap();
            *counts.entry(chosen.into_inner().unwrap()).or_insert(0) += 1;
        }

        for i in 0..3 {
            assert!(
                *counts.get(&i).unwrap_or(&0) > 2,
                "channel {i} starved: {counts:?}"
            );
        }
        // Producers loop forever; this process exiting reclaims them.
        for p in producers {
            drop(p);
        }
    }

    #[test]
    fn mixes_send_and_receive_cases_with_a_never_ready_one() {
        // Two receive cases (each peered with a producer sending its
        // index), two send cases (each peered with a consumer expecting
        // its index), and one case on a channel nobody ever touches.
        let recv_a = Channel::<usize>::new();
        let recv_b = Channel::<usize>::new();
        let send_a = Channel::<usize>::new();
        let send_b = Channel::<usize>::new();
        let never = Channel::<usize>::new();

        let ra = Arc::clone(&recv_a);
        let rb = Arc::clone(&recv_b);
        let producer_a = thread::spawn(move || ra.send(0));
        let producer_b = thread::spawn(move || rb.send(1));

        let sa = Arc::clone(&send_a);
        let sb = Arc::clone(&send_b);
        let consumer_a = thread::spawn(move || sa.recv());
        let consumer_b = thread::spawn(move || sb.recv());

        let fired = Cell::new(0usize);
        loop {
            let result = select(vec![
                recv_from(&recv_a, |v| {
                    assert_eq!(v, 0);
                    fired.set(fired.get() + 1);
                }),
                recv_from(&recv_b, |v| {
                    assert_eq!(v, 1);
                    fired.set(fired.get() + 1);
                }),
                send_to(&send_a, 2, || fired.set(fired.get() + 1)),
                send_to(&send_b, 3, || fired.set(fired.get() + 1)),
                recv_from(&never, |_| panic!("never-ready case must not fire")),
            ]);
            assert!(result.is_ok());
            if fired.get() > 0 {
                break;
            }
        }
        assert_eq!(fired.get(), 1, "exactly one case must fire");

        // Drain whichever producers/consumers didn't get to pair with
        // the select call, so the spawned threads can exit.
        for ch in [&recv_a, &recv_b] {
            let _ = std::thread::spawn({
                let ch = Arc::clone(ch);
                move || ch.recv()
            });
        }
        for (ch, v) in [(&send_a, 2usize), (&send_b, 3)] {
            let ch = Arc::clone(ch);
            std::thread::spawn(move || ch.send(v));
        }
        producer_a.join().unwrap();
        producer_b.join().unwrap();
        consumer_a.join().unwrap();
        consumer_b.join().unwrap();
    }

    #[test]
    fn cancellation_does_not_leak_into_the_losing_channel() {
        let a = Channel::<i32>::new();
        let b = Channel::<i32>::new();

        let a2 = Arc::clone(&a);
        let sender_a = thread::spawn(move || a2.send(1));

        let got = Cell::new(None);
        loop {
            select(vec![
                recv_from(&a, |v| got.set(Some(v))),
                recv_from(&b, |v| got.set(Some(v + 1000))),
            ])
            .unwrap();
            if got.get().is_some() {
                break;
            }
        }
        assert_eq!(got.get(), Some(1));
        sender_a.join().unwrap();

        let b2 = Arc::clone(&b);
        let sender_b = thread::spawn(move || b2.send(42));
        assert_eq!(b.recv(), 42);
        sender_b.join().unwrap();
    }
}
