//! `Future`-returning recv/send, behind the `async` feature (§13 of
//! the design doc).
//!
//! Reuses the exact arm/ready/proceed protocol [`crate::select`] uses
//! instead of inventing a second rendezvous mechanism: a poll arms the
//! handoff (or finds the one from a prior poll), and the handoff's
//! `Ready` phase is what lets a later poll resolve without blocking.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::task::AtomicWaker;

use crate::channel::Channel;
use crate::handoff::{Handoff, RecvOutcome, SendOutcome};

struct AsyncState<V> {
    waker: AtomicWaker,
    handoff: Mutex<Option<Arc<Handoff<V>>>>,
}

impl<V> AsyncState<V> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            waker: AtomicWaker::new(),
            handoff: Mutex::new(None),
        })
    }
}

/// A future that resolves to the next value received on a channel.
pub struct RecvFuture<V> {
    channel: Arc<Channel<V>>,
    state: Arc<AsyncState<V>>,
    armed: bool,
}

impl<V: Send + 'static> Future for RecvFuture<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        let this = self.get_mut();
        this.state.waker.register(cx.waker());

        if !this.armed {
            this.armed = true;
            let state = Arc::clone(&this.state);
            let handoff = this
                .channel
                .try_arm_recv(Box::new(move || state.waker.wake()));
            *this.state.handoff.lock().unwrap() = Some(handoff);
        }

        let handoff = match this.state.handoff.lock().unwrap().clone() {
            Some(h) => h,
            None => return Poll::Pending,
        };
        if !handoff.is_ready() {
            return Poll::Pending;
        }

        handoff.proceed();
        match handoff.finish_as_receiver() {
            RecvOutcome::Completed(v) => Poll::Ready(v),
            RecvOutcome::Cancelled => {
                // Lost a contention race against a concurrent select or
                // async poll arming the same channel (§9). Re-arm and
                // wake ourselves immediately rather than waiting for an
                // external wakeup that may never come.
                *this.state.handoff.lock().unwrap() = None;
                this.armed = false;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// A future that resolves once its value has been delivered to a
/// receiver.
pub struct SendFuture<V> {
    channel: Arc<Channel<V>>,
    state: Arc<AsyncState<V>>,
    value: Option<V>,
    armed: bool,
}

impl<V: Send + 'static> Future for SendFuture<V> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        this.state.waker.register(cx.waker());

        if !this.armed {
            this.armed = true;
            let state = Arc::clone(&this.state);
            let v = this
                .value
                .take()
                .expect("SendFuture polled again after completing");
            let handoff = this
                .channel
                .try_arm_send(v, Box::new(move || state.waker.wake()));
            *this.state.handoff.lock().unwrap() = Some(handoff);
        }

        let handoff = match this.state.handoff.lock().unwrap().clone() {
            Some(h) => h,
            None => return Poll::Pending,
        };
        if !handoff.is_ready() {
            return Poll::Pending;
        }

        handoff.proceed();
        match handoff.finish_as_sender() {
            SendOutcome::Completed => Poll::Ready(()),
            SendOutcome::Cancelled(v) => {
                this.value = Some(v);
                *this.state.handoff.lock().unwrap() = None;
                this.armed = false;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

impl<V: Send + 'static> Channel<V> {
    /// Returns a future that resolves to the next received value.
    pub fn recv_async(self: &Arc<Self>) -> RecvFuture<V> {
        RecvFuture {
            channel: Arc::clone(self),
            state: AsyncState::new(),
            armed: false,
        }
    }

    /// Returns a future that resolves once `v` has been delivered.
    pub fn send_async(self: &Arc<Self>, v: V) -> SendFuture<V> {
        SendFuture {
            channel: Arc::clone(self),
            state: AsyncState::new(),
            value: Some(v),
            armed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_async_observes_a_blocking_send() {
        let ch = Channel::<i32>::new();
        let ch2 = Arc::clone(&ch);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            ch2.send(11);
        });
        assert_eq!(ch.recv_async().await, 11);
    }

    #[tokio::test]
    async fn send_async_observes_a_blocking_recv() {
        let ch = Channel::<i32>::new();
        let ch2 = Arc::clone(&ch);
        let receiver = std::thread::spawn(move || ch2.recv());
        ch.send_async(5).await;
        assert_eq!(receiver.join().unwrap(), 5);
    }

    #[tokio::test]
    async fn send_async_and_recv_async_pair_up_directly() {
        let ch = Channel::<&'static str>::new();
        let ch2 = Arc::clone(&ch);
        let (sent, received) = tokio::join!(ch.send_async("paired"), ch2.recv_async());
        let _: () = sent;
        assert_eq!(received, "paired");
    }
}
