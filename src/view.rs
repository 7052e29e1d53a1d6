//! Send-only and receive-only view wrappers (§6, §9 "zero-cost
//! newtypes that delegate").
//!
//! [`Sender`] and [`Receiver`] are thin, `Clone`-able handles onto a
//! shared [`Channel`]. Cloning one clones the `Arc`, not the channel;
//! every clone is just another producer or consumer contending on the
//! same pair of waiter queues.

use std::fmt;
use std::sync::Arc;

use crate::channel::Channel;

/// A handle that may only send on its channel.
pub struct Sender<V> {
    channel: Arc<Channel<V>>,
}

impl<V: Send + 'static> Sender<V> {
    pub(crate) fn new(channel: Arc<Channel<V>>) -> Self {
        Self { channel }
    }

    /// Blocks until `v` is delivered to some receiver.
    pub fn send(&self, v: V) {
        self.channel.send(v)
    }

    /// Exposes the underlying channel, for use as a [`crate::select`] case.
    pub fn channel(&self) -> &Arc<Channel<V>> {
        &self.channel
    }
}

impl<V> Clone for Sender<V> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<V> fmt::Debug for Sender<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").finish_non_exhaustive()
    }
}

/// A handle that may only receive on its channel.
pub struct Receiver<V> {
    channel: Arc<Channel<V>>,
}

impl<V: Send + 'static> Receiver<V> {
    pub(crate) fn new(channel: Arc<Channel<V>>) -> Self {
        Self { channel }
    }

    /// Blocks until some sender offers a value.
    pub fn recv(&self) -> V {
        self.channel.recv()
    }

    /// Exposes the underlying channel, for use as a [`crate::select`] case.
    pub fn channel(&self) -> &Arc<Channel<V>> {
        &self.channel
    }
}

impl<V> Clone for Receiver<V> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<V> fmt::Debug for Receiver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

/// Creates a fresh unbuffered rendezvous channel and returns its two
/// views, using the default one-thread-per-job spawner.
pub fn unbounded<V: Send + 'static>() -> (Sender<V>, Receiver<V>) {
    let channel = Channel::new();
    (
        Sender::new(Arc::clone(&channel)),
        Receiver::new(channel),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn views_round_trip() {
        let (tx, rx) = unbounded::<i32>();
        let tx2 = tx.clone();
        let h = thread::spawn(move || tx2.send(3));
        assert_eq!(rx.recv(), 3);
        h.join().unwrap();
    }

    #[test]
    fn clones_share_the_same_channel() {
        let (tx, rx) = unbounded::<i32>();
        let tx2 = tx.clone();
        let rx2 = rx.clone();

        let h1 = thread::spawn(move || tx.send(1));
        let h2 = thread::spawn(move || tx2.send(2));

        let mut got = vec![rx.recv(), rx2.recv()];
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);

        h1.join().unwrap();
        h2.join().unwrap();
    }
}
