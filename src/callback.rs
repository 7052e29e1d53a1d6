//! The callback-style convenience wrappers named in §6/§13: spawn a
//! worker that performs a blocking `recv`/`send`, then hand the result
//! to a caller-chosen callback. These compose on top of [`Channel`]
//! and add no new invariants of their own.

use std::sync::Arc;

use crate::channel::Channel;
use crate::spawn::Spawn;

impl<V: Send + 'static> Channel<V> {
    /// Spawns a worker on `spawner` that blocks on `recv` and passes
    /// the value to `cb`. Returns immediately.
    pub fn recv_callback<F>(self: &Arc<Self>, spawner: &Arc<dyn Spawn>, cb: F)
    where
        F: FnOnce(V) + Send + 'static,
    {
        let channel = Arc::clone(self);
        spawner.spawn(Box::new(move || {
            let v = channel.recv();
            cb(v);
        }));
    }

    /// Spawns a worker on `spawner` that blocks until `v` is delivered,
    /// then calls `cb`. Returns immediately.
    pub fn send_callback<F>(self: &Arc<Self>, spawner: &Arc<dyn Spawn>, v: V, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let channel = Arc::clone(self);
        spawner.spawn(Box::new(move || {
            channel.send(v);
            cb();
        }));
    }

    /// Convenience over [`Channel::recv_callback`] using this channel's
    /// own spawner.
    pub fn recv_then<F>(self: &Arc<Self>, cb: F)
    where
        F: FnOnce(V) + Send + 'static,
    {
        let spawner = self.spawner();
        self.recv_callback(&spawner, cb);
    }

    /// Convenience over [`Channel::send_callback`] using this channel's
    /// own spawner.
    pub fn send_then<F>(self: &Arc<Self>, v: V, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let spawner = self.spawner();
        self.send_callback(&spawner, v, cb);
    }
}
