//! The worker-spawning seam (§5, §12 of the design doc).
//!
//! The rendezvous protocol never runs a ready callback inline under a
//! mutex (see [`crate::handoff`]); it always hands the callback to a
//! [`Spawn`] implementation instead. This is the library's only
//! configuration surface: callers choose how "run this on a worker" is
//! implemented. The default is a thread-per-call spawner, which is the
//! correct choice for a blocking, OS-thread based design (§5 resource
//! risks) but is trivially swappable for a caller's own pool.

use std::sync::Arc;

/// A task to run on some worker, with no ordering guarantees relative to
/// the caller.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs a [`Job`] on some worker. Implementations must not block the
/// calling thread waiting for the job to finish — `spawn` is for
/// fire-and-forget dispatch only.
pub trait Spawn: Send + Sync + 'static {
    fn spawn(&self, job: Job);
}

/// Default spawner: one native OS thread per job.
///
/// Matches the core's operational contract (§5): parking on native
/// threads means a blocked rendezvous never consumes a worker from a
/// bounded pool. Appropriate for moderate fan-out; a caller running
/// thousands of concurrent rendezvous should supply their own pooled
/// [`Spawn`] implementation instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawn;

impl Spawn for ThreadSpawn {
    fn spawn(&self, job: Job) {
        std::thread::spawn(job);
    }
}

pub(crate) fn default_spawner() -> Arc<dyn Spawn> {
    Arc::new(ThreadSpawn)
}
