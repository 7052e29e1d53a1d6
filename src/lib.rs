//! CSP-style synchronous rendezvous channels.
//!
//! An unbuffered [`Channel`] pairs one sender with one receiver: a
//! [`Channel::send`]/[`Sender::send`] call only returns once a matching
//! `recv` has taken the value, and vice versa. [`select`] lets a thread
//! offer several candidate sends/receives at once, commit whichever one
//! becomes ready first, and cleanly cancel the rest.
//!
//! The whole library is built on one primitive, [`Handoff`]: a one-shot
//! two-party rendezvous object that a channel's waiter queues create on
//! demand and that `select` arms, races, and cancels. See the
//! `handoff`, `channel`, and `select` modules for the state machine and
//! its invariants.
//!
//! ```
//! use rendezvous::Channel;
//! use std::thread;
//!
//! let ch = Channel::<i32>::new();
//! let ch2 = ch.clone();
//! let producer = thread::spawn(move || ch2.send(7));
//! assert_eq!(ch.recv(), 7);
//! producer.join().unwrap();
//! ```
//!
//! # Non-goals
//!
//! Buffered/bounded channels, channel closure, and per-call deadlines
//! are out of scope — see the crate's design notes. `select` is the
//! only place a timeout can be layered in, via a timer channel case.

mod handoff;

pub mod callback;
pub mod channel;
pub mod select;
pub mod spawn;
pub mod view;

#[cfg(feature = "async")]
pub mod async_support;

pub use channel::Channel;
pub use select::{recv_from, select, send_to, SelectCase, SelectError};
pub use spawn::{Spawn, ThreadSpawn};
pub use view::{unbounded, Receiver, Sender};

#[cfg(feature = "async")]
pub use async_support::{RecvFuture, SendFuture};
