//! # Trivia Relay Library
//!
//! This library provides the relay that connects the clients of a trivia
//! session. The relay holds no game logic: it forwards every event published
//! on a session's channel to every subscriber of that channel, and answers
//! a small set of lobby requests on the side.
//!
//! ## Core Responsibilities
//!
//! ### Channel Fan-Out
//! Each session uses its four-character code as a channel name. An event
//! published on a channel is delivered to all of its subscribers, the
//! publisher included. Delivery is best effort over UDP; clients tolerate
//! loss, duplication and reordering on their own.
//!
//! ### Lobby Registry
//! The relay hands out session codes and decides who may join:
//! - Code allocation with collision checks
//! - Admission only while a session is waiting or playing
//! - Nickname uniqueness within a session
//! - Reconnect detection for ids it has already admitted
//!
//! The registry learns phase and roster changes by watching published
//! events, and drops a session when its host leaves or its channel empties.
//!
//! ### Subscriber Liveness
//! Subscribers that stay silent longer than the configured timeout are
//! dropped. Clients keep themselves alive with heartbeats.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All packets are handled sequentially by one loop that owns the lobby
//! registry. Socket reads, writes and timeout sweeps run as separate tasks
//! that talk to the loop over unbounded channels.
//!
//! ## Module Organization
//!
//! ### Channel Manager Module (`channel_manager`)
//! Subscriber lists per channel, liveness and capacity.
//!
//! ### Lobby Module (`lobby`)
//! Session codes, admission decisions and event-driven lobby updates.
//!
//! ### Network Module (`network`)
//! The UDP server, its worker tasks and packet dispatch.

pub mod channel_manager;
pub mod lobby;
pub mod network;

pub use network::{RelayConfig, Server};
