//! # Trivia Client Library
//!
//! This library provides the client side of a multi-player trivia session. A
//! session has exactly one host, who runs the game, and any number of players
//! who answer. There is no game server: the relay only forwards events, and
//! every client rebuilds the session from the events it receives.
//!
//! ## Architecture Overview
//!
//! ### Host Authority
//! Only the host originates lifecycle events: starting the game, dealing
//! questions, closing them and ending the game. The host's timer is the only
//! one that can close a question, and the host computes every score. Players
//! originate exactly three kinds of event: their own join, their own answer
//! and their own departure.
//!
//! ### Replicated State
//! Every client, the host included, holds a [`replica::SessionReplica`] and
//! applies each delivered event to it. The reducer is idempotent and refuses
//! to move backwards, so duplicated or late deliveries never corrupt state.
//! The host applies its own events before publishing them and ignores the
//! copy the relay sends back.
//!
//! ### Sans-IO Control
//! [`controller::SessionController`] performs no I/O. Each operation returns
//! a list of [`controller::Action`]s (broadcast an event, schedule an
//! advance, detach) which the network driver carries out. Tests drive the
//! same controller over an in-memory bus.
//!
//! ## Module Organization
//!
//! ### Roster (`roster`)
//! Player entries in join order, answer bookkeeping and reconnect handling.
//!
//! ### Timer (`timer`)
//! One-second question countdown.
//!
//! ### Replica (`replica`)
//! The event reducer shared by every role.
//!
//! ### Controller (`controller`)
//! Session lifecycle: create, join, start, advance, reveal, answer, end
//! and leave.
//!
//! ### Questions (`questions`)
//! JSON question bank loading, validation and per-game selection.
//!
//! ### Network (`network`)
//! Relay connection and the terminal client's event loop:
//! - UDP socket management and lobby requests
//! - Channel subscribe and publish
//! - Heartbeats, link loss detection and resubscription
//!
//! ### Input and Rendering (`input`, `rendering`)
//! Terminal commands in, text frames out.
//!
//! ## Usage Example
//!
//! ```ignore
//! use client::controller::{SessionConfig, SessionController};
//! use client::network::{create_session, RelayConnection};
//!
//! let connection = RelayConnection::connect("127.0.0.1:8080", 0).await?;
//! let mut host = create_session(&connection, "host-1", SessionConfig::default()).await?;
//!
//! // Every operation yields actions for the driver
//! for action in host.start(questions) {
//!     // publish, schedule or detach
//! }
//! ```

pub mod controller;
pub mod error;
pub mod input;
pub mod network;
pub mod questions;
pub mod rendering;
pub mod replica;
pub mod roster;
pub mod timer;
pub mod utils;

pub use controller::{Action, Role, SessionConfig, SessionController};
pub use error::SessionError;
pub use replica::{ApplyOutcome, SessionReplica};
