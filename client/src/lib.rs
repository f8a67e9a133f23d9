//! # Mahjong Client Library
//!
//! This library provides the client side of a networked mahjong match. It
//! handles the connection to the match server, keeps a local view of the match
//! in step with the server, and turns player input into requests.
//!
//! ## Architecture Overview
//!
//! The client is built around speculative execution: the local player's own
//! actions are applied immediately and confirmed by the server afterwards.
//!
//! ### Dual Mirrors
//! Two copies of the match are kept. The server mirror only changes when the
//! server confirms an event. The local mirror also applies the local player's
//! discards and call decisions as soon as they are made, so the game reacts
//! without waiting for a round trip.
//!
//! ### Reconciliation
//! Every confirmed event is compared with the action still waiting for
//! confirmation. A matching confirmation simply clears it. A contradicting one
//! is a desync, which ends the session: recovering needs a fresh snapshot.
//!
//! ### Ordered Delivery
//! Inbound messages are handed out strictly in arrival order, one per receive
//! request, in the order the requests were made.
//!
//! ## Module Organization
//!
//! ### Channel Module (`channel`)
//! - WebSocket connection and its lifecycle
//! - FIFO delivery of inbound messages to queued receive requests
//! - Cancellation and failure fan-out to every waiting request
//!
//! ### Codec Module (`codec`)
//! JSON encoding of requests and decoding of events and snapshots.
//!
//! ### Rules Module (`rules`)
//! The [`rules::RuleEngine`] seam wrapped by each mirror, and the
//! [`rules::TurnPhase`] derived from it.
//!
//! ### Mirror Module (`mirror`)
//! A single copy of the match, applying confirmed events through its engine.
//!
//! ### Game Module (`game`)
//! The [`game::TurnSynchronizer`]: phase gating, speculative actions and
//! reconciliation of confirmed events.
//!
//! ### Input Module (`input`)
//! Per-frame input sources, including a headless [`input::AutoPlayer`].
//!
//! ### Network Module (`network`)
//! The [`network::Session`]: version check and account login, the match
//! request, then the event and input loops. A refused handshake fails with a
//! typed [`error::HandshakeError`] and closes the connection.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::ClientConfig;
//! use client::input::AutoPlayer;
//! use client::network::Session;
//!
//! # async fn play() -> Result<(), client::error::SessionError> {
//! let mut session: Session = Session::connect(ClientConfig::default()).await?;
//! let outcome = session.run(&mut AutoPlayer::new()).await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod mirror;
pub mod network;
pub mod rules;
