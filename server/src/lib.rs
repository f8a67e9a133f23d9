//! # Mahjong Match Server
//!
//! The authoritative side of a networked mahjong match. Each WebSocket
//! connection gets its own match, with the client at East and the three other
//! seats played by the server.
//!
//! ## Protocol
//! The client opens with a handshake carrying its version and, optionally, the
//! credentials of an existing account. A client on another version, or with
//! credentials the server does not know, is refused and disconnected; a client
//! without credentials gets a new account. Next comes `StartMatch`, answered
//! with a snapshot of the match from the client's seat. After that every
//! client request is answered with the events it caused, in order, followed by
//! everything the other seats did up to the point where the client has to act
//! again. A request the match rejects closes the connection.
//!
//! ## Module Organization
//!
//! ### Accounts Module (`accounts`)
//! [`accounts::AccountRegistry`] holds every account and answers handshakes.
//!
//! ### Game Module (`game`)
//! [`game::MatchController`] validates client requests against the match
//! rules and plays the computer seats.
//!
//! ### Network Module (`network`)
//! [`network::Server`] accepts connections and serves one match per
//! connection until it is canceled.

pub mod accounts;
pub mod game;
pub mod network;
