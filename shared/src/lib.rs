//! Rule engine and wire types shared by the match server and client.
//!
//! The server drives a [`match_state::MatchState`] with full knowledge of every
//! hand. Each client mirrors the match through a [`local_state::LocalState`],
//! which only knows its own seat's concealed tiles. Both sides speak the
//! [`messages`] protocol.

pub mod hand;
pub mod local_state;
pub mod match_state;
pub mod messages;
pub mod tile;

use hand::{Call, HandError};
use thiserror::Error;
use tile::{TileId, Wind};

pub use hand::HAND_SIZE;

/// A rule violation reported by either side of the rule engine.
///
/// Every fallible engine operation returns this and leaves its state untouched
/// on failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{action} is not allowed while the match is in {state}")]
    WrongTurn { action: &'static str, state: String },

    #[error("{0:?} is not a remote seat")]
    NotRemote(Wind),

    #[error("unknown tile id {}", .0.raw())]
    UnknownTile(TileId),

    #[error(transparent)]
    Hand(#[from] HandError),

    #[error("no tiles left in the wall")]
    WallExhausted,

    #[error("{seat:?} cannot make {call:?} on this discard")]
    InvalidCall { seat: Wind, call: Call },

    #[error("{0:?} is not deciding on a call")]
    NotWaiting(Wind),

    #[error("still waiting on call decisions from {0:?}")]
    CallsOutstanding(Vec<Wind>),

    #[error("call resolution does not match the current discard")]
    DiscardMismatch,

    #[error("{caller:?}'s {call:?} does not outrank the local {local:?}")]
    NotOutranked { caller: Wind, call: Call, local: Call },

    #[error("the local call {0:?} was resolved as a pass")]
    CallIgnored(Call),
}

impl ActionError {
    pub(crate) fn wrong_turn<T: std::fmt::Debug>(action: &'static str, state: &T) -> Self {
        ActionError::WrongTurn {
            action,
            state: format!("{state:?}"),
        }
    }
}
