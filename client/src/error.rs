//! Failure taxonomy for a client session.

use shared::messages::MatchEvent;
use shared::ActionError;
use std::time::Duration;
use thiserror::Error;

/// The connection could not be established or failed mid-session.
///
/// Cloneable so one fault can be handed to every queued receive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unsupported address `{0}`, expected a ws:// url")]
    UnsupportedScheme(String),

    #[error("handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("no connection after {0:?}")]
    Timeout(Duration),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("connection closed by peer")]
    ClosedByPeer,

    #[error("channel is closed")]
    ChannelClosed,
}

/// An inbound payload could not be decoded or applied.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed {kind}: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{event:?} is not valid for the confirmed state: {reason}")]
    InvalidEvent {
        event: MatchEvent,
        #[source]
        reason: ActionError,
    },
}

/// Confirmed events contradict the local speculative state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesyncError {
    #[error("expected confirmation of {pending}, received {event:?}")]
    Mismatch { pending: String, event: MatchEvent },

    #[error("server reported {event:?} for the local seat without a request")]
    Unrequested { event: MatchEvent },

    #[error("server resolved the call window with {event:?} before the local seat decided")]
    UndecidedCall { event: MatchEvent },

    #[error("local state rejected {event:?}: {reason}")]
    Diverged {
        event: MatchEvent,
        #[source]
        reason: ActionError,
    },
}

/// The server did not let the session start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("client version {client} does not match server version {server}")]
    VersionMismatch { client: String, server: String },

    #[error("server refused the handshake")]
    Refused,
}

/// Anything that ends a session early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Desync(#[from] DesyncError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Why a player intent was not carried out.
///
/// Returned synchronously; a rejected intent never changes any state.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("an action is already waiting for confirmation")]
    ActionPending,

    #[error("not allowed during {phase}")]
    WrongPhase { phase: String },

    #[error("rejected by the rules: {0}")]
    Rejected(#[source] ActionError),

    #[error("the session is over")]
    SessionOver,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
