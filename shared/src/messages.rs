//! Messages exchanged between the client and the match server.
//!
//! Every message travels as a single JSON text frame.

use crate::{
    hand::Call,
    local_state::LocalState,
    match_state::MatchId,
    tile::{TileId, Wind},
};
use serde::{Deserialize, Serialize};

/// Version both peers must agree on before a match can start.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// First message on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub client_version: String,

    /// Log into an existing account; `None` asks for a new one.
    pub credentials: Option<Credentials>,
}

/// The server's answer to a [`HandshakeRequest`].
///
/// `account_data` is `None` when the handshake was refused, in which case the
/// server closes the connection after sending this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub server_version: String,
    pub new_credentials: Option<Credentials>,
    pub account_data: Option<AccountState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(u64);

impl AccountId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: AccountId,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    StartMatch,

    DiscardTile {
        id: MatchId,
        player: Wind,
        tile: TileId,
    },

    Call {
        id: MatchId,
        player: Wind,
        call: Call,
    },

    Pass {
        id: MatchId,
        player: Wind,
    },
}

/// The server's answer to `StartMatch`, carrying the recipient's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMatchResponse {
    pub state: LocalState,
}

/// Something that happened in the match.
///
/// Events are tailored to each recipient: a client is told which tile it drew,
/// but only which seat drew for everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEvent {
    LocalDraw { tile: TileId },

    RemoteDraw { seat: Wind },

    TileDiscarded { seat: Wind, tile: TileId },

    /// No seat called the last discard.
    Pass,

    /// A seat called the last discard.
    Call(FinalCall),

    MatchEnded,
}

impl MatchEvent {
    /// The seat whose own action the event confirms, if any.
    ///
    /// Draws are dealt by the server rather than chosen by a player, so they
    /// have no actor.
    pub fn actor(&self) -> Option<Wind> {
        match self {
            MatchEvent::TileDiscarded { seat, .. } => Some(*seat),
            MatchEvent::Call(call) => Some(call.caller),
            MatchEvent::LocalDraw { .. }
            | MatchEvent::RemoteDraw { .. }
            | MatchEvent::Pass
            | MatchEvent::MatchEnded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalCall {
    pub caller: Wind,
    pub called_from: Wind,
    pub discard: TileId,
    pub winning_call: Call,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_discard() {
        let request = ClientRequest::DiscardTile {
            id: MatchId::new(3),
            player: Wind::East,
            tile: TileId::new(5),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"DiscardTile":{"id":3,"player":"East","tile":5}}"#
        );

        let decoded: ClientRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_event_serialization_unit_variants() {
        assert_eq!(serde_json::to_string(&MatchEvent::Pass).unwrap(), r#""Pass""#);
        assert_eq!(
            serde_json::from_str::<MatchEvent>(r#""MatchEnded""#).unwrap(),
            MatchEvent::MatchEnded
        );
    }

    #[test]
    fn test_event_serialization_call() {
        let event = MatchEvent::Call(FinalCall {
            caller: Wind::South,
            called_from: Wind::East,
            discard: TileId::new(12),
            winning_call: Call::Pon(TileId::new(13), TileId::new(14)),
        });

        let json = serde_json::to_string(&event).unwrap();
        let decoded: MatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.actor(), Some(Wind::South));
    }

    #[test]
    fn test_handshake_serialization() {
        let request = HandshakeRequest {
            client_version: PROTOCOL_VERSION.to_string(),
            credentials: Some(Credentials {
                id: AccountId::new(7),
                token: "abc".to_string(),
            }),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"client_version":"{}","credentials":{{"id":7,"token":"abc"}}}}"#,
                PROTOCOL_VERSION
            )
        );

        let refused: HandshakeResponse = serde_json::from_str(
            r#"{"server_version":"9.9.9","new_credentials":null,"account_data":null}"#,
        )
        .unwrap();
        assert_eq!(refused.account_data, None);
    }

    #[test]
    fn test_unknown_event_kind_is_rejected() {
        assert!(serde_json::from_str::<MatchEvent>(r#"{"Teleport":{"seat":"East"}}"#).is_err());
        assert!(serde_json::from_str::<MatchEvent>("not json").is_err());
    }

    #[test]
    fn test_draws_have_no_actor() {
        assert_eq!(MatchEvent::LocalDraw { tile: TileId::new(0) }.actor(), None);
        assert_eq!(MatchEvent::RemoteDraw { seat: Wind::West }.actor(), None);
        assert_eq!(
            MatchEvent::TileDiscarded {
                seat: Wind::West,
                tile: TileId::new(0)
            }
            .actor(),
            Some(Wind::West)
        );
    }
}
