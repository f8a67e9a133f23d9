//! JSON encoding of requests and decoding of inbound events and snapshots.

use crate::error::ProtocolError;
use shared::local_state::LocalState;
use shared::messages::{
    ClientRequest, HandshakeRequest, HandshakeResponse, MatchEvent, StartMatchResponse,
};

pub fn encode_handshake(request: &HandshakeRequest) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(ProtocolError::Encode)
}

pub fn decode_handshake(text: &str) -> Result<HandshakeResponse, ProtocolError> {
    serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
        kind: "handshake response",
        source,
    })
}

pub fn encode_request(request: &ClientRequest) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(ProtocolError::Encode)
}

pub fn decode_event(text: &str) -> Result<MatchEvent, ProtocolError> {
    serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
        kind: "match event",
        source,
    })
}

/// Decodes the `StartMatch` response into the initial snapshot.
pub fn decode_snapshot(text: &str) -> Result<LocalState, ProtocolError> {
    serde_json::from_str::<StartMatchResponse>(text)
        .map(|response| response.state)
        .map_err(|source| ProtocolError::Malformed {
            kind: "match snapshot",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::tile::{TileId, Wind};

    #[test]
    fn test_decode_event() {
        let event = decode_event(r#"{"TileDiscarded":{"seat":"East","tile":5}}"#).unwrap();
        assert_eq!(
            event,
            MatchEvent::TileDiscarded {
                seat: Wind::East,
                tile: TileId::new(5),
            }
        );
    }

    #[test]
    fn test_malformed_event_names_its_kind() {
        let error = decode_event(r#"{"Shuffle":{}}"#).unwrap_err();
        assert!(matches!(
            error,
            ProtocolError::Malformed {
                kind: "match event",
                ..
            }
        ));

        let error = decode_snapshot(r#""Pass""#).unwrap_err();
        assert!(error.to_string().starts_with("malformed match snapshot"));
    }

    #[test]
    fn test_decode_handshake() {
        let response = decode_handshake(
            r#"{"server_version":"1.0.0","new_credentials":{"id":4,"token":"t"},"account_data":{"points":10}}"#,
        )
        .unwrap();
        assert_eq!(response.server_version, "1.0.0");
        assert_eq!(response.account_data.map(|account| account.points), Some(10));

        let error = decode_handshake(r#""StartMatch""#).unwrap_err();
        assert!(error.to_string().starts_with("malformed handshake response"));
    }

    #[test]
    fn test_encode_start_match() {
        assert_eq!(
            encode_request(&ClientRequest::StartMatch).unwrap(),
            r#""StartMatch""#
        );
    }
}
