use crate::accounts::{AccountRegistry, HandshakeRejection};
use crate::game::{MatchController, RequestError};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::match_state::MatchId;
use shared::messages::{ClientRequest, HandshakeRequest, StartMatchResponse};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:3030";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: String,
    /// Seeds every deal when set, so matches can be replayed.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            seed: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    Socket(#[from] tungstenite::Error),

    #[error("malformed request: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handshake refused: {0}")]
    Handshake(#[from] HandshakeRejection),

    #[error(transparent)]
    Request(#[from] RequestError),
}

type Source = futures::stream::SplitStream<WebSocketStream<TcpStream>>;

/// WebSocket match server. Every connection plays its own match.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    accounts: Arc<Mutex<AccountRegistry>>,
    next_match: u32,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config,
            accounts: Arc::new(Mutex::new(AccountRegistry::new())),
            next_match: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel` fires. Cancelling also ends every
    /// match still being played.
    pub async fn run(mut self, cancel: CancellationToken) -> io::Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Server shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let id = MatchId::new(self.next_match);
                        self.next_match = self.next_match.wrapping_add(1);

                        let rng = match self.config.seed {
                            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(id.raw()))),
                            None => StdRng::from_entropy(),
                        };

                        info!("Client connected from {}", addr);
                        let connection = Connection {
                            addr,
                            id,
                            rng,
                            accounts: self.accounts.clone(),
                            cancel: cancel.child_token(),
                        };
                        tokio::spawn(connection.handle(stream));
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }
}

/// Everything one connection needs besides its socket.
struct Connection {
    addr: SocketAddr,
    id: MatchId,
    rng: StdRng,
    accounts: Arc<Mutex<AccountRegistry>>,
    cancel: CancellationToken,
}

impl Connection {
    async fn handle(mut self, stream: TcpStream) {
        let addr = self.addr;
        match self.serve(stream).await {
            Ok(()) => info!("Client {} disconnected", addr),
            Err(e) => warn!("Connection to {} closed: {}", addr, e),
        }
    }

    /// Runs the handshake and then one match over `stream`. A refused
    /// handshake or a rejected request closes the connection.
    async fn serve(&mut self, stream: TcpStream) -> Result<(), ConnectionError> {
        let socket = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut source) = socket.split();

        let Some(text) = self.next_text(&mut source).await? else {
            return Ok(());
        };
        let outcome = match serde_json::from_str::<HandshakeRequest>(&text) {
            Ok(request) => self.accounts.lock().await.handshake(&request, &mut self.rng),
            Err(e) => {
                let _ = sink.send(Message::Close(None)).await;
                return Err(e.into());
            }
        };

        let response = match &outcome {
            Ok(response) => response.clone(),
            Err(rejection) => rejection.response(),
        };
        sink.send(Message::Text(serde_json::to_string(&response)?)).await?;
        if let Err(rejection) = outcome {
            let _ = sink.send(Message::Close(None)).await;
            return Err(rejection.into());
        }
        info!("Handshake with {} complete", self.addr);

        let mut controller: Option<MatchController> = None;
        while let Some(text) = self.next_text(&mut source).await? {
            let outgoing = match respond(&mut controller, &text, self.id, &mut self.rng) {
                Ok(outgoing) => outgoing,
                Err(e) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Err(e);
                }
            };

            for text in outgoing {
                sink.send(Message::Text(text)).await?;
            }
        }

        let _ = sink.send(Message::Close(None)).await;
        Ok(())
    }

    /// Next text frame, or `None` once the peer closes or the server shuts
    /// down.
    async fn next_text(&self, source: &mut Source) -> Result<Option<String>, ConnectionError> {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                message = source.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Answers one client message with the messages to send back, in order.
fn respond(
    controller: &mut Option<MatchController>,
    text: &str,
    id: MatchId,
    rng: &mut StdRng,
) -> Result<Vec<String>, ConnectionError> {
    let request: ClientRequest = serde_json::from_str(text)?;
    debug!("Received {:?}", request);

    match controller {
        Some(running) => running
            .handle_request(request)?
            .iter()
            .map(|event| serde_json::to_string(event).map_err(ConnectionError::from))
            .collect(),

        None if request == ClientRequest::StartMatch => {
            let started = MatchController::new(id, rng).map_err(RequestError::from)?;
            let response = StartMatchResponse {
                state: started.snapshot(),
            };
            *controller = Some(started);
            Ok(vec![serde_json::to_string(&response)?])
        }

        None => Err(RequestError::NotStarted.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::messages::MatchEvent;
    use shared::tile::Wind;

    #[test]
    fn test_start_match_answers_with_snapshot() {
        let mut controller = None;
        let mut rng = StdRng::seed_from_u64(1);

        let replies = respond(&mut controller, r#""StartMatch""#, MatchId::new(5), &mut rng).unwrap();
        assert_eq!(replies.len(), 1);

        let response: StartMatchResponse = serde_json::from_str(&replies[0]).unwrap();
        assert_eq!(response.state.id, MatchId::new(5));
        assert_eq!(response.state.seat, Wind::East);
        assert!(controller.is_some());
    }

    #[test]
    fn test_requests_before_start_are_rejected() {
        let mut controller = None;
        let mut rng = StdRng::seed_from_u64(1);

        let result = respond(
            &mut controller,
            r#"{"Pass":{"id":5,"player":"East"}}"#,
            MatchId::new(5),
            &mut rng,
        );
        assert!(matches!(
            result,
            Err(ConnectionError::Request(RequestError::NotStarted))
        ));
    }

    #[test]
    fn test_discard_answers_with_events() {
        let mut controller = None;
        let mut rng = StdRng::seed_from_u64(1);
        respond(&mut controller, r#""StartMatch""#, MatchId::new(5), &mut rng).unwrap();

        let tile = controller
            .as_ref()
            .and_then(|running| running.state().player(Wind::East).current_draw().copied())
            .unwrap()
            .id;
        let request = serde_json::to_string(&ClientRequest::DiscardTile {
            id: MatchId::new(5),
            player: Wind::East,
            tile,
        })
        .unwrap();

        let replies = respond(&mut controller, &request, MatchId::new(5), &mut rng).unwrap();
        let first: MatchEvent = serde_json::from_str(&replies[0]).unwrap();
        assert_eq!(
            first,
            MatchEvent::TileDiscarded {
                seat: Wind::East,
                tile
            }
        );
    }

    #[test]
    fn test_malformed_request_is_rejected() {
        let mut controller = None;
        let mut rng = StdRng::seed_from_u64(1);

        let result = respond(&mut controller, "not json", MatchId::new(5), &mut rng);
        assert!(matches!(result, Err(ConnectionError::Json(..))));
    }
}
