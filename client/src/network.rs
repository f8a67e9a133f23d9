use crate::channel::{Inbound, MessageChannel};
use crate::codec;
use crate::config::ClientConfig;
use crate::error::{HandshakeError, IntentError, SessionError, TransportError};
use crate::game::{PhaseWatcher, Progress, TurnSynchronizer};
use crate::input::{InputSource, Intent};
use crate::rules::RuleEngine;
use log::{error, info, warn};
use shared::local_state::LocalState;
use shared::messages::{
    AccountState, ClientRequest, Credentials, HandshakeRequest, PROTOCOL_VERSION,
};
use shared::tile::Wind;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How a session ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    MatchEnded { winner: Option<Wind> },
    Canceled,
}

/// The account a session is logged into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Newly issued credentials, or the ones the session logged in with.
    pub credentials: Option<Credentials>,
    pub state: AccountState,
}

/// One match against the server, from handshake to the end of the match.
pub struct Session<E: RuleEngine = LocalState> {
    config: ClientConfig,
    channel: MessageChannel,
    sync: TurnSynchronizer<E>,
    cancel: CancellationToken,
    account: Account,
}

impl<E: RuleEngine> Session<E> {
    pub async fn connect(config: ClientConfig) -> Result<Self, SessionError> {
        info!("Connecting to {}...", config.server_url);

        let cancel = CancellationToken::new();
        let channel =
            MessageChannel::connect(&config.server_url, config.connect_timeout, cancel.child_token())
                .await?;

        Self::handshake(config, channel, cancel).await
    }

    /// Logs in and requests a match over an open channel, then builds the
    /// mirrors from the snapshot the server answers with.
    ///
    /// The channel is closed if any step fails.
    pub async fn handshake(
        config: ClientConfig,
        channel: MessageChannel,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let (account, snapshot) = match negotiate(&config, &channel).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                error!("Handshake failed: {}", e);
                channel.close();
                return Err(e);
            }
        };

        info!(
            "Joined match {} as {:?} with {} points",
            snapshot.id.raw(),
            snapshot.seat,
            account.state.points
        );
        let sync = TurnSynchronizer::new(snapshot, channel.clone());

        Ok(Session {
            config,
            channel,
            sync,
            cancel,
            account,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Cancelling this token ends [`Session::run`] with [`SessionEnd::Canceled`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn watch_phase(&self) -> PhaseWatcher {
        self.sync.watch_phase()
    }

    pub fn synchronizer(&self) -> &TurnSynchronizer<E> {
        &self.sync
    }

    /// Processes inbound events and polls `input` every frame until the match
    /// ends, the session is canceled or a fatal error occurs.
    ///
    /// The channel is closed when this returns.
    pub async fn run<I: InputSource<E>>(&mut self, input: &mut I) -> Result<SessionEnd, SessionError> {
        let mut frame = interval(self.config.frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut receive = self.channel.receive();
        let result = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Session canceled");
                    break Ok(SessionEnd::Canceled);
                }

                delivery = &mut receive => {
                    match delivery {
                        Ok(Inbound::Message(text)) => match self.sync.handle_message(&text) {
                            Ok(Progress::Continue) => {}
                            Ok(Progress::MatchEnded { winner }) => {
                                break Ok(SessionEnd::MatchEnded { winner });
                            }
                            Err(e) => break Err(e),
                        },
                        Ok(Inbound::Canceled) => {
                            info!("Channel closed, ending session");
                            break Ok(SessionEnd::Canceled);
                        }
                        Err(e) => {
                            error!("Connection lost: {}", e);
                            break Err(e.into());
                        }
                    }
                    receive = self.channel.receive();
                }

                _ = frame.tick() => {
                    if let Err(e) = self.poll_input(input) {
                        break Err(e);
                    }
                }
            }
        };

        self.channel.close();
        result
    }

    fn poll_input<I: InputSource<E>>(&mut self, input: &mut I) -> Result<(), SessionError> {
        if self.sync.is_finished() || self.sync.pending().is_some() {
            return Ok(());
        }

        let phase = self.sync.phase();
        let Some(intent) = input.poll(&phase, self.sync.local_mirror().engine()) else {
            return Ok(());
        };

        let result = match intent {
            Intent::Discard(tile) => self.sync.request_discard(tile),
            Intent::Call(call) => self.sync.request_call(call),
            Intent::Pass => self.sync.request_pass(),
        };

        match result {
            Ok(()) => Ok(()),
            Err(IntentError::Transport(e)) => Err(e.into()),
            Err(IntentError::Protocol(e)) => Err(e.into()),
            Err(e) => {
                warn!("Ignoring {:?}: {}", intent, e);
                Ok(())
            }
        }
    }
}

async fn negotiate(
    config: &ClientConfig,
    channel: &MessageChannel,
) -> Result<(Account, LocalState), SessionError> {
    let request = HandshakeRequest {
        client_version: PROTOCOL_VERSION.to_string(),
        credentials: config.credentials.clone(),
    };
    channel.send(codec::encode_handshake(&request)?)?;

    let response = codec::decode_handshake(&next_message(channel).await?)?;
    if response.server_version != PROTOCOL_VERSION {
        return Err(HandshakeError::VersionMismatch {
            client: PROTOCOL_VERSION.to_string(),
            server: response.server_version,
        }
        .into());
    }
    let state = response.account_data.ok_or(HandshakeError::Refused)?;
    if let Some(credentials) = &response.new_credentials {
        info!("Issued account {}", credentials.id.raw());
    }
    let account = Account {
        credentials: response
            .new_credentials
            .or_else(|| config.credentials.clone()),
        state,
    };

    channel.send(codec::encode_request(&ClientRequest::StartMatch)?)?;
    let snapshot = codec::decode_snapshot(&next_message(channel).await?)?;

    Ok((account, snapshot))
}

async fn next_message(channel: &MessageChannel) -> Result<String, SessionError> {
    match channel.receive().await? {
        Inbound::Message(text) => Ok(text),
        Inbound::Canceled => Err(TransportError::ChannelClosed.into()),
    }
}
