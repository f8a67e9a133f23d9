use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::hand::{Call, Hand, HandError};
use shared::local_state::LocalState;
use shared::match_state::{MatchId, MatchState, TurnState};
use shared::messages::{ClientRequest, MatchEvent};
use shared::tile::{generate_tileset, TileId, TileInstance, Wind};
use shared::ActionError;
use thiserror::Error;

/// A client request the match could not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("a match is already running on this connection")]
    AlreadyStarted,

    #[error("no match has been started on this connection")]
    NotStarted,

    #[error("request is for match {}, not {}", .got.raw(), .expected.raw())]
    WrongMatch { expected: MatchId, got: MatchId },

    #[error("request is for {0:?}, but the client plays {1:?}")]
    WrongSeat(Wind, Wind),

    #[error(transparent)]
    Rule(#[from] ActionError),
}

/// Authoritative state of one match between a remote client and three
/// computer-controlled seats.
///
/// The client always plays East. Everything the other seats do happens inside
/// [`MatchController::handle_request`], so the controller only ever rests at a
/// point where the client has to act.
#[derive(Debug, Clone)]
pub struct MatchController {
    state: MatchState,
    client_seat: Wind,
}

impl MatchController {
    pub fn new<R: Rng + ?Sized>(id: MatchId, rng: &mut R) -> Result<Self, ActionError> {
        let mut tiles = generate_tileset();
        tiles.shuffle(rng);
        Self::with_tiles(id, tiles)
    }

    /// Deals `tiles` in order and draws East's first tile.
    pub fn with_tiles(id: MatchId, tiles: Vec<TileInstance>) -> Result<Self, ActionError> {
        let client_seat = Wind::East;
        let mut state = MatchState::new(id, tiles)?;
        state.draw_for_player(client_seat)?;

        info!("Match {} dealt, {} tiles in the wall", id.raw(), state.wall_remaining());

        Ok(Self { state, client_seat })
    }

    pub fn id(&self) -> MatchId {
        self.state.id
    }

    pub fn client_seat(&self) -> Wind {
        self.client_seat
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_ended()
    }

    pub fn snapshot(&self) -> LocalState {
        self.state.local_state_for_player(self.client_seat)
    }

    /// Applies a request from the client and plays the other seats until the
    /// client has to act again or the match ends.
    ///
    /// Returns the events for the client, in the order they happened.
    pub fn handle_request(&mut self, request: ClientRequest) -> Result<Vec<MatchEvent>, RequestError> {
        let mut events = Vec::new();

        match request {
            ClientRequest::StartMatch => return Err(RequestError::AlreadyStarted),

            ClientRequest::DiscardTile { id, player, tile } => {
                self.check_sender(id, player)?;
                self.state.discard_tile(player, tile)?;
                events.push(MatchEvent::TileDiscarded { seat: player, tile });
            }

            ClientRequest::Call { id, player, call } => {
                self.check_sender(id, player)?;
                self.state.call_tile(player, Some(call))?;
            }

            ClientRequest::Pass { id, player } => {
                self.check_sender(id, player)?;
                self.state.call_tile(player, None)?;
            }
        }

        self.advance(&mut events)?;
        Ok(events)
    }

    fn check_sender(&self, id: MatchId, player: Wind) -> Result<(), RequestError> {
        if id != self.state.id {
            return Err(RequestError::WrongMatch {
                expected: self.state.id,
                got: id,
            });
        }
        if player != self.client_seat {
            return Err(RequestError::WrongSeat(player, self.client_seat));
        }
        Ok(())
    }

    fn advance(&mut self, events: &mut Vec<MatchEvent>) -> Result<(), ActionError> {
        loop {
            match self.state.turn_state.clone() {
                TurnState::AwaitingDraw(seat) => {
                    if self.state.wall_remaining() == 0 {
                        info!("Match {} ended, wall exhausted", self.state.id.raw());
                        self.state.end_match(None);
                        events.push(MatchEvent::MatchEnded);
                        return Ok(());
                    }

                    let tile = self.state.draw_for_player(seat)?;
                    events.push(if seat == self.client_seat {
                        MatchEvent::LocalDraw { tile }
                    } else {
                        MatchEvent::RemoteDraw { seat }
                    });
                }

                TurnState::AwaitingDiscard(seat) => {
                    if seat == self.client_seat {
                        return Ok(());
                    }

                    let tile = cpu_discard(self.state.player(seat))
                        .ok_or(HandError::NoDraw)?;
                    self.state.discard_tile(seat, tile)?;
                    debug!("{:?} discards {}", seat, tile.raw());
                    events.push(MatchEvent::TileDiscarded { seat, tile });
                }

                TurnState::AwaitingCalls { waiting, .. } => {
                    if waiting.contains_key(&self.client_seat) {
                        return Ok(());
                    }

                    for (seat, offered) in waiting {
                        let call = offered.contains(&Call::Ron).then_some(Call::Ron);
                        self.state.call_tile(seat, call)?;
                    }

                    match self.state.decide_call()? {
                        Some(call) => {
                            debug!("{:?} calls {:?}", call.caller, call.winning_call);
                            events.push(MatchEvent::Call(call));
                        }
                        None => events.push(MatchEvent::Pass),
                    }
                }

                TurnState::MatchEnded { winner } => {
                    info!("Match {} ended, winner {:?}", self.state.id.raw(), winner);
                    events.push(MatchEvent::MatchEnded);
                    return Ok(());
                }
            }
        }
    }
}

/// Computer seats throw away whatever they just drew.
fn cpu_discard(hand: &Hand) -> Option<TileId> {
    hand.current_draw()
        .or_else(|| hand.tiles().first())
        .map(|tile| tile.id)
}
