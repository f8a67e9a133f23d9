//! Authoritative match state, owned by the server.

use crate::{
    hand::{compare_calls, Call, Hand},
    local_state::{CallDecision, LocalHand, LocalState, LocalTurnState},
    messages::FinalCall,
    tile::{TileId, TileInstance, Wind},
    ActionError, HAND_SIZE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a match on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(u32);

impl MatchId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    AwaitingDraw(Wind),
    AwaitingDiscard(Wind),

    /// A tile was discarded and the other seats may call it.
    ///
    /// `waiting` holds the seats that still have to decide, along with the
    /// calls they were offered. `calls` holds the decisions made so far.
    AwaitingCalls {
        discarding_player: Wind,
        discard: TileInstance,
        calls: HashMap<Wind, Call>,
        waiting: HashMap<Wind, Vec<Call>>,
    },

    MatchEnded {
        winner: Option<Wind>,
    },
}

#[derive(Debug, Clone)]
pub struct MatchState {
    pub id: MatchId,
    pub players: [Hand; 4],
    pub wall: Vec<TileInstance>,
    pub turn_state: TurnState,
}

impl MatchState {
    /// Deals 13 tiles to each seat from the front of `tiles`, East first. The
    /// rest form the wall, which is drawn from the back.
    pub fn new(id: MatchId, tiles: Vec<TileInstance>) -> Result<Self, ActionError> {
        let mut wall = tiles;
        let deal = |wall: &mut Vec<TileInstance>| -> Result<Hand, ActionError> {
            if wall.len() < HAND_SIZE {
                return Err(ActionError::WallExhausted);
            }
            Ok(Hand::new(wall.drain(..HAND_SIZE).collect::<Vec<_>>())?)
        };

        let players = [
            deal(&mut wall)?,
            deal(&mut wall)?,
            deal(&mut wall)?,
            deal(&mut wall)?,
        ];

        Ok(MatchState {
            id,
            players,
            wall,
            turn_state: TurnState::AwaitingDraw(Wind::East),
        })
    }

    pub fn player(&self, seat: Wind) -> &Hand {
        &self.players[seat.index()]
    }

    pub fn wall_remaining(&self) -> usize {
        self.wall.len()
    }

    /// Draws the next wall tile for `seat` and returns its id.
    pub fn draw_for_player(&mut self, seat: Wind) -> Result<TileId, ActionError> {
        if self.turn_state != TurnState::AwaitingDraw(seat) {
            return Err(ActionError::wrong_turn("draw", &self.turn_state));
        }

        let tile = *self.wall.last().ok_or(ActionError::WallExhausted)?;
        self.players[seat.index()].draw_tile(tile)?;
        self.wall.pop();
        self.turn_state = TurnState::AwaitingDiscard(seat);

        Ok(tile.id)
    }

    /// Discards `tile` from `seat`'s hand and opens the call window.
    ///
    /// Chii is only offered to the seat after the discarder.
    pub fn discard_tile(&mut self, seat: Wind, tile: TileId) -> Result<(), ActionError> {
        if self.turn_state != TurnState::AwaitingDiscard(seat) {
            return Err(ActionError::wrong_turn("discard", &self.turn_state));
        }

        let discard = tile.instance().ok_or(ActionError::UnknownTile(tile))?;
        self.players[seat.index()].discard_tile(tile)?;

        let mut waiting = HashMap::new();
        for other in Wind::ALL.into_iter().filter(|other| *other != seat) {
            let calls = self.players[other.index()].find_possible_calls(discard, other == seat.next());
            if !calls.is_empty() {
                waiting.insert(other, calls);
            }
        }

        self.turn_state = TurnState::AwaitingCalls {
            discarding_player: seat,
            discard,
            calls: HashMap::new(),
            waiting,
        };

        Ok(())
    }

    /// Records `seat`'s decision on the current discard; `None` passes.
    pub fn call_tile(&mut self, seat: Wind, call: Option<Call>) -> Result<(), ActionError> {
        let TurnState::AwaitingCalls { calls, waiting, .. } = &mut self.turn_state else {
            return Err(ActionError::wrong_turn("call", &self.turn_state));
        };

        let offered = waiting.get(&seat).ok_or(ActionError::NotWaiting(seat))?;
        if let Some(call) = call {
            if !offered.contains(&call) {
                return Err(ActionError::InvalidCall { seat, call });
            }
            calls.insert(seat, call);
        }
        waiting.remove(&seat);

        Ok(())
    }

    /// Seats that still have to decide on the current discard.
    pub fn waiting_on(&self) -> Vec<Wind> {
        match &self.turn_state {
            TurnState::AwaitingCalls { waiting, .. } => {
                let mut seats: Vec<Wind> = waiting.keys().copied().collect();
                seats.sort();
                seats
            }
            _ => Vec::new(),
        }
    }

    /// Closes the call window once every seat has decided.
    ///
    /// Returns the winning call, or `None` if every seat passed, in which case
    /// the turn moves to the seat after the discarder.
    pub fn decide_call(&mut self) -> Result<Option<FinalCall>, ActionError> {
        let TurnState::AwaitingCalls {
            discarding_player,
            discard,
            calls,
            waiting,
        } = &self.turn_state
        else {
            return Err(ActionError::wrong_turn("decide calls", &self.turn_state));
        };

        if !waiting.is_empty() {
            let mut seats: Vec<Wind> = waiting.keys().copied().collect();
            seats.sort();
            return Err(ActionError::CallsOutstanding(seats));
        }

        let discarding_player = *discarding_player;
        let discard = *discard;
        let winner = calls
            .iter()
            .max_by(|(left_seat, left), (right_seat, right)| {
                compare_calls(**left_seat, **left, **right_seat, **right, discarding_player)
            })
            .map(|(seat, call)| (*seat, *call));

        let Some((caller, winning_call)) = winner else {
            self.turn_state = TurnState::AwaitingDraw(discarding_player.next());
            return Ok(None);
        };

        let mut discarder_hand = self.players[discarding_player.index()].clone();
        let mut caller_hand = self.players[caller.index()].clone();
        if discarder_hand.take_last_discard() != Some(discard) {
            return Err(ActionError::DiscardMismatch);
        }
        caller_hand.call_tile(discard, winning_call)?;

        self.players[discarding_player.index()] = discarder_hand;
        self.players[caller.index()] = caller_hand;
        self.turn_state = next_turn_after_call(caller, winning_call);

        Ok(Some(FinalCall {
            caller,
            called_from: discarding_player,
            discard: discard.id,
            winning_call,
        }))
    }

    pub fn end_match(&mut self, winner: Option<Wind>) {
        self.turn_state = TurnState::MatchEnded { winner };
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.turn_state, TurnState::MatchEnded { .. })
    }

    /// Builds the snapshot sent to `seat`, hiding the other seats' concealed
    /// tiles.
    pub fn local_state_for_player(&self, seat: Wind) -> LocalState {
        let players = Wind::ALL.map(|wind| {
            let hand = &self.players[wind.index()];
            if wind == seat {
                LocalHand::Local(hand.clone())
            } else {
                LocalHand::Remote(hand.to_remote())
            }
        });

        let turn_state = match &self.turn_state {
            TurnState::AwaitingDraw(wind) => LocalTurnState::AwaitingDraw(*wind),
            TurnState::AwaitingDiscard(wind) => LocalTurnState::AwaitingDiscard(*wind),
            TurnState::AwaitingCalls {
                discarding_player,
                discard,
                calls,
                waiting,
            } => {
                let (calls, decision) = if let Some(offered) = waiting.get(&seat) {
                    (offered.clone(), CallDecision::Undecided)
                } else if let Some(call) = calls.get(&seat) {
                    (vec![*call], CallDecision::Call(*call))
                } else {
                    (Vec::new(), CallDecision::NoCalls)
                };

                LocalTurnState::AwaitingCalls {
                    discarding_player: *discarding_player,
                    discard: *discard,
                    calls,
                    decision,
                }
            }
            TurnState::MatchEnded { winner } => LocalTurnState::MatchEnded { winner: *winner },
        };

        LocalState {
            id: self.id,
            seat,
            players,
            turn_state,
        }
    }
}

/// Ron ends the match, Kan earns a replacement draw, Chii and Pon go straight
/// to a discard.
pub(crate) fn next_turn_after_call<T: From<CallOutcome>>(caller: Wind, call: Call) -> T {
    let outcome = match call {
        Call::Ron => CallOutcome::Won(caller),
        Call::Kan(..) => CallOutcome::Draw(caller),
        Call::Chii(..) | Call::Pon(..) => CallOutcome::Discard(caller),
    };
    T::from(outcome)
}

pub(crate) enum CallOutcome {
    Won(Wind),
    Draw(Wind),
    Discard(Wind),
}

impl From<CallOutcome> for TurnState {
    fn from(outcome: CallOutcome) -> Self {
        match outcome {
            CallOutcome::Won(seat) => TurnState::MatchEnded { winner: Some(seat) },
            CallOutcome::Draw(seat) => TurnState::AwaitingDraw(seat),
            CallOutcome::Discard(seat) => TurnState::AwaitingDiscard(seat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::generate_tileset;

    fn id(raw: u8) -> TileId {
        TileId::new(raw)
    }

    fn new_match() -> MatchState {
        MatchState::new(MatchId::new(1), generate_tileset()).unwrap()
    }

    #[test]
    fn test_deal_from_front_draw_from_back() {
        let mut state = new_match();
        assert_eq!(state.player(Wind::East).tiles()[0].id, id(0));
        assert_eq!(state.player(Wind::South).tiles()[0].id, id(13));
        assert_eq!(state.wall_remaining(), 136 - 52);

        assert_eq!(state.draw_for_player(Wind::East), Ok(id(135)));
        assert_eq!(state.turn_state, TurnState::AwaitingDiscard(Wind::East));
        assert!(state.draw_for_player(Wind::East).is_err());
    }

    #[test]
    fn test_out_of_turn_discard_is_rejected() {
        let mut state = new_match();
        state.draw_for_player(Wind::East).unwrap();

        assert!(matches!(
            state.discard_tile(Wind::South, id(13)),
            Err(ActionError::WrongTurn { .. })
        ));
        assert_eq!(state.turn_state, TurnState::AwaitingDiscard(Wind::East));
    }

    #[test]
    fn test_discard_without_callers_passes_to_next_seat() {
        let mut state = new_match();
        state.draw_for_player(Wind::East).unwrap();
        state.discard_tile(Wind::East, id(5)).unwrap();

        assert!(state.waiting_on().is_empty());
        assert_eq!(state.decide_call(), Ok(None));
        assert_eq!(state.turn_state, TurnState::AwaitingDraw(Wind::South));
    }

    #[test]
    fn test_pon_outranks_chii_and_moves_turn() {
        let mut state = new_match();
        state.draw_for_player(Wind::East).unwrap();
        state.discard_tile(Wind::East, id(12)).unwrap();
        assert_eq!(state.waiting_on(), vec![Wind::South]);

        assert_eq!(
            state.decide_call(),
            Err(ActionError::CallsOutstanding(vec![Wind::South]))
        );
        assert_eq!(
            state.call_tile(Wind::West, None),
            Err(ActionError::NotWaiting(Wind::West))
        );
        assert_eq!(
            state.call_tile(Wind::South, Some(Call::Pon(id(13), id(16)))),
            Err(ActionError::InvalidCall {
                seat: Wind::South,
                call: Call::Pon(id(13), id(16)),
            })
        );

        state
            .call_tile(Wind::South, Some(Call::Pon(id(13), id(14))))
            .unwrap();
        let call = state.decide_call().unwrap().unwrap();

        assert_eq!(
            call,
            FinalCall {
                caller: Wind::South,
                called_from: Wind::East,
                discard: id(12),
                winning_call: Call::Pon(id(13), id(14)),
            }
        );
        assert_eq!(state.turn_state, TurnState::AwaitingDiscard(Wind::South));
        assert!(state.player(Wind::East).discards().is_empty());
        assert_eq!(state.player(Wind::South).melds().len(), 1);
    }

    #[test]
    fn test_snapshot_hides_remote_hands() {
        let mut state = new_match();
        state.draw_for_player(Wind::East).unwrap();

        let snapshot = state.local_state_for_player(Wind::East);
        assert_eq!(snapshot.seat, Wind::East);
        assert_eq!(snapshot.turn_state, LocalTurnState::AwaitingDiscard(Wind::East));
        match &snapshot.players[Wind::East.index()] {
            LocalHand::Local(hand) => assert_eq!(hand.concealed_count(), 14),
            other => panic!("expected local hand, got {other:?}"),
        }
        match &snapshot.players[Wind::South.index()] {
            LocalHand::Remote(hand) => assert_eq!(hand.concealed, 13),
            other => panic!("expected remote hand, got {other:?}"),
        }
    }

    #[test]
    fn test_too_few_tiles_cannot_deal() {
        let tiles = generate_tileset().into_iter().take(40).collect();
        assert!(matches!(
            MatchState::new(MatchId::new(1), tiles),
            Err(ActionError::WallExhausted)
        ));
    }
}
