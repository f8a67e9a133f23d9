//! Local player input, polled once per frame.

use crate::rules::{RuleEngine, TurnPhase};
use shared::hand::Call;
use shared::local_state::LocalState;
use shared::tile::TileId;
use tokio::sync::mpsc;

/// Something the local player wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Discard(TileId),
    Call(Call),
    Pass,
}

/// A source of player intents.
///
/// Only polled while no action is waiting for confirmation.
pub trait InputSource<E: RuleEngine = LocalState> {
    fn poll(&mut self, phase: &TurnPhase, engine: &E) -> Option<Intent>;
}

/// Intents pushed by a presentation layer through an [`IntentSender`].
#[derive(Debug)]
pub struct IntentQueue {
    receiver: mpsc::UnboundedReceiver<Intent>,
}

#[derive(Debug, Clone)]
pub struct IntentSender {
    sender: mpsc::UnboundedSender<Intent>,
}

impl IntentQueue {
    pub fn new() -> (IntentSender, IntentQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (IntentSender { sender }, IntentQueue { receiver })
    }
}

impl IntentSender {
    /// Queues `intent`. Returns false once the session has stopped polling.
    pub fn send(&self, intent: Intent) -> bool {
        self.sender.send(intent).is_ok()
    }
}

impl<E: RuleEngine> InputSource<E> for IntentQueue {
    fn poll(&mut self, _phase: &TurnPhase, _engine: &E) -> Option<Intent> {
        self.receiver.try_recv().ok()
    }
}

/// Headless player: discards whatever it drew, wins when it can and passes on
/// every other call.
#[derive(Debug, Default)]
pub struct AutoPlayer;

impl AutoPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl InputSource<LocalState> for AutoPlayer {
    fn poll(&mut self, phase: &TurnPhase, engine: &LocalState) -> Option<Intent> {
        match phase {
            TurnPhase::AwaitingDiscard { seat } if *seat == engine.local_seat() => {
                let hand = engine.local_hand()?;
                let tile = hand
                    .current_draw()
                    .or_else(|| hand.tiles().first())
                    .map(|tile| tile.id)?;
                Some(Intent::Discard(tile))
            }

            TurnPhase::AwaitingCalls {
                candidate_calls, ..
            } if !candidate_calls.is_empty() => {
                if candidate_calls.contains(&Call::Ron) {
                    Some(Intent::Call(Call::Ron))
                } else {
                    Some(Intent::Pass)
                }
            }

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::match_state::{MatchId, MatchState};
    use shared::tile::{generate_tileset, Wind};

    fn engine(seat: Wind) -> LocalState {
        let mut state = MatchState::new(MatchId::new(1), generate_tileset()).unwrap();
        state.draw_for_player(Wind::East).unwrap();
        state.local_state_for_player(seat)
    }

    #[test]
    fn test_auto_player_discards_its_draw() {
        let east = engine(Wind::East);
        let intent = AutoPlayer::new().poll(&east.current_turn_phase(), &east);
        assert_eq!(intent, Some(Intent::Discard(TileId::new(135))));
    }

    #[test]
    fn test_auto_player_waits_for_other_seats() {
        let south = engine(Wind::South);
        assert_eq!(
            AutoPlayer::new().poll(&south.current_turn_phase(), &south),
            None
        );
    }

    #[test]
    fn test_auto_player_claims_ron() {
        let mut south = engine(Wind::South);
        south.discard_tile(Wind::East, TileId::new(12)).unwrap();

        let intent = AutoPlayer::new().poll(&south.current_turn_phase(), &south);
        assert_eq!(intent, Some(Intent::Call(Call::Ron)));
    }

    #[test]
    fn test_auto_player_passes_without_ron() {
        let phase = TurnPhase::AwaitingCalls {
            seat: Wind::South,
            discarder: Wind::East,
            candidate_calls: vec![Call::Pon(TileId::new(13), TileId::new(14))],
        };
        let south = engine(Wind::South);
        assert_eq!(AutoPlayer::new().poll(&phase, &south), Some(Intent::Pass));
    }

    #[test]
    fn test_intent_queue_preserves_order() {
        let (sender, mut queue) = IntentQueue::new();
        let east = engine(Wind::East);
        let phase = east.current_turn_phase();

        assert!(sender.send(Intent::Discard(TileId::new(5))));
        assert!(sender.send(Intent::Pass));

        assert_eq!(
            queue.poll(&phase, &east),
            Some(Intent::Discard(TileId::new(5)))
        );
        assert_eq!(queue.poll(&phase, &east), Some(Intent::Pass));
        assert_eq!(queue.poll(&phase, &east), None);

        drop(queue);
        assert!(!sender.send(Intent::Pass));
    }
}
