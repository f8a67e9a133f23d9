use crate::tile::{self, Tile, TileId, TileInstance, Wind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Number of concealed tiles a player holds while waiting for their turn.
pub const HAND_SIZE: usize = 13;

/// A call on another player's discard.
///
/// Each variant names the tiles from the caller's own hand that complete the
/// meld, so both peers agree on exactly which copies leave the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Call {
    Chii(TileId, TileId),
    Pon(TileId, TileId),
    Kan(TileId, TileId, TileId),
    Ron,
}

impl Call {
    /// Claim priority: Ron beats Kan and Pon, which beat Chii.
    pub fn priority(self) -> u8 {
        match self {
            Call::Ron => 3,
            Call::Kan(..) | Call::Pon(..) => 2,
            Call::Chii(..) => 1,
        }
    }

    /// Tiles the call takes out of the caller's concealed hand.
    pub fn consumed(self) -> Vec<TileId> {
        match self {
            Call::Chii(a, b) | Call::Pon(a, b) => vec![a, b],
            Call::Kan(a, b, c) => vec![a, b, c],
            Call::Ron => Vec::new(),
        }
    }
}

/// Orders two competing calls on the same discard; the greater call wins.
///
/// Ties on priority go to the seat closest to the discarder in turn order.
pub fn compare_calls(
    left_seat: Wind,
    left_call: Call,
    right_seat: Wind,
    right_call: Call,
    discarding_player: Wind,
) -> Ordering {
    left_call
        .priority()
        .cmp(&right_call.priority())
        .then_with(|| {
            let left_distance = discarding_player.distance_to(left_seat);
            let right_distance = discarding_player.distance_to(right_seat);
            right_distance.cmp(&left_distance)
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeldKind {
    Chii,
    Pon,
    Kan,
}

/// An open meld formed by calling a discard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    pub kind: MeldKind,
    pub tiles: Vec<TileInstance>,
}

impl Meld {
    /// Builds the meld a call produces, or `None` for Ron which completes the
    /// hand instead.
    pub fn for_call(call: Call, discard: TileInstance) -> Option<Result<Meld, HandError>> {
        let kind = match call {
            Call::Chii(..) => MeldKind::Chii,
            Call::Pon(..) => MeldKind::Pon,
            Call::Kan(..) => MeldKind::Kan,
            Call::Ron => return None,
        };

        let mut tiles = Vec::with_capacity(4);
        for id in call.consumed() {
            match id.instance() {
                Some(instance) => tiles.push(instance),
                None => return Some(Err(HandError::InvalidMeld(call))),
            }
        }
        tiles.push(discard);

        let valid = match kind {
            MeldKind::Chii => is_chow_meld(&tiles),
            MeldKind::Pon | MeldKind::Kan => tiles.iter().all(|t| t.tile == discard.tile),
        };
        if !valid {
            return Some(Err(HandError::InvalidMeld(call)));
        }

        Some(Ok(Meld { kind, tiles }))
    }
}

fn is_chow_meld(tiles: &[TileInstance]) -> bool {
    matches!(tiles, [a, b, c] if tile::is_chow(a.tile, b.tile, c.tile))
}

/// Representation of a player's hand during a match.
///
/// The concealed tiles only ever hold tiles the player may discard; tiles in
/// open melds live in `melds`. A player holds at most one current draw and
/// must discard before drawing again. After a Chii or Pon the player must
/// discard without drawing, tracked by `must_discard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    tiles: Vec<TileInstance>,
    current_draw: Option<TileInstance>,
    melds: Vec<Meld>,
    discards: Vec<TileInstance>,
    must_discard: bool,
}

impl Hand {
    pub fn new<T: Into<Vec<TileInstance>>>(starting_tiles: T) -> Result<Self, HandError> {
        let tiles = starting_tiles.into();
        if tiles.len() != HAND_SIZE {
            return Err(HandError::WrongNumberOfTiles(tiles.len()));
        }

        Ok(Hand {
            tiles,
            current_draw: None,
            melds: Vec::new(),
            discards: Vec::new(),
            must_discard: false,
        })
    }

    pub fn draw_tile(&mut self, tile: TileInstance) -> Result<(), HandError> {
        if self.current_draw.is_some() || self.must_discard {
            return Err(HandError::AlreadyDrawn);
        }

        self.current_draw = Some(tile);
        Ok(())
    }

    /// Discards a tile from the concealed hand or the current draw.
    ///
    /// If the player discards from their hand, the current draw joins the hand.
    pub fn discard_tile(&mut self, id: TileId) -> Result<(), HandError> {
        if self.current_draw.is_none() && !self.must_discard {
            return Err(HandError::NoDraw);
        }

        let tile = if let Some(index) = self.tiles.iter().position(|tile| tile.id == id) {
            self.tiles.remove(index)
        } else {
            match self.current_draw {
                Some(draw) if draw.id == id => {
                    self.current_draw = None;
                    draw
                }
                _ => return Err(HandError::NotInHand(id)),
            }
        };

        self.discards.push(tile);
        if let Some(draw) = self.current_draw.take() {
            self.tiles.push(draw);
        }
        self.must_discard = false;

        Ok(())
    }

    /// Lists every call this hand could make on `discard`.
    ///
    /// `can_chii` should only be set for the seat directly after the
    /// discarder. For each call kind the first matching copies are offered.
    pub fn find_possible_calls(&self, discard: TileInstance, can_chii: bool) -> Vec<Call> {
        let mut calls = Vec::new();

        if self.is_winning_with(discard.tile) {
            calls.push(Call::Ron);
        }

        let matching: Vec<TileId> = self
            .tiles
            .iter()
            .filter(|tile| tile.tile == discard.tile)
            .map(|tile| tile.id)
            .collect();
        if let &[a, b, c, ..] = matching.as_slice() {
            calls.push(Call::Kan(a, b, c));
        }
        if let &[a, b, ..] = matching.as_slice() {
            calls.push(Call::Pon(a, b));
        }

        if let (true, Some(simple)) = (can_chii, discard.tile.as_simple()) {
            let number = simple.number as i8;
            for (low, high) in [(-2, -1), (-1, 1), (1, 2)] {
                let first = self.find_simple(simple.suit, number + low);
                let second = self.find_simple(simple.suit, number + high);
                if let (Some(first), Some(second)) = (first, second) {
                    calls.push(Call::Chii(first, second));
                }
            }
        }

        calls
    }

    fn find_simple(&self, suit: tile::Suit, number: i8) -> Option<TileId> {
        if !(1..=9).contains(&number) {
            return None;
        }
        let target = Tile::Simple(tile::SimpleTile::new(suit, number as u8));
        self.tiles
            .iter()
            .find(|tile| tile.tile == target)
            .map(|tile| tile.id)
    }

    /// Claims `discard` with `call`, moving the consumed tiles into a meld.
    ///
    /// Ron adds the discard to the concealed tiles, completing the hand.
    pub fn call_tile(&mut self, discard: TileInstance, call: Call) -> Result<(), HandError> {
        if self.current_draw.is_some() || self.must_discard {
            return Err(HandError::AlreadyDrawn);
        }

        let meld = match Meld::for_call(call, discard) {
            Some(meld) => meld?,
            None => {
                if !self.is_winning_with(discard.tile) {
                    return Err(HandError::NotWinning);
                }
                self.tiles.push(discard);
                return Ok(());
            }
        };

        let consumed = call.consumed();
        let mut remaining = self.tiles.clone();
        for id in &consumed {
            match remaining.iter().position(|tile| tile.id == *id) {
                Some(index) => {
                    remaining.remove(index);
                }
                None => return Err(HandError::NotInHand(*id)),
            }
        }

        self.tiles = remaining;
        self.must_discard = meld.kind != MeldKind::Kan;
        self.melds.push(meld);
        Ok(())
    }

    /// Removes the most recent discard so another player can claim it.
    pub fn take_last_discard(&mut self) -> Option<TileInstance> {
        self.discards.pop()
    }

    /// Whether the concealed tiles plus `tile` form a complete hand.
    pub fn is_winning_with(&self, tile: Tile) -> bool {
        let mut tiles: Vec<Tile> = self.tiles.iter().map(|instance| instance.tile).collect();
        tiles.push(tile);
        is_complete(tiles, 4usize.saturating_sub(self.melds.len()))
    }

    pub fn tiles(&self) -> &[TileInstance] {
        &self.tiles
    }

    pub fn current_draw(&self) -> Option<&TileInstance> {
        self.current_draw.as_ref()
    }

    pub fn melds(&self) -> &[Meld] {
        &self.melds
    }

    pub fn discards(&self) -> &[TileInstance] {
        &self.discards
    }

    pub fn must_discard(&self) -> bool {
        self.must_discard
    }

    /// Concealed tiles including the current draw.
    pub fn concealed_count(&self) -> usize {
        self.tiles.len() + usize::from(self.current_draw.is_some())
    }

    /// What another seat is allowed to know about this hand.
    pub fn to_remote(&self) -> RemoteHand {
        RemoteHand {
            concealed: self.concealed_count(),
            melds: self.melds.clone(),
            discards: self.discards.clone(),
            must_discard: self.must_discard,
        }
    }
}

/// Checks whether `tiles` split into `sets` pungs/chows plus one pair.
fn is_complete(mut tiles: Vec<Tile>, sets: usize) -> bool {
    if tiles.len() != sets * 3 + 2 {
        return false;
    }
    tiles.sort_unstable();

    let mut candidates = tiles.clone();
    candidates.dedup();
    candidates.into_iter().any(|pair| {
        let mut rest = tiles.clone();
        remove_n(&mut rest, pair, 2) && forms_sets(rest)
    })
}

fn forms_sets(tiles: Vec<Tile>) -> bool {
    let Some(&first) = tiles.first() else {
        return true;
    };

    let mut pung = tiles.clone();
    if remove_n(&mut pung, first, 3) && forms_sets(pung) {
        return true;
    }

    let Some(simple) = first.as_simple() else {
        return false;
    };
    if simple.number > 7 {
        return false;
    }
    let mut chow = tiles;
    for offset in 0..3 {
        let next = Tile::Simple(tile::SimpleTile::new(simple.suit, simple.number + offset));
        if !remove_n(&mut chow, next, 1) {
            return false;
        }
    }
    forms_sets(chow)
}

fn remove_n(tiles: &mut Vec<Tile>, tile: Tile, count: usize) -> bool {
    for _ in 0..count {
        match tiles.iter().position(|candidate| *candidate == tile) {
            Some(index) => {
                tiles.remove(index);
            }
            None => return false,
        }
    }
    true
}

/// Another seat's hand as seen by a client: concealed tiles are only counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHand {
    pub concealed: usize,
    pub melds: Vec<Meld>,
    pub discards: Vec<TileInstance>,
    pub must_discard: bool,
}

impl RemoteHand {
    pub fn draw(&mut self) {
        self.concealed += 1;
    }

    pub fn discard(&mut self, tile: TileInstance) -> Result<(), HandError> {
        if self.concealed == 0 {
            return Err(HandError::NotInHand(tile.id));
        }
        self.concealed -= 1;
        self.must_discard = false;
        self.discards.push(tile);
        Ok(())
    }

    pub fn call_tile(&mut self, discard: TileInstance, call: Call) -> Result<(), HandError> {
        let consumed = call.consumed().len();
        if self.concealed < consumed {
            return Err(HandError::InvalidMeld(call));
        }

        match Meld::for_call(call, discard) {
            Some(meld) => {
                let meld = meld?;
                self.must_discard = meld.kind != MeldKind::Kan;
                self.melds.push(meld);
                self.concealed -= consumed;
            }
            None => self.concealed += 1,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum HandError {
    #[error("a starting hand needs {HAND_SIZE} tiles, received {0}")]
    WrongNumberOfTiles(usize),

    #[error("the player already has a drawn tile and must discard first")]
    AlreadyDrawn,

    #[error("the player doesn't have a current draw")]
    NoDraw,

    #[error("tile {0:?} is not in the player's concealed hand")]
    NotInHand(TileId),

    #[error("{0:?} does not form a valid meld with the discard")]
    InvalidMeld(Call),

    #[error("the discard does not complete the hand")]
    NotWinning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{generate_tileset, SimpleTile, Suit};

    fn id(raw: u8) -> TileId {
        TileId::new(raw)
    }

    fn instance(raw: u8) -> TileInstance {
        id(raw).instance().unwrap()
    }

    fn hand_of(ids: &[u8]) -> Hand {
        Hand::new(ids.iter().map(|raw| instance(*raw)).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_new_hand_requires_thirteen_tiles() {
        let tiles = generate_tileset();
        assert_eq!(
            Hand::new(tiles[..12].to_vec()),
            Err(HandError::WrongNumberOfTiles(12))
        );
        assert!(Hand::new(tiles[..13].to_vec()).is_ok());
    }

    #[test]
    fn test_discard_from_hand_keeps_draw() {
        let mut hand = hand_of(&(0..13u8).collect::<Vec<u8>>());
        assert_eq!(hand.discard_tile(id(0)), Err(HandError::NoDraw));

        hand.draw_tile(instance(100)).unwrap();
        assert_eq!(hand.draw_tile(instance(101)), Err(HandError::AlreadyDrawn));

        hand.discard_tile(id(5)).unwrap();
        assert_eq!(hand.tiles().len(), 13);
        assert!(hand.current_draw().is_none());
        assert!(hand.tiles().iter().any(|tile| tile.id == id(100)));
        assert_eq!(hand.discards(), &[instance(5)]);
    }

    #[test]
    fn test_discard_unknown_tile_leaves_hand_untouched() {
        let mut hand = hand_of(&(0..13u8).collect::<Vec<u8>>());
        hand.draw_tile(instance(100)).unwrap();
        let before = hand.clone();

        assert_eq!(hand.discard_tile(id(50)), Err(HandError::NotInHand(id(50))));
        assert_eq!(hand, before);
    }

    #[test]
    fn test_finds_pon_kan_and_chii() {
        // Coins 4 x3 (13, 14, 15), coins 5 (16), coins 6 (20), filler honors.
        let hand = hand_of(&[13, 14, 15, 16, 20, 108, 112, 116, 120, 124, 128, 132, 36]);
        let discard = instance(12);

        let calls = hand.find_possible_calls(discard, true);
        assert_eq!(
            calls,
            vec![
                Call::Kan(id(13), id(14), id(15)),
                Call::Pon(id(13), id(14)),
                Call::Chii(id(16), id(20)),
            ]
        );

        let calls = hand.find_possible_calls(discard, false);
        assert!(!calls.iter().any(|call| matches!(call, Call::Chii(..))));
    }

    #[test]
    fn test_pon_forces_discard_without_draw() {
        let mut hand = hand_of(&[13, 14, 15, 16, 20, 108, 112, 116, 120, 124, 128, 132, 36]);
        hand.call_tile(instance(12), Call::Pon(id(13), id(14))).unwrap();

        assert_eq!(hand.tiles().len(), 11);
        assert_eq!(hand.melds().len(), 1);
        assert!(hand.must_discard());
        assert_eq!(hand.draw_tile(instance(0)), Err(HandError::AlreadyDrawn));

        hand.discard_tile(id(108)).unwrap();
        assert!(!hand.must_discard());
        assert_eq!(hand.tiles().len(), 10);
    }

    #[test]
    fn test_invalid_call_is_rejected() {
        let mut hand = hand_of(&[13, 14, 15, 16, 20, 108, 112, 116, 120, 124, 128, 132, 36]);
        let before = hand.clone();

        assert_eq!(
            hand.call_tile(instance(12), Call::Pon(id(13), id(16))),
            Err(HandError::InvalidMeld(Call::Pon(id(13), id(16))))
        );
        assert_eq!(
            hand.call_tile(instance(12), Call::Ron),
            Err(HandError::NotWinning)
        );
        assert_eq!(hand, before);
    }

    #[test]
    fn test_detects_winning_hand() {
        // 123 456 789 coins, 111 bamboo, 9 bamboo waiting on the pair.
        let ids = [0, 4, 8, 12, 16, 20, 24, 28, 32, 36, 37, 38, 68];
        let hand = hand_of(&ids);
        let bamboo_nine = Tile::Simple(SimpleTile::new(Suit::Bamboo, 9));

        assert!(hand.is_winning_with(bamboo_nine));
        assert!(!hand.is_winning_with(Tile::Wind(Wind::East)));
        assert_eq!(hand.find_possible_calls(instance(69), false), vec![Call::Ron]);
    }

    #[test]
    fn test_call_priority() {
        let pon = Call::Pon(id(1), id(2));
        let chii = Call::Chii(id(4), id(8));

        assert_eq!(
            compare_calls(Wind::West, pon, Wind::South, chii, Wind::East),
            Ordering::Greater
        );
        assert_eq!(
            compare_calls(Wind::North, Call::Ron, Wind::South, Call::Ron, Wind::East),
            Ordering::Less
        );
    }

    #[test]
    fn test_remote_hand_tracks_counts() {
        let mut remote = hand_of(&(0..13u8).collect::<Vec<u8>>()).to_remote();
        assert_eq!(remote.concealed, 13);

        remote.draw();
        remote.discard(instance(40)).unwrap();
        assert_eq!(remote.concealed, 13);

        remote
            .call_tile(instance(12), Call::Pon(id(13), id(14)))
            .unwrap();
        assert_eq!(remote.concealed, 11);
        assert!(remote.must_discard);
    }
}
