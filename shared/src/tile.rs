//! Tile values, seat winds and the physical tile set used by a match.

use serde::{Deserialize, Serialize};

/// Number of physical tiles in a set: 4 copies of 34 distinct faces.
pub const TILE_COUNT: usize = 136;

const SIMPLE_TILES: u8 = 108;
const DRAGON_TILES: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    Coins,
    Bamboo,
    Characters,
}

impl Suit {
    pub const ALL: [Suit; 3] = [Suit::Coins, Suit::Bamboo, Suit::Characters];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Wind {
    East,
    South,
    West,
    North,
}

impl Wind {
    /// Seat winds in turn order, starting from the dealer.
    pub const ALL: [Wind; 4] = [Wind::East, Wind::South, Wind::West, Wind::North];

    /// Returns the next wind in turn order, wrapping North back around to East.
    ///
    /// ```
    /// use shared::tile::Wind;
    ///
    /// assert_eq!(Wind::East.next(), Wind::South);
    /// assert_eq!(Wind::North.next(), Wind::East);
    /// ```
    pub fn next(self) -> Self {
        match self {
            Wind::East => Wind::South,
            Wind::South => Wind::West,
            Wind::West => Wind::North,
            Wind::North => Wind::East,
        }
    }

    /// Turn distance from `self` to `other`, e.g. East to North is 3.
    ///
    /// ```
    /// use shared::tile::Wind::*;
    ///
    /// assert_eq!(East.distance_to(North), 3);
    /// assert_eq!(North.distance_to(East), 1);
    /// ```
    pub fn distance_to(self, other: Self) -> u8 {
        (other.index() as u8 + 4 - self.index() as u8) % 4
    }

    /// Position of the seat in `Wind::ALL`, used to index per-seat arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dragon {
    White,
    Green,
    Red,
}

impl Dragon {
    pub const ALL: [Dragon; 3] = [Dragon::White, Dragon::Green, Dragon::Red];

    pub fn next(self) -> Self {
        match self {
            Dragon::White => Dragon::Green,
            Dragon::Green => Dragon::Red,
            Dragon::Red => Dragon::White,
        }
    }
}

/// A numbered tile. Field order matters: tiles sort by suit first so that
/// sequences end up adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimpleTile {
    pub suit: Suit,
    pub number: u8,
}

impl SimpleTile {
    pub const fn new(suit: Suit, number: u8) -> Self {
        Self { suit, number }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tile {
    Simple(SimpleTile),
    Wind(Wind),
    Dragon(Dragon),
}

impl Tile {
    pub fn is_honor(self) -> bool {
        !matches!(self, Tile::Simple(..))
    }

    pub fn as_simple(self) -> Option<SimpleTile> {
        match self {
            Tile::Simple(simple) => Some(simple),
            Tile::Wind(..) | Tile::Dragon(..) => None,
        }
    }
}

impl From<SimpleTile> for Tile {
    fn from(tile: SimpleTile) -> Self {
        Tile::Simple(tile)
    }
}

impl From<Wind> for Tile {
    fn from(wind: Wind) -> Self {
        Tile::Wind(wind)
    }
}

impl From<Dragon> for Tile {
    fn from(dragon: Dragon) -> Self {
        Tile::Dragon(dragon)
    }
}

/// Unique identifier for one physical tile within a match.
///
/// There are four copies of every face, so the face alone can't say which copy
/// left a hand. Ids are assigned in `generate_tileset` order and always map to
/// the same face: simples first (suit by suit, four copies per number), then
/// dragons, then winds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId(u8);

impl TileId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Looks up the face for this id, or `None` if the id is outside the set.
    pub fn tile(self) -> Option<Tile> {
        let id = self.0;
        if id < SIMPLE_TILES {
            let suit = Suit::ALL[usize::from(id / 36)];
            let number = (id % 36) / 4 + 1;
            Some(Tile::Simple(SimpleTile::new(suit, number)))
        } else if id < SIMPLE_TILES + DRAGON_TILES {
            Some(Tile::Dragon(Dragon::ALL[usize::from((id - SIMPLE_TILES) / 4)]))
        } else if usize::from(id) < TILE_COUNT {
            let offset = id - SIMPLE_TILES - DRAGON_TILES;
            Some(Tile::Wind(Wind::ALL[usize::from(offset / 4)]))
        } else {
            None
        }
    }

    pub fn instance(self) -> Option<TileInstance> {
        self.tile().map(|tile| TileInstance { id: self, tile })
    }
}

/// A tile id paired with its face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileInstance {
    pub id: TileId,
    pub tile: Tile,
}

impl TileInstance {
    pub fn new<T: Into<Tile>>(tile: T, id: TileId) -> Self {
        Self {
            id,
            tile: tile.into(),
        }
    }
}

/// Builds the full, unshuffled tile set in id order.
pub fn generate_tileset() -> Vec<TileInstance> {
    (0..TILE_COUNT as u8)
        .filter_map(|id| TileId::new(id).instance())
        .collect()
}

/// Determines if the given tiles form a chow, i.e. a same-suit sequence of
/// simples in any order.
pub fn is_chow<T, U, V>(first: T, second: U, third: V) -> bool
where
    T: Into<Tile>,
    U: Into<Tile>,
    V: Into<Tile>,
{
    let tiles = [first.into(), second.into(), third.into()];
    let mut simples = Vec::with_capacity(3);
    for tile in tiles {
        match tile.as_simple() {
            Some(simple) => simples.push(simple),
            None => return false,
        }
    }

    if simples.iter().any(|tile| tile.suit != simples[0].suit) {
        return false;
    }

    let mut numbers: Vec<u8> = simples.iter().map(|tile| tile.number).collect();
    numbers.sort_unstable();
    numbers[1] == numbers[0] + 1 && numbers[2] == numbers[1] + 1
}
