use crate::logic::board::Side;
use serde::{Deserialize, Serialize};

/// Piece ranks. The discriminant is the canonical ordering key used when
/// composing compound moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    King = 1,
    Prince = 2,
    Duke = 3,
    Knight = 4,
    Sergeant = 5,
    Pikemen = 6,
    Squire = 7,
    Archer = 8,
}

impl Rank {
    pub const ALL: [Self; 8] = [
        Self::King,
        Self::Prince,
        Self::Duke,
        Self::Knight,
        Self::Sergeant,
        Self::Pikemen,
        Self::Squire,
        Self::Archer,
    ];

    pub const fn index(self) -> usize {
        self as usize - 1
    }

    #[must_use]
    pub const fn is_royal(self) -> bool {
        matches!(self, Self::King | Self::Prince | Self::Duke)
    }

    /// Number of pieces of this rank in a full army.
    #[must_use]
    pub const fn full_count(self) -> u8 {
        match self {
            Self::Knight | Self::Sergeant => 2,
            Self::Pikemen => 4,
            _ => 1,
        }
    }

    #[must_use]
    pub fn rules(self) -> &'static RankRules {
        &RANK_RULES[self.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    /// Walk outward along each direction until blocked or out of reach.
    Ray,
    /// Jump to each offset; no intermediate cells are visited.
    Leap,
}

/// Data-driven movement descriptor shared by every rank.
#[derive(Debug)]
pub struct RankRules {
    pub motion: Motion,
    pub directions: &'static [(i8, i8)],
    pub orthogonal_reach: u8,
    pub diagonal_reach: u8,
    /// Mounted ranks cannot enter rough terrain.
    pub blocked_by_rough: bool,
    /// Whether the rank may ever enter a castle interior.
    pub enters_interior: bool,
    /// Archers keep going after a castle green or a capture.
    pub passes_through: bool,
}

impl RankRules {
    #[must_use]
    pub const fn reach(&self, direction: (i8, i8)) -> u8 {
        if direction.0 != 0 && direction.1 != 0 {
            self.diagonal_reach
        } else {
            self.orthogonal_reach
        }
    }
}

pub const ALL_DIRECTIONS: [(i8, i8); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

pub const SQUIRE_JUMPS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, 2),
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
];

/// Longest ray any rank may travel.
pub const MAX_REACH: u8 = 12;

const fn ray(
    directions: &'static [(i8, i8)],
    orthogonal_reach: u8,
    diagonal_reach: u8,
    mounted: bool,
) -> RankRules {
    RankRules {
        motion: Motion::Ray,
        directions,
        orthogonal_reach,
        diagonal_reach,
        blocked_by_rough: mounted,
        enters_interior: true,
        passes_through: false,
    }
}

static RANK_RULES: [RankRules; 8] = [
    // King
    ray(&ALL_DIRECTIONS, 2, 2, false),
    // Prince
    ray(&ALL_DIRECTIONS, MAX_REACH, MAX_REACH, true),
    // Duke
    ray(&ALL_DIRECTIONS, MAX_REACH, MAX_REACH, true),
    // Knight
    ray(&ALL_DIRECTIONS, MAX_REACH, MAX_REACH, true),
    // Sergeant: long diagonals, single orthogonal step
    ray(&ALL_DIRECTIONS, 1, MAX_REACH, false),
    // Pikemen: long orthogonals, single diagonal step
    ray(&ALL_DIRECTIONS, MAX_REACH, 1, false),
    // Squire
    RankRules {
        motion: Motion::Leap,
        directions: &SQUIRE_JUMPS,
        orthogonal_reach: 1,
        diagonal_reach: 1,
        blocked_by_rough: false,
        enters_interior: true,
        passes_through: false,
    },
    // Archer
    RankRules {
        motion: Motion::Ray,
        directions: &ALL_DIRECTIONS,
        orthogonal_reach: 3,
        diagonal_reach: 3,
        blocked_by_rough: false,
        enters_interior: false,
        passes_through: true,
    },
];

/// A piece as stored on the board. Its location is the key it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub rank: Rank,
    pub side: Side,
    /// Distinguishes pieces of multi-instance ranks; 0 for single ranks.
    pub instance: u8,
}

impl Piece {
    #[must_use]
    pub const fn new(rank: Rank, side: Side, instance: u8) -> Self {
        Self {
            rank,
            side,
            instance,
        }
    }
}

/// Per-rank piece counts for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankCounts([u8; 8]);

impl RankCounts {
    #[must_use]
    pub const fn get(&self, rank: Rank) -> u8 {
        self.0[rank.index()]
    }

    pub(crate) fn increment(&mut self, rank: Rank) {
        self.0[rank.index()] += 1;
    }

    pub(crate) fn decrement(&mut self, rank: Rank) {
        self.0[rank.index()] -= 1;
    }

    #[must_use]
    pub fn royalty(&self) -> u8 {
        self.get(Rank::King) + self.get(Rank::Prince) + self.get(Rank::Duke)
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.0.iter().map(|&c| u32::from(c)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, u8)> + '_ {
        Rank::ALL.iter().map(move |&rank| (rank, self.get(rank)))
    }
}
