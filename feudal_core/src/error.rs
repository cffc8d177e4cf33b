//! Error types for board mutation, setup and configuration.

use crate::logic::board::{Cell, Side};
use crate::logic::piece::Rank;
use thiserror::Error;

/// Reasons a single relocation can be refused by the board.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("cell {0} is off the board")]
    OutOfBounds(Cell),

    #[error("no piece at source cell {0}")]
    NoPieceAtSource(Cell),

    #[error("piece at {cell} does not belong to {side}")]
    WrongSide { cell: Cell, side: Side },

    #[error("target cell {0} is occupied by a friendly piece")]
    FriendlyTarget(Cell),

    #[error("{to} is not a legal destination for the piece at {from}")]
    IllegalDestination { from: Cell, to: Cell },

    #[error("a compound move must relocate at least one piece")]
    EmptyCompound,

    #[error("compound move relocates {found} pieces, the limit is {limit}")]
    TooManyRelocations { found: usize, limit: usize },

    #[error("piece arriving at {0} is relocated twice in one turn")]
    PieceMovedTwice(Cell),

    #[error("the game is already over")]
    GameOver,

    #[error("it is not {0}'s turn")]
    NotYourTurn(Side),
}

/// Reasons terrain or a piece configuration can be rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("terrain row {row} has {found} cells, expected {expected}")]
    TerrainRowLength {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("terrain has {found} rows, expected {expected}")]
    TerrainRowCount { found: usize, expected: usize },

    #[error("castle green {green} is not orthogonally adjacent to interior {interior}")]
    CastleNotAdjacent { green: Cell, interior: Cell },

    #[error("cell {cell} is outside the setup area of {side}")]
    OutsideSetupArea { cell: Cell, side: Side },

    #[error("cell {0} is used more than once")]
    CellOccupied(Cell),

    #[error("{rank:?} cannot be placed on {cell}: {reason}")]
    IllegalPlacement {
        rank: Rank,
        cell: Cell,
        reason: &'static str,
    },

    #[error("{0} already has pieces on the board")]
    AlreadyPlaced(Side),

    #[error("no free cell left for the {what} of {side}")]
    NoRoom { what: &'static str, side: Side },
}

/// Umbrella error for callers that mix setup, moves and configuration.
#[derive(Error, Debug)]
pub enum FeudalError {
    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),
}
