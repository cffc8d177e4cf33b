use crate::logic::board::{Cell, Side, NUM_CELLS};
use crate::logic::piece::{Piece, Rank};
use std::sync::OnceLock;

const NUM_SIDES: usize = 2;
const NUM_RANKS: usize = Rank::ALL.len();
const TABLE_SIZE: usize = NUM_SIDES * NUM_RANKS * NUM_CELLS;

pub struct ZobristKeys {
    piece_keys: Vec<u64>,
    pub side_key: u64,
}

// Deterministic keys without pulling an RNG into board code.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl ZobristKeys {
    fn new() -> Self {
        let mut rng = XorShift64::new(0x2545_F491_4F6C_DD1D);
        let piece_keys = (0..TABLE_SIZE).map(|_| rng.next()).collect();
        let side_key = rng.next();
        Self {
            piece_keys,
            side_key,
        }
    }

    pub fn get() -> &'static Self {
        static INSTANCE: OnceLock<ZobristKeys> = OnceLock::new();
        INSTANCE.get_or_init(ZobristKeys::new)
    }

    #[must_use]
    pub fn piece_key(&self, piece: Piece, cell: Cell) -> u64 {
        let idx = (piece.side.index() * NUM_RANKS + piece.rank.index()) * NUM_CELLS + cell.index();
        self.piece_keys[idx]
    }

    /// Key folded in when `side` is to move.
    #[must_use]
    pub const fn to_move_key(&self, side: Side) -> u64 {
        match side {
            Side::Blue => 0,
            Side::Brown => self.side_key,
        }
    }
}
