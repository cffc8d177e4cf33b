use crate::engine::zobrist::ZobristKeys;
use crate::error::MoveError;
use crate::logic::piece::{Piece, Rank, RankCounts};
use crate::logic::terrain::{Terrain, TerrainKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const BOARD_SIZE: usize = 24;
pub const NUM_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

/// Default number of pieces a side may relocate in one turn.
pub const DEFAULT_MAX_PIECES_MOVED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Blue,
    Brown,
}

impl Side {
    pub const BOTH: [Self; 2] = [Self::Blue, Self::Brown];

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Blue => Self::Brown,
            Self::Brown => Self::Blue,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Blue => 0,
            Self::Brown => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blue => write!(f, "blue"),
            Self::Brown => write!(f, "brown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub row: u8,
    pub col: u8,
}

impl Cell {
    #[must_use]
    pub fn new(row: usize, col: usize) -> Option<Self> {
        if row < BOARD_SIZE && col < BOARD_SIZE {
            Some(Self {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    /// False only for cells built from untrusted input, such as deserialized
    /// moves.
    #[must_use]
    pub const fn is_on_board(self) -> bool {
        (self.row as usize) < BOARD_SIZE && (self.col as usize) < BOARD_SIZE
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.row as usize * BOARD_SIZE + self.col as usize
    }

    /// Callers guarantee `idx < NUM_CELLS`.
    #[must_use]
    pub const fn from_index(idx: usize) -> Self {
        Self {
            row: (idx / BOARD_SIZE) as u8,
            col: (idx % BOARD_SIZE) as u8,
        }
    }

    /// The cell `steps` times `delta` away, if it is on the board.
    #[must_use]
    pub fn offset(self, delta: (i8, i8), steps: u8) -> Option<Self> {
        let row = i32::from(self.row) + i32::from(delta.0) * i32::from(steps);
        let col = i32::from(self.col) + i32::from(delta.1) * i32::from(steps);
        let row = usize::try_from(row).ok()?;
        let col = usize::try_from(col).ok()?;
        Self::new(row, col)
    }

    /// Chebyshev distance (king steps).
    #[must_use]
    pub const fn distance(self, other: Self) -> u8 {
        let dr = self.row.abs_diff(other.row);
        let dc = self.col.abs_diff(other.col);
        if dr > dc {
            dr
        } else {
            dc
        }
    }

    #[must_use]
    pub const fn is_orthogonal_neighbour(self, other: Self) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The two linked castle cells of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Castle {
    pub green: Cell,
    pub interior: Cell,
}

/// Everything needed to exactly reverse one relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoRecord {
    pub from: Cell,
    pub to: Cell,
    pub mover: Piece,
    pub captured: Option<Piece>,
    /// An archer captured at range and did not relocate.
    pub archer_shot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    terrain: Arc<Terrain>,
    // Location -> piece, for both sides.
    grid: Vec<Option<Piece>>,
    // Piece -> location, per side, keyed by (rank, instance).
    roster: [BTreeMap<(Rank, u8), Cell>; 2],
    counts: [RankCounts; 2],
    castles: [Option<Castle>; 2],
    max_pieces_moved: usize,
    zobrist_hash: u64,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(Terrain::open(), DEFAULT_MAX_PIECES_MOVED)
    }
}

impl Board {
    #[must_use]
    pub fn new(terrain: Terrain, max_pieces_moved: usize) -> Self {
        Self {
            terrain: Arc::new(terrain),
            grid: vec![None; NUM_CELLS],
            roster: [BTreeMap::new(), BTreeMap::new()],
            counts: [RankCounts::default(); 2],
            castles: [None; 2],
            max_pieces_moved: max_pieces_moved.max(1),
            zobrist_hash: 0,
        }
    }

    #[must_use]
    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    #[must_use]
    pub const fn max_pieces_moved(&self) -> usize {
        self.max_pieces_moved
    }

    #[must_use]
    pub const fn castle(&self, side: Side) -> Option<Castle> {
        self.castles[side.index()]
    }

    #[must_use]
    pub fn piece_at(&self, cell: Cell) -> Option<Piece> {
        self.grid[cell.index()]
    }

    #[must_use]
    pub fn location_of(&self, side: Side, rank: Rank, instance: u8) -> Option<Cell> {
        self.roster[side.index()].get(&(rank, instance)).copied()
    }

    /// All pieces of `side` with their locations, ordered by rank then instance.
    pub fn pieces(&self, side: Side) -> impl Iterator<Item = (Piece, Cell)> + '_ {
        self.roster[side.index()]
            .iter()
            .map(move |(&(rank, instance), &cell)| (Piece::new(rank, side, instance), cell))
    }

    /// Pieces of `side` in canonical compound-move order: rank, then column,
    /// then instance number.
    #[must_use]
    pub fn canonical_pieces(&self, side: Side) -> Vec<(Piece, Cell)> {
        let mut pieces: Vec<(Piece, Cell)> = self.pieces(side).collect();
        pieces.sort_by_key(|(piece, cell)| (piece.rank, cell.col, piece.instance));
        pieces
    }

    #[must_use]
    pub const fn get_counts(&self, side: Side) -> RankCounts {
        self.counts[side.index()]
    }

    #[must_use]
    pub fn is_green(&self, cell: Cell) -> bool {
        self.castles.iter().flatten().any(|castle| castle.green == cell)
    }

    #[must_use]
    pub fn is_interior(&self, cell: Cell) -> bool {
        self.castles
            .iter()
            .flatten()
            .any(|castle| castle.interior == cell)
    }

    /// Position key for transposition lookups. Equal for boards with the same
    /// placement and the same side to move.
    #[must_use]
    pub fn hash_key(&self, to_move: Side) -> u64 {
        self.zobrist_hash ^ ZobristKeys::get().to_move_key(to_move)
    }

    pub(crate) fn add_piece(&mut self, cell: Cell, piece: Piece) {
        self.grid[cell.index()] = Some(piece);
        self.roster[piece.side.index()].insert((piece.rank, piece.instance), cell);
        self.counts[piece.side.index()].increment(piece.rank);
        self.zobrist_hash ^= ZobristKeys::get().piece_key(piece, cell);
    }

    pub(crate) fn remove_piece(&mut self, cell: Cell) -> Option<Piece> {
        let piece = self.grid[cell.index()].take()?;
        self.roster[piece.side.index()].remove(&(piece.rank, piece.instance));
        self.counts[piece.side.index()].decrement(piece.rank);
        self.zobrist_hash ^= ZobristKeys::get().piece_key(piece, cell);
        Some(piece)
    }

    // Relocation that keeps counts untouched.
    fn relocate(&mut self, from: Cell, to: Cell, piece: Piece) {
        let keys = ZobristKeys::get();
        self.grid[from.index()] = None;
        self.grid[to.index()] = Some(piece);
        self.roster[piece.side.index()].insert((piece.rank, piece.instance), to);
        self.zobrist_hash ^= keys.piece_key(piece, from) ^ keys.piece_key(piece, to);
    }

    /// Installs a castle and strips terrain from its cells.
    pub(crate) fn set_castle(&mut self, side: Side, castle: Castle) {
        let terrain = Arc::make_mut(&mut self.terrain);
        terrain.set(castle.green, TerrainKind::Open);
        terrain.set(castle.interior, TerrainKind::Open);
        self.castles[side.index()] = Some(castle);
    }

    /// Relocates one piece of `side`, capturing any opponent on `to`, and
    /// returns the record that reverses it. Destination legality is not
    /// re-derived here; see [`Board::apply_move`] for the validated form.
    pub fn apply_move_ret_state(
        &mut self,
        from: Cell,
        to: Cell,
        side: Side,
    ) -> Result<UndoRecord, MoveError> {
        for cell in [from, to] {
            if !cell.is_on_board() {
                return Err(MoveError::OutOfBounds(cell));
            }
        }
        let mover = self.piece_at(from).ok_or(MoveError::NoPieceAtSource(from))?;
        if mover.side != side {
            return Err(MoveError::WrongSide { cell: from, side });
        }
        if from == to {
            return Err(MoveError::IllegalDestination { from, to });
        }

        let captured = match self.piece_at(to) {
            Some(target) if target.side == side => return Err(MoveError::FriendlyTarget(to)),
            Some(_) => self.remove_piece(to),
            None => None,
        };

        let archer_shot = captured.is_some() && mover.rank == Rank::Archer;
        if !archer_shot {
            self.relocate(from, to, mover);
        }

        Ok(UndoRecord {
            from,
            to,
            mover,
            captured,
            archer_shot,
        })
    }

    /// Validated relocation used by the external game loop.
    pub fn apply_move(&mut self, from: Cell, to: Cell, side: Side) -> Result<UndoRecord, MoveError> {
        if !from.is_on_board() {
            return Err(MoveError::OutOfBounds(from));
        }
        let mover = self.piece_at(from).ok_or(MoveError::NoPieceAtSource(from))?;
        if mover.side != side {
            return Err(MoveError::WrongSide { cell: from, side });
        }
        if !self.destinations(from).iter().any(|d| d.cell == to) {
            return Err(MoveError::IllegalDestination { from, to });
        }
        self.apply_move_ret_state(from, to, side)
    }

    /// Applies a relocation that the move generator produced. Failure means
    /// the generator and the board disagree, which is unrecoverable.
    pub(crate) fn apply_generated(&mut self, from: Cell, to: Cell, side: Side) -> UndoRecord {
        match self.apply_move_ret_state(from, to, side) {
            Ok(record) => record,
            Err(err) => panic!("move generator produced an unplayable relocation {from} -> {to}: {err}"),
        }
    }

    pub fn reverse_apply_move(&mut self, record: &UndoRecord) {
        if !record.archer_shot {
            self.relocate(record.to, record.from, record.mover);
        }
        if let Some(captured) = record.captured {
            self.add_piece(record.to, captured);
        }
    }

    /// Reverts a sequence of records, newest first.
    pub fn reverse_apply_moves(&mut self, records: &[UndoRecord]) {
        for record in records.iter().rev() {
            self.reverse_apply_move(record);
        }
    }

    #[must_use]
    pub fn royalty_lost(&self, side: Side) -> bool {
        self.counts[side.index()].royalty() == 0
    }

    /// A side has lost when its royalty is gone or the opponent holds its
    /// castle interior.
    #[must_use]
    pub fn lost(&self, side: Side) -> bool {
        if self.royalty_lost(side) {
            return true;
        }
        self.castle(side).is_some_and(|castle| {
            self.piece_at(castle.interior)
                .is_some_and(|piece| piece.side != side)
        })
    }

    #[must_use]
    pub fn blue_lost(&self) -> bool {
        self.lost(Side::Blue)
    }

    #[must_use]
    pub fn brown_lost(&self) -> bool {
        self.lost(Side::Brown)
    }

    #[must_use]
    pub fn game_over(&self) -> bool {
        self.blue_lost() || self.brown_lost()
    }

    /// The winner of a finished game, if exactly one side has lost.
    #[must_use]
    pub fn winner(&self) -> Option<Side> {
        match (self.blue_lost(), self.brown_lost()) {
            (true, false) => Some(Side::Brown),
            (false, true) => Some(Side::Blue),
            _ => None,
        }
    }

    /// Checks the data-model invariants, returning a description of the
    /// first violation found.
    pub fn validate(&self) -> Result<(), String> {
        let mut occupied = 0;
        for (idx, slot) in self.grid.iter().enumerate() {
            let Some(piece) = slot else { continue };
            occupied += 1;
            let cell = Cell::from_index(idx);
            let stored = self.location_of(piece.side, piece.rank, piece.instance);
            if stored != Some(cell) {
                return Err(format!("{piece:?} on {cell} is recorded at {stored:?}"));
            }
        }

        let rostered: usize = self.roster.iter().map(BTreeMap::len).sum();
        if rostered != occupied {
            return Err(format!("{rostered} rostered pieces but {occupied} occupied cells"));
        }

        let mut keys = 0;
        for side in Side::BOTH {
            let mut expected = RankCounts::default();
            for (piece, cell) in self.pieces(side) {
                if self.piece_at(cell) != Some(piece) {
                    return Err(format!("{piece:?} is not on its recorded cell {cell}"));
                }
                expected.increment(piece.rank);
                keys ^= ZobristKeys::get().piece_key(piece, cell);
            }
            if expected != self.get_counts(side) {
                return Err(format!("counts for {side} do not match its pieces"));
            }
            if let Some(castle) = self.castle(side) {
                for cell in [castle.green, castle.interior] {
                    if self.terrain.get(cell) != TerrainKind::Open {
                        return Err(format!("castle cell {cell} carries terrain"));
                    }
                }
            }
        }

        if keys != self.zobrist_hash {
            return Err("incremental hash diverged from placement".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(r: usize, c: usize) -> Cell {
        Cell::new(r, c).unwrap()
    }

    fn duel() -> Board {
        let mut board = Board::default();
        board.add_piece(cell(5, 5), Piece::new(Rank::King, Side::Blue, 0));
        board.add_piece(cell(5, 6), Piece::new(Rank::Knight, Side::Blue, 1));
        board.add_piece(cell(7, 7), Piece::new(Rank::King, Side::Brown, 0));
        board.add_piece(cell(7, 9), Piece::new(Rank::Archer, Side::Brown, 0));
        board
    }

    #[test]
    fn test_cell_bounds_and_offsets() {
        assert!(Cell::new(24, 0).is_none());
        assert_eq!(cell(0, 0).offset((-1, 0), 1), None);
        assert_eq!(cell(3, 3).offset((1, -1), 2), Some(cell(5, 1)));
        assert_eq!(Cell::from_index(cell(17, 9).index()), cell(17, 9));
        assert_eq!(cell(2, 2).distance(cell(5, 3)), 3);
    }

    #[test]
    fn test_apply_and_reverse_capture() {
        let mut board = duel();
        let before = board.clone();

        let record = board
            .apply_move_ret_state(cell(5, 5), cell(7, 7), Side::Blue)
            .unwrap();
        assert_eq!(record.captured.map(|p| p.rank), Some(Rank::King));
        assert!(board.brown_lost());
        assert!(board.game_over());
        assert_eq!(board.winner(), Some(Side::Blue));
        assert!(board.validate().is_ok());

        board.reverse_apply_move(&record);
        assert_eq!(board, before);
        assert!(board.validate().is_ok());
    }

    #[test]
    fn test_archer_capture_does_not_relocate() {
        let mut board = duel();
        board.add_piece(cell(7, 8), Piece::new(Rank::Pikemen, Side::Blue, 1));
        let before = board.clone();

        let record = board
            .apply_move_ret_state(cell(7, 9), cell(7, 8), Side::Brown)
            .unwrap();
        assert!(record.archer_shot);
        assert_eq!(board.piece_at(cell(7, 8)), None);
        assert_eq!(
            board.piece_at(cell(7, 9)).map(|p| p.rank),
            Some(Rank::Archer)
        );
        assert_eq!(board.get_counts(Side::Blue).get(Rank::Pikemen), 0);

        board.reverse_apply_move(&record);
        assert_eq!(board, before);
    }

    #[test]
    fn test_apply_rejects_bad_relocations() {
        let mut board = duel();
        assert_eq!(
            board.apply_move_ret_state(cell(0, 0), cell(0, 1), Side::Blue),
            Err(MoveError::NoPieceAtSource(cell(0, 0)))
        );
        assert_eq!(
            board.apply_move_ret_state(cell(7, 7), cell(7, 6), Side::Blue),
            Err(MoveError::WrongSide {
                cell: cell(7, 7),
                side: Side::Blue
            })
        );
        assert_eq!(
            board.apply_move_ret_state(cell(5, 5), cell(5, 6), Side::Blue),
            Err(MoveError::FriendlyTarget(cell(5, 6)))
        );
        let off_board = Cell { row: 30, col: 2 };
        assert_eq!(
            board.apply_move_ret_state(cell(5, 5), off_board, Side::Blue),
            Err(MoveError::OutOfBounds(off_board))
        );
        assert_eq!(
            board.apply_move(cell(5, 5), cell(5, 8), Side::Blue),
            Err(MoveError::IllegalDestination {
                from: cell(5, 5),
                to: cell(5, 8)
            })
        );
        assert_eq!(board, duel());
    }

    #[test]
    fn test_interior_occupation_loses() {
        let mut board = duel();
        board.set_castle(
            Side::Brown,
            Castle {
                green: cell(10, 10),
                interior: cell(10, 11),
            },
        );
        assert!(!board.game_over());
        board.add_piece(cell(10, 11), Piece::new(Rank::Sergeant, Side::Blue, 1));
        assert!(board.brown_lost());
        assert!(!board.blue_lost());
    }

    #[test]
    fn test_hash_tracks_placement_and_side() {
        let mut board = duel();
        let blue_key = board.hash_key(Side::Blue);
        assert_ne!(blue_key, board.hash_key(Side::Brown));

        let record = board
            .apply_move_ret_state(cell(5, 5), cell(4, 4), Side::Blue)
            .unwrap();
        assert_ne!(board.hash_key(Side::Blue), blue_key);
        board.reverse_apply_move(&record);
        assert_eq!(board.hash_key(Side::Blue), blue_key);
    }
}
