//! Compound (multi-piece) turn moves.
//!
//! Enumeration walks piece subsets depth-first against one shared board,
//! applying each candidate relocation in place and undoing it on the way
//! back up. Nothing is cloned per branch.

use crate::error::MoveError;
use crate::logic::board::{Board, Cell, Side, UndoRecord};
use crate::logic::movegen::Destination;
use crate::logic::piece::Piece;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One turn: an ordered list of `(origin, destination)` relocations, each
/// moving a different piece.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompoundMove {
    moves: Vec<(Cell, Cell)>,
}

impl CompoundMove {
    #[must_use]
    pub const fn new() -> Self {
        Self { moves: Vec::new() }
    }

    #[must_use]
    pub fn single(from: Cell, to: Cell) -> Self {
        Self {
            moves: vec![(from, to)],
        }
    }

    pub fn push(&mut self, from: Cell, to: Cell) {
        self.moves.push((from, to));
    }

    #[must_use]
    pub fn relocations(&self) -> &[(Cell, Cell)] {
        &self.moves
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (Cell, Cell)> {
        self.moves.iter()
    }
}

impl From<Vec<(Cell, Cell)>> for CompoundMove {
    fn from(moves: Vec<(Cell, Cell)>) -> Self {
        Self { moves }
    }
}

impl<'a> IntoIterator for &'a CompoundMove {
    type Item = &'a (Cell, Cell);
    type IntoIter = std::slice::Iter<'a, (Cell, Cell)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for CompoundMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (from, to)) in self.moves.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{from}->{to}")?;
        }
        Ok(())
    }
}

struct Level {
    // Index into the canonical piece list.
    piece: usize,
    targets: Vec<Destination>,
    cursor: usize,
    applied: Option<UndoRecord>,
}

/// Depth-first compound move enumerator holding the board exclusively.
///
/// Every yielded move is applied on the board while it is current; the next
/// call undoes what is no longer needed. Dropping the iterator early restores
/// the board to its starting position.
pub struct CompoundMoves<'a> {
    board: &'a mut Board,
    side: Side,
    pieces: Vec<(Piece, Cell)>,
    max_len: usize,
    stack: Vec<Level>,
    started: bool,
    descend: bool,
}

impl<'a> CompoundMoves<'a> {
    fn with_depth(board: &'a mut Board, side: Side, max_len: usize) -> Self {
        let pieces = board.canonical_pieces(side);
        Self {
            board,
            side,
            pieces,
            max_len,
            stack: Vec::with_capacity(max_len),
            started: false,
            descend: false,
        }
    }

    /// Pushes a level for the first piece at or after `start` that has any
    /// destination on the current board.
    fn open_level(&mut self, start: usize) -> bool {
        for idx in start..self.pieces.len() {
            let (_, origin) = self.pieces[idx];
            let targets = self.board.destinations(origin);
            if !targets.is_empty() {
                self.stack.push(Level {
                    piece: idx,
                    targets,
                    cursor: 0,
                    applied: None,
                });
                return true;
            }
        }
        false
    }

    /// Moves to the next relocation sequence, leaving it applied.
    fn advance(&mut self) -> bool {
        if !self.started {
            self.started = true;
            if self.max_len == 0 || !self.open_level(0) {
                return false;
            }
        } else if self.descend {
            self.descend = false;
            if self.stack.len() < self.max_len {
                let next = self.stack.last().map_or(0, |level| level.piece + 1);
                self.open_level(next);
            }
        }

        loop {
            let Some(level) = self.stack.last_mut() else {
                return false;
            };
            if let Some(record) = level.applied.take() {
                self.board.reverse_apply_move(&record);
            }
            if let Some(target) = level.targets.get(level.cursor).copied() {
                level.cursor += 1;
                let (_, origin) = self.pieces[level.piece];
                level.applied = Some(self.board.apply_generated(origin, target.cell, self.side));
                self.descend = true;
                return true;
            }

            let exhausted = level.piece;
            self.stack.pop();
            self.open_level(exhausted + 1);
        }
    }

    fn current(&self) -> CompoundMove {
        self.stack
            .iter()
            .filter_map(|level| {
                let (_, origin) = self.pieces[level.piece];
                let target = level.targets.get(level.cursor.checked_sub(1)?)?;
                Some((origin, target.cell))
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn last_piece(&self) -> Option<usize> {
        self.stack.last().map(|level| level.piece)
    }

    /// Read access to the board with the current move applied.
    #[must_use]
    pub fn board(&self) -> &Board {
        self.board
    }
}

impl Iterator for CompoundMoves<'_> {
    type Item = CompoundMove;

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            Some(self.current())
        } else {
            None
        }
    }
}

impl Drop for CompoundMoves<'_> {
    fn drop(&mut self) {
        while let Some(level) = self.stack.pop() {
            if let Some(record) = level.applied {
                self.board.reverse_apply_move(&record);
            }
        }
    }
}

// A first relocation and the number of compound moves that begin with it.
#[derive(Debug, Clone, Copy)]
struct Branch {
    piece: usize,
    to: Cell,
    size: usize,
}

/// Positional index over the compound moves of one side in one position.
///
/// Holds the size of every subtree below a first relocation, so the n-th
/// move of the canonical enumeration can be rebuilt by descending into a
/// single subtree instead of walking everything before it.
#[derive(Debug, Clone)]
pub struct MoveIndex {
    side: Side,
    key: u64,
    pieces: Vec<(Piece, Cell)>,
    branches: Vec<Branch>,
    total: usize,
}

impl MoveIndex {
    /// Number of compound moves, equal to [`Board::get_num_all_moves`].
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }
}

impl Board {
    /// In-place enumeration of every compound move of `side`, in canonical
    /// order. The board is borrowed for the lifetime of the iterator.
    pub fn compound_moves(&mut self, side: Side) -> CompoundMoves<'_> {
        let depth = self.max_pieces_moved();
        CompoundMoves::with_depth(self, side, depth)
    }

    #[must_use]
    pub fn get_all_moves(&mut self, side: Side) -> Vec<CompoundMove> {
        self.compound_moves(side).collect()
    }

    /// Number of compound moves `side` has, without building any of them.
    ///
    /// Sequences one piece short of the limit are extended by counting the
    /// destinations of every later piece instead of applying them.
    pub fn get_num_all_moves(&mut self, side: Side) -> usize {
        let limit = self.max_pieces_moved();
        if limit == 1 {
            return self
                .canonical_pieces(side)
                .iter()
                .map(|&(_, cell)| self.count_destinations(cell))
                .sum();
        }

        let mut walker = CompoundMoves::with_depth(self, side, limit - 1);
        let mut total = 0;
        while walker.advance() {
            total += 1;
            if walker.stack.len() == limit - 1 {
                let next = walker.last_piece().map_or(0, |idx| idx + 1);
                total += walker.pieces[next..]
                    .iter()
                    .map(|&(_, cell)| walker.board.count_destinations(cell))
                    .sum::<usize>();
            }
        }
        total
    }

    /// Builds the [`MoveIndex`] of `side` for the current position.
    pub fn move_index(&mut self, side: Side) -> MoveIndex {
        let pieces = self.canonical_pieces(side);
        let limit = self.max_pieces_moved();
        let mut branches = Vec::new();
        if limit > 0 {
            for (idx, &(_, origin)) in pieces.iter().enumerate() {
                for target in self.destinations(origin) {
                    let record = self.apply_generated(origin, target.cell, side);
                    let size = 1 + self.count_sequences(&pieces, idx + 1, limit - 1, side);
                    self.reverse_apply_move(&record);
                    branches.push(Branch {
                        piece: idx,
                        to: target.cell,
                        size,
                    });
                }
            }
        }
        MoveIndex {
            side,
            key: self.hash_key(side),
            total: branches.iter().map(|b| b.size).sum(),
            pieces,
            branches,
        }
    }

    /// The `n`-th compound move of the canonical enumeration, so that
    /// `nth_compound_move(&index, n) == get_all_moves(side)[n]`. `None` when
    /// `n` is out of range or `index` was built for another position.
    pub fn nth_compound_move(&mut self, index: &MoveIndex, mut n: usize) -> Option<CompoundMove> {
        if index.key != self.hash_key(index.side) {
            return None;
        }
        let branch = index.branches.iter().find(|branch| {
            if n < branch.size {
                true
            } else {
                n -= branch.size;
                false
            }
        })?;

        let (_, origin) = index.pieces[branch.piece];
        let mut mv = CompoundMove::single(origin, branch.to);
        if n > 0 {
            let depth = self.max_pieces_moved() - 1;
            let record = self.apply_generated(origin, branch.to, index.side);
            let found = self.nth_sequence(&index.pieces, branch.piece + 1, depth, index.side, n - 1, &mut mv);
            self.reverse_apply_move(&record);
            if !found {
                return None;
            }
        }
        Some(mv)
    }

    // Relocation sequences of 1..=depth pieces drawn from `pieces[start..]`.
    fn count_sequences(&mut self, pieces: &[(Piece, Cell)], start: usize, depth: usize, side: Side) -> usize {
        if depth == 0 {
            return 0;
        }
        let mut total = 0;
        for (offset, &(_, origin)) in pieces[start..].iter().enumerate() {
            if depth == 1 {
                total += self.count_destinations(origin);
                continue;
            }
            for target in self.destinations(origin) {
                let record = self.apply_generated(origin, target.cell, side);
                total += 1 + self.count_sequences(pieces, start + offset + 1, depth - 1, side);
                self.reverse_apply_move(&record);
            }
        }
        total
    }

    // Appends the `n`-th sequence counted by `count_sequences` to `mv`.
    fn nth_sequence(
        &mut self,
        pieces: &[(Piece, Cell)],
        start: usize,
        depth: usize,
        side: Side,
        mut n: usize,
        mv: &mut CompoundMove,
    ) -> bool {
        if depth == 0 {
            return false;
        }
        for (offset, &(_, origin)) in pieces[start..].iter().enumerate() {
            if depth == 1 {
                let count = self.count_destinations(origin);
                if n >= count {
                    n -= count;
                    continue;
                }
                return match self.destinations(origin).get(n) {
                    Some(target) => {
                        mv.push(origin, target.cell);
                        true
                    }
                    None => false,
                };
            }

            let next = start + offset + 1;
            for target in self.destinations(origin) {
                if n == 0 {
                    mv.push(origin, target.cell);
                    return true;
                }
                n -= 1;
                let record = self.apply_generated(origin, target.cell, side);
                let below = self.count_sequences(pieces, next, depth - 1, side);
                if n < below {
                    mv.push(origin, target.cell);
                    let found = self.nth_sequence(pieces, next, depth - 1, side, n, mv);
                    self.reverse_apply_move(&record);
                    return found;
                }
                n -= below;
                self.reverse_apply_move(&record);
            }
        }
        false
    }

    /// Whether `side` has at least one legal relocation.
    #[must_use]
    pub fn has_moves(&self, side: Side) -> bool {
        self.pieces(side)
            .any(|(_, cell)| self.count_destinations(cell) > 0)
    }

    /// Applies every relocation of `mv`, returning the undo log. On failure
    /// the relocations already made are reverted and the board is unchanged.
    pub fn apply_moves(
        &mut self,
        mv: &CompoundMove,
        side: Side,
    ) -> Result<Vec<UndoRecord>, MoveError> {
        self.apply_compound(mv, side, false)
    }

    /// Like [`Board::apply_moves`], but every relocation is checked against
    /// the piece's legal destinations first.
    pub fn play_moves(
        &mut self,
        mv: &CompoundMove,
        side: Side,
    ) -> Result<Vec<UndoRecord>, MoveError> {
        self.apply_compound(mv, side, true)
    }

    /// Applies a compound move produced by the enumerator. Failure means the
    /// generator and the board disagree.
    pub(crate) fn apply_generated_moves(&mut self, mv: &CompoundMove, side: Side) -> Vec<UndoRecord> {
        match self.apply_moves(mv, side) {
            Ok(records) => records,
            Err(err) => panic!("move generator produced an unplayable compound move {mv}: {err}"),
        }
    }

    fn apply_compound(
        &mut self,
        mv: &CompoundMove,
        side: Side,
        validate: bool,
    ) -> Result<Vec<UndoRecord>, MoveError> {
        if mv.is_empty() {
            return Err(MoveError::EmptyCompound);
        }
        if mv.len() > self.max_pieces_moved() {
            return Err(MoveError::TooManyRelocations {
                found: mv.len(),
                limit: self.max_pieces_moved(),
            });
        }

        let mut records = Vec::with_capacity(mv.len());
        let mut touched: Vec<Cell> = Vec::with_capacity(mv.len() * 2);
        for &(from, to) in mv {
            let result = if touched.contains(&from) {
                Err(MoveError::PieceMovedTwice(from))
            } else if validate {
                self.apply_move(from, to, side)
            } else {
                self.apply_move_ret_state(from, to, side)
            };
            match result {
                Ok(record) => records.push(record),
                Err(err) => {
                    self.reverse_apply_moves(&records);
                    return Err(err);
                }
            }
            touched.push(from);
            touched.push(to);
        }
        Ok(records)
    }

    /// A cheap, biased random compound move for playouts: a random number of
    /// random pieces, each sent to a random destination. Works on a clone and
    /// returns the move together with the resulting board.
    pub fn random_move<R: Rng + ?Sized>(
        &self,
        side: Side,
        rng: &mut R,
    ) -> Option<(CompoundMove, Self)> {
        let pieces = self.canonical_pieces(side);
        if pieces.is_empty() {
            return None;
        }
        let count = rng.gen_range(1..=self.max_pieces_moved().min(pieces.len()));
        let mut chosen: Vec<usize> = (0..pieces.len()).collect();
        chosen.shuffle(rng);
        chosen.truncate(count);
        chosen.sort_unstable();

        let mut board = self.clone();
        let mut mv = CompoundMove::new();
        for idx in chosen {
            let (_, origin) = pieces[idx];
            if let Some(target) = board.destinations(origin).choose(rng).copied() {
                board.apply_generated(origin, target.cell, side);
                mv.push(origin, target.cell);
            }
        }

        if mv.is_empty() {
            // Every sampled piece was stuck; fall back to any mobile piece.
            let (origin, target) = pieces.iter().find_map(|&(_, origin)| {
                let target = board.destinations(origin).choose(rng).copied()?;
                Some((origin, target))
            })?;
            board.apply_generated(origin, target.cell, side);
            mv.push(origin, target.cell);
        }
        Some((mv, board))
    }

    /// A compound move drawn uniformly from the full enumeration, located
    /// through a [`MoveIndex`] rather than by walking the enumeration.
    pub fn uniform_random_move<R: Rng + ?Sized>(
        &mut self,
        side: Side,
        rng: &mut R,
    ) -> Option<CompoundMove> {
        let index = self.move_index(side);
        if index.total() == 0 {
            return None;
        }
        let n = rng.gen_range(0..index.total());
        self.nth_compound_move(&index, n)
    }
}
