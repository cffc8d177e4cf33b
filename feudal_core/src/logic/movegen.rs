//! Single-piece destination generation.
//!
//! Every rank shares one ray walk parameterised by its [`RankRules`]. The lazy
//! iterator, the materialised list and the pure count all classify cells
//! through [`classify`], so the three forms cannot disagree.

use crate::logic::board::{Board, Cell, Side};
use crate::logic::piece::{Motion, Piece, RankRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub cell: Cell,
    pub capture: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The ray ends before this cell; nothing is yielded.
    Stop,
    /// The cell is a destination. `last` ends the ray after yielding it.
    Yield { capture: bool, last: bool },
}

// Classifies one cell reached by a piece of `side` described by `rules`.
fn classify(board: &Board, rules: &RankRules, side: Side, on_green: bool, cell: Cell) -> Step {
    let terrain = board.terrain();
    if terrain.is_mountain(cell) {
        return Step::Stop;
    }
    let occupant = board.piece_at(cell);
    if occupant.is_some_and(|p| p.side == side) {
        return Step::Stop;
    }
    if rules.blocked_by_rough && terrain.is_rough(cell) {
        return Step::Stop;
    }

    let capture = occupant.is_some();
    if board.is_interior(cell) {
        if !rules.enters_interior || !on_green {
            return Step::Stop;
        }
        return Step::Yield {
            capture,
            last: true,
        };
    }
    if board.is_green(cell) {
        return Step::Yield {
            capture,
            last: !rules.passes_through,
        };
    }
    if capture {
        return Step::Yield {
            capture,
            last: !rules.passes_through,
        };
    }
    Step::Yield {
        capture: false,
        last: false,
    }
}

// A squire's jump may not pass straight over a castle interior.
fn leap_crosses_interior(board: &Board, origin: Cell, jump: (i8, i8)) -> bool {
    let leg = if jump.0.abs() == 2 {
        (jump.0.signum(), 0)
    } else {
        (0, jump.1.signum())
    };
    (1..=2).any(|step| {
        origin
            .offset(leg, step)
            .is_some_and(|cell| board.is_interior(cell))
    })
}

/// Lazy, restartable destination sequence for one piece.
pub struct Destinations<'a> {
    board: &'a Board,
    rules: &'static RankRules,
    origin: Cell,
    side: Side,
    on_green: bool,
    direction: usize,
    step: u8,
}

impl<'a> Destinations<'a> {
    #[must_use]
    pub fn new(board: &'a Board, piece: Piece, origin: Cell) -> Self {
        Self {
            board,
            rules: piece.rank.rules(),
            origin,
            side: piece.side,
            on_green: board.is_green(origin),
            direction: 0,
            step: 0,
        }
    }

    /// Rewinds to the first direction.
    pub fn restart(&mut self) {
        self.direction = 0;
        self.step = 0;
    }

    fn next_direction(&mut self) {
        self.direction += 1;
        self.step = 0;
    }
}

impl Iterator for Destinations<'_> {
    type Item = Destination;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let &delta = self.rules.directions.get(self.direction)?;

            if self.rules.motion == Motion::Leap {
                self.next_direction();
                let Some(cell) = self.origin.offset(delta, 1) else {
                    continue;
                };
                if leap_crosses_interior(self.board, self.origin, delta) {
                    continue;
                }
                match classify(self.board, self.rules, self.side, self.on_green, cell) {
                    Step::Stop => continue,
                    Step::Yield { capture, .. } => return Some(Destination { cell, capture }),
                }
            }

            self.step += 1;
            if self.step > self.rules.reach(delta) {
                self.next_direction();
                continue;
            }
            let Some(cell) = self.origin.offset(delta, self.step) else {
                self.next_direction();
                continue;
            };
            match classify(self.board, self.rules, self.side, self.on_green, cell) {
                Step::Stop => self.next_direction(),
                Step::Yield { capture, last } => {
                    if last {
                        self.next_direction();
                    }
                    return Some(Destination { cell, capture });
                }
            }
        }
    }
}

impl Board {
    /// Lazy destinations of the piece on `origin`; empty if the cell is vacant.
    #[must_use]
    pub fn destinations_iter(&self, origin: Cell) -> Option<Destinations<'_>> {
        self.piece_at(origin)
            .map(|piece| Destinations::new(self, piece, origin))
    }

    #[must_use]
    pub fn destinations(&self, origin: Cell) -> Vec<Destination> {
        self.destinations_iter(origin)
            .map(Iterator::collect)
            .unwrap_or_default()
    }

    /// Number of destinations of the piece on `origin`, without allocating.
    #[must_use]
    pub fn count_destinations(&self, origin: Cell) -> usize {
        let Some(piece) = self.piece_at(origin) else {
            return 0;
        };
        let rules = piece.rank.rules();
        let on_green = self.is_green(origin);
        let mut count = 0;

        for &delta in rules.directions {
            if rules.motion == Motion::Leap {
                let Some(cell) = origin.offset(delta, 1) else {
                    continue;
                };
                if !leap_crosses_interior(self, origin, delta)
                    && classify(self, rules, piece.side, on_green, cell) != Step::Stop
                {
                    count += 1;
                }
                continue;
            }

            for step in 1..=rules.reach(delta) {
                let Some(cell) = origin.offset(delta, step) else {
                    break;
                };
                match classify(self, rules, piece.side, on_green, cell) {
                    Step::Stop => break,
                    Step::Yield { last, .. } => {
                        count += 1;
                        if last {
                            break;
                        }
                    }
                }
            }
        }
        count
    }
}
