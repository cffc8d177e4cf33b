use crate::engine::config::{EngineConfig, EvalWeights};
use crate::engine::Evaluator;
use crate::logic::board::{Board, Side, BOARD_SIZE};
use crate::logic::piece::{Rank, RankCounts};
use std::sync::Arc;

/// Score of a decided game for the winner; the loser gets the negation.
pub const TERMINAL_VALUE: f64 = 10.0;

/// Value of a finished game for `perspective`, or `None` while it is running.
/// A position where both sides have lost scores 0.
#[must_use]
pub fn terminal_value(board: &Board, perspective: Side) -> Option<f64> {
    match (board.lost(perspective), board.lost(perspective.opposite())) {
        (false, false) => None,
        (true, false) => Some(-TERMINAL_VALUE),
        (false, true) => Some(TERMINAL_VALUE),
        (true, true) => Some(0.0),
    }
}

/// Weighted material, progress and castle-pressure evaluation. Antisymmetric:
/// the score for one side is the negation of the score for the other.
pub struct WeightedEvaluator {
    config: Arc<EngineConfig>,
}

impl WeightedEvaluator {
    pub const fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    fn weights(&self) -> &EvalWeights {
        &self.config.eval
    }

    // Weighted count of `counts` over `ranks`, normalised by a full army.
    fn material(&self, counts: RankCounts, royal: bool) -> f64 {
        let ranks = &self.weights().ranks;
        let (held, full) = Rank::ALL
            .iter()
            .filter(|rank| rank.is_royal() == royal)
            .fold((0.0, 0.0), |(held, full), &rank| {
                let w = ranks.get(rank);
                (
                    w.mul_add(f64::from(counts.get(rank)), held),
                    w.mul_add(f64::from(rank.full_count()), full),
                )
            });
        if full > 0.0 {
            held / full
        } else {
            0.0
        }
    }

    // 1 when a non-archer stands next to the opponent interior, 0 when every
    // piece is as far as the board allows.
    fn progress(board: &Board, side: Side) -> f64 {
        let Some(target) = board.castle(side.opposite()) else {
            return 0.0;
        };
        let closest = board
            .pieces(side)
            .filter(|(piece, _)| piece.rank != Rank::Archer)
            .map(|(_, cell)| cell.distance(target.interior))
            .min();
        #[allow(clippy::cast_precision_loss)]
        let span = (BOARD_SIZE - 1) as f64;
        closest.map_or(0.0, |d| 1.0 - f64::from(d) / span)
    }

    // A non-archer on the opponent's castle green.
    fn castle_pressure(board: &Board, side: Side) -> f64 {
        board.castle(side.opposite()).map_or(0.0, |castle| {
            match board.piece_at(castle.green) {
                Some(piece) if piece.side == side && piece.rank != Rank::Archer => 1.0,
                _ => 0.0,
            }
        })
    }

    fn one_sided(&self, board: &Board, side: Side) -> f64 {
        let w = self.weights();
        let counts = board.get_counts(side);
        w.royalty * self.material(counts, true)
            + w.other * self.material(counts, false)
            + w.progress * Self::progress(board, side)
            + w.castle * Self::castle_pressure(board, side)
    }
}

impl Evaluator for WeightedEvaluator {
    fn evaluate(&self, board: &Board, perspective: Side) -> f64 {
        self.one_sided(board, perspective) - self.one_sided(board, perspective.opposite())
    }
}
