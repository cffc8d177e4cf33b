//! Lightweight playout policies and the random agent built on them.

use crate::engine::config::{EngineConfig, PlayoutPolicy, RankWeights};
use crate::engine::eval::{terminal_value, TERMINAL_VALUE};
use crate::engine::{Agent, Deadline, Evaluator, SearchStats, Statistics};
use crate::logic::board::{Board, Side};
use crate::logic::compound::CompoundMove;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::sync::Arc;

/// A cheap move picker used inside simulations and to seed expansion.
pub trait PlayoutAgent: Send + Sync {
    /// Picks a move for `side` and returns it with the resulting board.
    fn choose(&self, board: &Board, side: Side, rng: &mut StdRng) -> Option<(CompoundMove, Board)>;

    /// Moves worth expanding before any random one, best first.
    fn preferred_moves(&self, board: &Board, side: Side) -> Vec<CompoundMove>;
}

/// Biased random play through [`Board::random_move`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPlayout;

impl PlayoutAgent for RandomPlayout {
    fn choose(&self, board: &Board, side: Side, rng: &mut StdRng) -> Option<(CompoundMove, Board)> {
        board.random_move(side, rng)
    }

    fn preferred_moves(&self, _board: &Board, _side: Side) -> Vec<CompoundMove> {
        Vec::new()
    }
}

/// Takes a winning relocation when one exists, otherwise the most valuable
/// capture, otherwise plays randomly.
#[derive(Debug, Clone, Copy)]
pub struct GreedyPlayout {
    weights: RankWeights,
}

impl GreedyPlayout {
    #[must_use]
    pub const fn new(weights: RankWeights) -> Self {
        Self { weights }
    }
}

impl PlayoutAgent for GreedyPlayout {
    fn choose(&self, board: &Board, side: Side, rng: &mut StdRng) -> Option<(CompoundMove, Board)> {
        if let Some(mv) = self.preferred_moves(board, side).into_iter().next() {
            let mut next = board.clone();
            next.apply_generated_moves(&mv, side);
            return Some((mv, next));
        }
        board.random_move(side, rng)
    }

    fn preferred_moves(&self, board: &Board, side: Side) -> Vec<CompoundMove> {
        let mut wins = Vec::new();
        let mut captures: Vec<(f64, CompoundMove)> = Vec::new();
        let mut scratch = board.clone();

        for (_, origin) in board.canonical_pieces(side) {
            for target in board.destinations(origin) {
                if !target.capture && !board.is_interior(target.cell) {
                    continue;
                }
                let record = scratch.apply_generated(origin, target.cell, side);
                let mv = CompoundMove::single(origin, target.cell);
                if terminal_value(&scratch, side) == Some(TERMINAL_VALUE) {
                    wins.push(mv);
                } else if let Some(victim) = record.captured {
                    captures.push((self.weights.get(victim.rank), mv));
                }
                scratch.reverse_apply_move(&record);
            }
        }

        // Stable sort keeps canonical order among equal victims.
        captures.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        wins.extend(captures.into_iter().map(|(_, mv)| mv));
        wins
    }
}

#[must_use]
pub fn playout_agent(policy: PlayoutPolicy, config: &EngineConfig) -> Box<dyn PlayoutAgent> {
    match policy {
        PlayoutPolicy::Random => Box::new(RandomPlayout),
        PlayoutPolicy::Greedy => Box::new(GreedyPlayout::new(config.eval.ranks)),
    }
}

/// Plays `board` out with `policy` for both sides and returns the reward for
/// `perspective` in `[0, 1]`: 1 for a win, 0 for a loss, 0.5 when neither
/// side can claim it. Games cut at `max_turns` are scored by `evaluator`.
pub fn run_playout(
    mut board: Board,
    mut to_move: Side,
    perspective: Side,
    policy: &dyn PlayoutAgent,
    evaluator: &dyn Evaluator,
    max_turns: u32,
    rng: &mut StdRng,
) -> f64 {
    for _ in 0..max_turns {
        if let Some(value) = terminal_value(&board, perspective) {
            return reward_from_value(value);
        }
        let Some((_, next)) = policy.choose(&board, to_move, rng) else {
            return 0.5;
        };
        board = next;
        to_move = to_move.opposite();
    }
    terminal_value(&board, perspective).map_or_else(
        || reward_from_value(evaluator.evaluate(&board, perspective)),
        reward_from_value,
    )
}

// Maps a value from the evaluation scale onto a [0, 1] reward.
fn reward_from_value(value: f64) -> f64 {
    if value >= TERMINAL_VALUE {
        1.0
    } else if value <= -TERMINAL_VALUE {
        0.0
    } else {
        ((value + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

/// Plays the same biased random moves the playouts use.
pub struct RandomAgent {
    side: Side,
    policy: RandomPlayout,
    rng: StdRng,
    stats: Statistics,
}

impl RandomAgent {
    #[must_use]
    pub fn new(side: Side, config: Arc<EngineConfig>) -> Self {
        let rng = match config.mcts.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            side,
            policy: RandomPlayout,
            rng,
            stats: Statistics::default(),
        }
    }
}

impl Agent for RandomAgent {
    fn side(&self) -> Side {
        self.side
    }

    fn get_choice(&mut self, board: &Board) -> Option<CompoundMove> {
        let clock = Deadline::unlimited();
        let (mv, _) = self.policy.choose(board, self.side, &mut self.rng)?;
        self.stats.record(SearchStats {
            time_ms: clock.elapsed_ms(),
            ..SearchStats::default()
        });
        Some(mv)
    }

    fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::eval::WeightedEvaluator;
    use crate::logic::board::{Castle, Cell};
    use crate::logic::piece::Rank;

    fn cell(r: usize, c: usize) -> Cell {
        Cell::new(r, c).unwrap()
    }

    fn board() -> Board {
        let mut board = Board::default();
        board
            .place_some_pieces(
                Side::Blue,
                None,
                &[
                    (Rank::King, cell(0, 0)),
                    (Rank::Knight, cell(10, 2)),
                    (Rank::Archer, cell(12, 12)),
                ],
            )
            .unwrap();
        board
            .place_some_pieces(
                Side::Brown,
                Some(Castle {
                    green: cell(20, 10),
                    interior: cell(21, 10),
                }),
                &[
                    (Rank::King, cell(23, 23)),
                    (Rank::Pikemen, cell(10, 6)),
                    (Rank::Duke, cell(13, 13)),
                ],
            )
            .unwrap();
        board
    }

    #[test]
    fn test_greedy_prefers_wins_then_valuable_captures() {
        let greedy = GreedyPlayout::new(RankWeights::default());
        let board = board();
        let preferred = greedy.preferred_moves(&board, Side::Blue);
        // Archer takes the duke, knight takes the pikeman; neither wins.
        assert_eq!(
            preferred,
            vec![
                CompoundMove::single(cell(12, 12), cell(13, 13)),
                CompoundMove::single(cell(10, 2), cell(10, 6)),
            ]
        );

        let mut rng = StdRng::seed_from_u64(3);
        let (mv, next) = greedy.choose(&board, Side::Blue, &mut rng).unwrap();
        assert_eq!(mv, preferred[0]);
        assert_eq!(next.get_counts(Side::Brown).get(Rank::Duke), 0);
        assert!(RandomPlayout.preferred_moves(&board, Side::Blue).is_empty());
    }

    #[test]
    fn test_greedy_finds_interior_win() {
        let mut board = board();
        board
            .place_some_pieces(Side::Blue, None, &[(Rank::Sergeant, cell(20, 10))])
            .unwrap();
        let greedy = GreedyPlayout::new(RankWeights::default());
        let preferred = greedy.preferred_moves(&board, Side::Blue);
        assert_eq!(preferred[0], CompoundMove::single(cell(20, 10), cell(21, 10)));
    }

    #[test]
    fn test_playout_rewards() {
        let config = Arc::new(EngineConfig::default());
        let evaluator = WeightedEvaluator::new(config);
        let mut rng = StdRng::seed_from_u64(5);

        let mut won = board();
        won.remove_piece(cell(13, 13));
        won.remove_piece(cell(23, 23));
        let r = run_playout(won.clone(), Side::Brown, Side::Blue, &RandomPlayout, &evaluator, 10, &mut rng);
        assert!((r - 1.0).abs() < f64::EPSILON);
        let r = run_playout(won, Side::Brown, Side::Brown, &RandomPlayout, &evaluator, 10, &mut rng);
        assert!(r.abs() < f64::EPSILON);

        for _ in 0..5 {
            let r = run_playout(board(), Side::Blue, Side::Blue, &RandomPlayout, &evaluator, 30, &mut rng);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_random_agent_plays_legal_moves() {
        let mut config = EngineConfig::default();
        config.mcts.seed = Some(9);
        let mut agent = RandomAgent::new(Side::Brown, Arc::new(config));
        let mut board = board();
        let legal = board.get_all_moves(Side::Brown);
        for _ in 0..10 {
            let mv = agent.get_choice(&board).unwrap();
            assert!(legal.contains(&mv));
        }
        assert_eq!(agent.statistics().decisions().len(), 10);
    }
}
