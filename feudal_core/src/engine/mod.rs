use crate::logic::board::{Board, Side};
use crate::logic::compound::CompoundMove;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub mod config;
pub mod eval;
pub mod mcts;
pub mod negamax;
pub mod playout;
pub mod tt;
pub mod zobrist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchLimit {
    Depth(u8),
    Time(u64), // milliseconds
}

/// Counters for one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Deepest fully completed iteration (negamax only).
    pub depth: u8,
    pub max_depth: u32,
    pub nodes_reached: u64,
    pub nodes_expanded: u64,
    pub nodes_pruned: u64,
    pub tt_hits: u64,
    pub simulations: u64,
    pub time_ms: u64,
}

/// Per-decision history of an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    decisions: Vec<SearchStats>,
}

impl Statistics {
    pub fn record(&mut self, stats: SearchStats) {
        self.decisions.push(stats);
    }

    #[must_use]
    pub fn decisions(&self) -> &[SearchStats] {
        &self.decisions
    }

    #[must_use]
    pub fn last(&self) -> Option<&SearchStats> {
        self.decisions.last()
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self, field: impl Fn(&SearchStats) -> u64) -> f64 {
        if self.decisions.is_empty() {
            return 0.0;
        }
        let total: u64 = self.decisions.iter().map(field).sum();
        total as f64 / self.decisions.len() as f64
    }

    #[must_use]
    pub fn average_simulations(&self) -> f64 {
        self.average(|s| s.simulations)
    }

    #[must_use]
    pub fn average_max_depth(&self) -> f64 {
        self.average(|s| u64::from(s.max_depth))
    }

    /// Mean search time per simulation in milliseconds, 0 when nothing ran.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ms_per_simulation(&self) -> f64 {
        let sims: u64 = self.decisions.iter().map(|s| s.simulations).sum();
        if sims == 0 {
            return 0.0;
        }
        let ms: u64 = self.decisions.iter().map(|s| s.time_ms).sum();
        ms as f64 / sims as f64
    }
}

/// Wall-clock budget for one decision.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            start: Instant::now(),
            budget: None,
        }
    }

    /// `safety` scales the budget down to leave room for returning a move.
    #[must_use]
    pub fn after_ms(ms: u64, safety: f64) -> Self {
        Self {
            start: Instant::now(),
            budget: Some(Duration::from_millis(ms).mul_f64(safety.clamp(0.0, 1.0))),
        }
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.start.elapsed() >= budget)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Static position scoring shared by both search engines.
pub trait Evaluator {
    /// Score of `board` from `perspective`'s point of view.
    fn evaluate(&self, board: &Board, perspective: Side) -> f64;
}

/// A player that picks one compound move per turn.
pub trait Agent {
    fn side(&self) -> Side;

    /// `None` only when the side has no legal move at all.
    fn get_choice(&mut self, board: &Board) -> Option<CompoundMove>;

    fn statistics(&self) -> &Statistics;
}
