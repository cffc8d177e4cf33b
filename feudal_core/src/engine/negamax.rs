//! Iterative-deepening alpha-beta negamax over compound moves.
//!
//! The tree walk is an explicit frame stack. A frame is pushed unvisited;
//! the first time it is popped its move is applied and it either resolves
//! (table hit, terminal, horizon) or pushes its children. The second time it
//! is popped its move is undone and its value flows into the parent.

use crate::engine::config::{EngineConfig, SearchDriver};
use crate::engine::eval::{terminal_value, WeightedEvaluator, TERMINAL_VALUE};
use crate::engine::tt::{TTFlag, TranspositionTable};
use crate::engine::{Agent, Deadline, Evaluator, SearchLimit, SearchStats, Statistics};
use crate::logic::board::{Board, Side, UndoRecord};
use crate::logic::compound::CompoundMove;
use std::cmp::Ordering;
use std::sync::Arc;

const FULL_WINDOW: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);
// Width of an MTD(f) null window, on the evaluation scale.
const MTDF_STEP: f64 = 1e-4;
const MTDF_MAX_PASSES: usize = 64;
// Generated moves between deadline checks while listing children.
const DEADLINE_STRIDE: usize = 256;

struct Frame {
    depth: u8,
    mv: Option<CompoundMove>,
    to_move: Side,
    alpha: f64,
    beta: f64,
    value: f64,
    alpha_orig: f64,
    parent: usize,
    visited: bool,
    // Value came straight from the table; nothing new to store.
    cached: bool,
    undo: Vec<UndoRecord>,
}

impl Frame {
    fn root(to_move: Side, (alpha, beta): (f64, f64)) -> Self {
        Self {
            alpha,
            beta,
            ..Self::child(0, None, to_move, 0)
        }
    }

    fn child(depth: u8, mv: Option<CompoundMove>, to_move: Side, parent: usize) -> Self {
        Self {
            depth,
            mv,
            to_move,
            alpha: f64::NEG_INFINITY,
            beta: f64::INFINITY,
            value: f64::NEG_INFINITY,
            alpha_orig: f64::NEG_INFINITY,
            parent,
            visited: false,
            cached: false,
            undo: Vec::new(),
        }
    }
}

enum Iteration {
    Complete {
        best: Option<CompoundMove>,
        value: f64,
        // Some leaf was cut by the depth limit, so deeper search can differ.
        horizon_hit: bool,
    },
    TimedOut {
        partial: Option<CompoundMove>,
    },
}

pub struct NegamaxAgent {
    side: Side,
    limit: SearchLimit,
    config: Arc<EngineConfig>,
    evaluator: WeightedEvaluator,
    tt: Option<TranspositionTable>,
    stats: Statistics,
}

impl NegamaxAgent {
    /// `config` is clamped before use.
    pub fn new(side: Side, limit: SearchLimit, config: Arc<EngineConfig>) -> Self {
        let config = Arc::new(EngineConfig::clone(&config).clamped());
        let tt = config
            .negamax
            .use_transposition_table
            .then(|| TranspositionTable::new(config.negamax.tt_size_mb));
        Self {
            side,
            limit,
            evaluator: WeightedEvaluator::new(config.clone()),
            config,
            tt,
            stats: Statistics::default(),
        }
    }

    /// Searches `board` in place for `self.side`. The board is left exactly
    /// as it was found, including after a timeout.
    pub fn search(&mut self, board: &mut Board) -> Option<(CompoundMove, SearchStats)> {
        let (max_depth, deadline) = match self.limit {
            SearchLimit::Depth(d) => (d.max(1), Deadline::unlimited()),
            SearchLimit::Time(ms) => (
                self.config.negamax.max_depth,
                Deadline::after_ms(ms, self.config.negamax.time_safety),
            ),
        };
        let mut stats = SearchStats::default();
        if let Some(tt) = self.tt.as_mut() {
            tt.clear();
        }

        if let Some(win) = immediate_win(board, self.side, &deadline) {
            log::debug!("{} takes an immediate win: {win}", self.side);
            stats.time_ms = deadline.elapsed_ms();
            return Some((win, stats));
        }

        let mut best: Option<(CompoundMove, f64)> = None;
        let mut partial = None;
        let mut guess = 0.0;
        for depth_limit in 1..=max_depth {
            let outcome = match self.config.negamax.driver {
                SearchDriver::AlphaBeta => self.iterate(board, depth_limit, FULL_WINDOW, &deadline, &mut stats),
                SearchDriver::MtdF => self.mtdf(board, depth_limit, guess, &deadline, &mut stats),
            };
            match outcome {
                Iteration::Complete {
                    best: Some(mv),
                    value,
                    horizon_hit,
                } => {
                    stats.depth = depth_limit;
                    log::trace!(
                        "depth {depth_limit} complete: {mv} scores {value:.3} after {} nodes",
                        stats.nodes_reached
                    );
                    best = Some((mv, value));
                    guess = value;
                    if !horizon_hit || value.abs() >= TERMINAL_VALUE {
                        break;
                    }
                }
                Iteration::Complete { best: None, .. } => break,
                Iteration::TimedOut { partial: found } => {
                    partial = found;
                    break;
                }
            }
            if deadline.expired() {
                break;
            }
        }
        stats.time_ms = deadline.elapsed_ms();

        let choice = match (best, partial) {
            (Some((mv, _)), _) => Some(mv),
            (None, Some(mv)) => {
                log::warn!("no search iteration completed, using the partial root best");
                Some(mv)
            }
            (None, None) => {
                let first = board.compound_moves(self.side).next();
                if first.is_some() {
                    log::warn!("no search iteration completed, falling back to the first legal move");
                }
                first
            }
        }?;

        log::debug!(
            "negamax {}: {choice} depth {} reached {} expanded {} pruned {} tt hits {} in {} ms",
            self.side,
            stats.depth,
            stats.nodes_reached,
            stats.nodes_expanded,
            stats.nodes_pruned,
            stats.tt_hits,
            stats.time_ms
        );
        Some((choice, stats))
    }

    /// One depth of MTD(f): null-window passes around `guess` until the
    /// bounds on the root value meet.
    fn mtdf(
        &mut self,
        board: &mut Board,
        depth_limit: u8,
        guess: f64,
        deadline: &Deadline,
        stats: &mut SearchStats,
    ) -> Iteration {
        let (mut lower, mut upper) = FULL_WINDOW;
        let mut value = guess;
        let mut best = None;
        let mut horizon = false;

        for _ in 0..MTDF_MAX_PASSES {
            if lower >= upper {
                break;
            }
            let beta = if value <= lower { value + MTDF_STEP } else { value };
            match self.iterate(board, depth_limit, (beta - MTDF_STEP, beta), deadline, stats) {
                Iteration::Complete {
                    best: None,
                    value,
                    horizon_hit,
                } => {
                    return Iteration::Complete {
                        best: None,
                        value,
                        horizon_hit,
                    }
                }
                Iteration::Complete {
                    best: Some(mv),
                    value: found,
                    horizon_hit,
                } => {
                    horizon |= horizon_hit;
                    value = found;
                    if found >= beta {
                        // Fail high: `mv` is proven at least this good.
                        lower = found;
                        best = Some(mv);
                    } else {
                        upper = found;
                        best = best.or(Some(mv));
                    }
                }
                Iteration::TimedOut { partial } => {
                    return Iteration::TimedOut {
                        partial: best.or(partial),
                    }
                }
            }
        }
        log::trace!("mtd(f) depth {depth_limit} settled on {value:.4} in [{lower:.4}, {upper:.4}]");

        Iteration::Complete {
            best,
            value,
            horizon_hit: horizon,
        }
    }

    /// Moves of `side`, best static score first when ordering is enabled,
    /// canonical order otherwise. `None` once the deadline passes.
    fn children(&self, board: &mut Board, side: Side, deadline: &Deadline) -> Option<Vec<CompoundMove>> {
        let ordering = self.config.negamax.move_ordering;
        let mut scored: Vec<(f64, CompoundMove)> = Vec::new();
        let mut moves = board.compound_moves(side);
        while let Some(mv) = moves.next() {
            if scored.len() % DEADLINE_STRIDE == 0 && deadline.expired() {
                return None;
            }
            let score = if ordering {
                let after = moves.board();
                terminal_value(after, side).unwrap_or_else(|| self.evaluator.evaluate(after, side))
            } else {
                0.0
            };
            scored.push((score, mv));
        }
        if ordering {
            // Stable, so equal scores keep canonical order.
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        }
        Some(scored.into_iter().map(|(_, mv)| mv).collect())
    }

    #[allow(clippy::too_many_lines)]
    fn iterate(
        &mut self,
        board: &mut Board,
        depth_limit: u8,
        window: (f64, f64),
        deadline: &Deadline,
        stats: &mut SearchStats,
    ) -> Iteration {
        let mut stack = vec![Frame::root(self.side, window)];
        let mut root_best: Option<CompoundMove> = None;
        let mut horizon_hit = false;

        while let Some(top) = stack.len().checked_sub(1) {
            if deadline.expired() {
                unwind(&stack, board);
                return Iteration::TimedOut { partial: root_best };
            }

            if !stack[top].visited {
                // Window from the parent's current bounds.
                let (alpha, beta) = if top == 0 {
                    window
                } else {
                    let parent = &stack[stack[top].parent];
                    (-parent.beta, -parent.alpha)
                };

                let frame = &mut stack[top];
                frame.visited = true;
                frame.alpha = alpha;
                frame.beta = beta;
                stats.max_depth = stats.max_depth.max(u32::from(frame.depth));
                if let Some(mv) = &frame.mv {
                    frame.undo = board.apply_generated_moves(mv, frame.to_move.opposite());
                }

                let remaining = depth_limit - frame.depth;
                if frame.depth > 0 {
                    if let Some(tt) = &self.tt {
                        if let Some(entry) = tt.lookup(board.hash_key(frame.to_move)) {
                            if entry.depth >= remaining {
                                stats.tt_hits += 1;
                                match entry.flag {
                                    TTFlag::Exact => frame.cached = true,
                                    TTFlag::LowerBound => frame.alpha = frame.alpha.max(entry.value),
                                    TTFlag::UpperBound => frame.beta = frame.beta.min(entry.value),
                                }
                                if frame.alpha >= frame.beta {
                                    frame.cached = true;
                                }
                                if frame.cached {
                                    frame.value = entry.value;
                                    continue;
                                }
                            }
                        }
                    }
                }
                frame.alpha_orig = frame.alpha;

                if let Some(value) = terminal_value(board, frame.to_move) {
                    frame.value = value;
                    continue;
                }
                if remaining == 0 {
                    horizon_hit = true;
                    frame.value = self.evaluator.evaluate(board, frame.to_move);
                    continue;
                }

                let to_move = frame.to_move;
                let depth = frame.depth;
                let Some(children) = self.children(board, to_move, deadline) else {
                    unwind(&stack, board);
                    return Iteration::TimedOut { partial: root_best };
                };
                if children.is_empty() {
                    stack[top].value = self.evaluator.evaluate(board, to_move);
                    continue;
                }
                stats.nodes_expanded += 1;
                stats.nodes_reached += children.len() as u64;
                // Reversed so the first listed move is searched first.
                for mv in children.into_iter().rev() {
                    stack.push(Frame::child(depth + 1, Some(mv), to_move.opposite(), top));
                }
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let key = board.hash_key(frame.to_move);
            board.reverse_apply_moves(&frame.undo);
            if top == 0 {
                return Iteration::Complete {
                    best: root_best,
                    value: frame.value,
                    horizon_hit,
                };
            }

            if !frame.cached {
                if let Some(tt) = self.tt.as_mut() {
                    let flag = if frame.value <= frame.alpha_orig {
                        TTFlag::UpperBound
                    } else if frame.value >= frame.beta {
                        TTFlag::LowerBound
                    } else {
                        TTFlag::Exact
                    };
                    tt.store(key, frame.value, depth_limit - frame.depth, flag);
                }
            }

            let parent = &mut stack[frame.parent];
            let value = -frame.value;
            if value > parent.value {
                parent.value = value;
                if frame.depth == 1 {
                    root_best = frame.mv;
                }
            }
            if value > parent.alpha {
                parent.alpha = value;
            }
            if parent.alpha >= parent.beta {
                let keep = frame.parent + 1;
                stats.nodes_pruned += (stack.len() - keep) as u64;
                stack.truncate(keep);
            }
        }

        Iteration::Complete {
            best: root_best,
            value: f64::NEG_INFINITY,
            horizon_hit,
        }
    }
}

// Undoes every applied frame, innermost first.
fn unwind(stack: &[Frame], board: &mut Board) {
    for frame in stack.iter().rev() {
        board.reverse_apply_moves(&frame.undo);
    }
}

/// A compound move after which the opponent has lost and `side` has not.
fn immediate_win(board: &mut Board, side: Side, deadline: &Deadline) -> Option<CompoundMove> {
    let mut moves = board.compound_moves(side);
    while let Some(mv) = moves.next() {
        if deadline.expired() {
            return None;
        }
        if terminal_value(moves.board(), side) == Some(TERMINAL_VALUE) {
            return Some(mv);
        }
    }
    None
}

impl Agent for NegamaxAgent {
    fn side(&self) -> Side {
        self.side
    }

    fn get_choice(&mut self, board: &Board) -> Option<CompoundMove> {
        let mut scratch = board.clone();
        let (mv, stats) = self.search(&mut scratch)?;
        self.stats.record(stats);
        Some(mv)
    }

    fn statistics(&self) -> &Statistics {
        &self.stats
    }
}
