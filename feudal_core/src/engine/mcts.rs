//! UCT Monte-Carlo tree search with optional leaf-parallel playouts.
//!
//! Nodes live in an arena and own their board. A node's utility is the
//! reward of the side that moved into it, so a parent always maximises over
//! its children's `utility / playouts`.

use crate::engine::config::{EngineConfig, ExpansionPolicy};
use crate::engine::eval::WeightedEvaluator;
use crate::engine::playout::{playout_agent, run_playout, PlayoutAgent};
use crate::engine::{Agent, Deadline, SearchStats, Statistics};
use crate::logic::board::{Board, Side};
use crate::logic::compound::{CompoundMove, MoveIndex};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// Biased draws tried before falling back to a uniform untried move.
const BIASED_ATTEMPTS: usize = 16;
// Uniform draws by position before walking the untried moves directly.
const UNIFORM_ATTEMPTS: usize = 32;

struct Node {
    board: Board,
    parent: Option<usize>,
    action: Option<CompoundMove>,
    depth: u32,
    to_move: Side,
    utility: f64,
    playouts: u64,
    children: Vec<usize>,
    tried: HashSet<CompoundMove>,
    preferred: VecDeque<CompoundMove>,
    // Single relocations, a lower bound on the number of legal moves.
    singles: usize,
    // Built when an expansion first needs it; most leaves never do.
    index: Option<MoveIndex>,
    terminal: bool,
}

impl Node {
    fn new(
        board: Board,
        parent: Option<usize>,
        action: Option<CompoundMove>,
        depth: u32,
        to_move: Side,
        policy: &dyn PlayoutAgent,
    ) -> Self {
        let terminal = board.game_over();
        let (singles, preferred) = if terminal {
            (0, VecDeque::new())
        } else {
            (
                board.pieces(to_move).map(|(_, cell)| board.count_destinations(cell)).sum::<usize>(),
                policy.preferred_moves(&board, to_move).into(),
            )
        };
        Self {
            board,
            parent,
            action,
            depth,
            to_move,
            utility: 0.0,
            playouts: 0,
            children: Vec::new(),
            tried: HashSet::new(),
            preferred,
            singles,
            index: None,
            terminal,
        }
    }

    /// Number of legal compound moves, once known.
    fn possible(&self) -> Option<usize> {
        self.index.as_ref().map(MoveIndex::total)
    }

    fn fully_expanded(&self) -> bool {
        self.tried.len() >= self.singles && self.possible().is_some_and(|possible| self.tried.len() >= possible)
    }

    // Uniform draws need the index up front; biased ones only once the
    // cheap lower bound no longer rules out full expansion.
    fn needs_index(&self, expansion: ExpansionPolicy) -> bool {
        self.index.is_none() && (expansion == ExpansionPolicy::Uniform || self.tried.len() >= self.singles)
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> f64 {
        self.utility / self.playouts.max(1) as f64
    }
}

/// Arena of search nodes; index 0 is the root.
struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    fn new(board: Board, to_move: Side, policy: &dyn PlayoutAgent) -> Self {
        Self {
            nodes: vec![Node::new(board, None, None, 0, to_move, policy)],
        }
    }

    /// Child of `idx` maximising the UCT score; the first wins ties.
    #[allow(clippy::cast_precision_loss)]
    fn best_child(&self, idx: usize, exploration: f64) -> Option<usize> {
        let parent = &self.nodes[idx];
        let log_parent = (parent.playouts.max(1) as f64).ln();
        let mut best: Option<(usize, f64)> = None;
        for &child in &parent.children {
            let node = &self.nodes[child];
            let visits = node.playouts.max(1) as f64;
            let score = exploration.mul_add((2.0 * log_parent / visits).sqrt(), node.mean());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((child, score));
            }
        }
        best.map(|(child, _)| child)
    }

    fn select(&self, exploration: f64) -> usize {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.terminal || !node.fully_expanded() {
                return idx;
            }
            match self.best_child(idx, exploration) {
                Some(child) => idx = child,
                None => return idx,
            }
        }
    }

    // Next action to try from `idx`, with the board it leads to when the
    // draw already produced one.
    fn untried_action(
        &mut self,
        idx: usize,
        expansion: ExpansionPolicy,
        rng: &mut StdRng,
    ) -> Option<(CompoundMove, Option<Board>)> {
        let Node {
            board,
            to_move,
            tried,
            preferred,
            index,
            ..
        } = &mut self.nodes[idx];

        while let Some(mv) = preferred.pop_front() {
            if !tried.contains(&mv) {
                return Some((mv, None));
            }
        }

        if expansion == ExpansionPolicy::Biased {
            for _ in 0..BIASED_ATTEMPTS {
                let (mv, next) = board.random_move(*to_move, rng)?;
                if !tried.contains(&mv) {
                    return Some((mv, Some(next)));
                }
            }
        }

        let index: &MoveIndex = index.get_or_insert_with(|| board.move_index(*to_move));
        let possible = index.total();
        if possible == 0 {
            return None;
        }
        // Rejection keeps the draw uniform over untried moves. Once half the
        // moves are tried the remaining ones are few enough to walk.
        if tried.len() * 2 < possible {
            for _ in 0..UNIFORM_ATTEMPTS {
                let mv = board.nth_compound_move(index, rng.gen_range(0..possible))?;
                if !tried.contains(&mv) {
                    return Some((mv, None));
                }
            }
        }
        board
            .compound_moves(*to_move)
            .filter(|mv| !tried.contains(mv))
            .choose(rng)
            .map(|mv| (mv, None))
    }

    /// Adds one untried child under `idx` and returns it, or `idx` itself
    /// when nothing is left to expand. `None` when the deadline passed
    /// before the child could be built.
    fn expand(
        &mut self,
        idx: usize,
        expansion: ExpansionPolicy,
        policy: &dyn PlayoutAgent,
        rng: &mut StdRng,
        deadline: &Deadline,
    ) -> Option<usize> {
        let node = &mut self.nodes[idx];
        if node.terminal || node.fully_expanded() {
            return Some(idx);
        }
        if deadline.expired() {
            return None;
        }
        if node.needs_index(expansion) {
            let index = node.board.move_index(node.to_move);
            node.index = Some(index);
            if deadline.expired() {
                return None;
            }
        }
        let Some((action, next)) = self.untried_action(idx, expansion, rng) else {
            return Some(idx);
        };
        if deadline.expired() {
            return None;
        }

        let parent = &mut self.nodes[idx];
        parent.tried.insert(action.clone());
        let side = parent.to_move;
        let depth = parent.depth + 1;
        let board = next.unwrap_or_else(|| {
            let mut board = parent.board.clone();
            board.apply_generated_moves(&action, side);
            board
        });

        let child = self.nodes.len();
        self.nodes[idx].children.push(child);
        self.nodes.push(Node::new(
            board,
            Some(idx),
            Some(action),
            depth,
            side.opposite(),
            policy,
        ));
        Some(child)
    }

    /// Credits `reward` (summed over `count` playouts, for the side that
    /// moved into `idx`) up to the root, flipping it at every ply.
    fn backpropagate(&mut self, mut idx: usize, mut reward: f64, count: u64) {
        #[allow(clippy::cast_precision_loss)]
        let total = count as f64;
        loop {
            let node = &mut self.nodes[idx];
            node.playouts += count;
            node.utility += reward;
            match node.parent {
                Some(parent) => {
                    idx = parent;
                    reward = total - reward;
                }
                None => break,
            }
        }
    }

    fn root(&self) -> &Node {
        &self.nodes[0]
    }
}

/// Seed for an unseeded agent, mixing the process id with the wall clock.
fn process_seed() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64);
    u64::from(std::process::id()).rotate_left(32) ^ nanos
}

pub struct MctsAgent {
    side: Side,
    time_ms: u64,
    config: Arc<EngineConfig>,
    evaluator: WeightedEvaluator,
    policy: Box<dyn PlayoutAgent>,
    pool: Option<rayon::ThreadPool>,
    rng: StdRng,
    stats: Statistics,
}

impl MctsAgent {
    /// Out-of-range settings in `config` are clamped first, so a zero
    /// `leaf_parallelism` still runs one playout per leaf.
    pub fn new(side: Side, time_ms: u64, config: Arc<EngineConfig>) -> Self {
        let config = Arc::new(EngineConfig::clone(&config).clamped());
        let mcts = &config.mcts;
        let pool = if mcts.leaf_parallelism > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(mcts.leaf_parallelism)
                .build()
                .map_err(|err| log::warn!("leaf playouts will run serially: {err}"))
                .ok()
        } else {
            None
        };
        Self {
            side,
            time_ms,
            evaluator: WeightedEvaluator::new(config.clone()),
            policy: playout_agent(mcts.playout, &config),
            pool,
            rng: StdRng::seed_from_u64(mcts.seed.unwrap_or_else(process_seed)),
            config,
            stats: Statistics::default(),
        }
    }

    /// Runs `count` playouts from `board`, each with its own generator, and
    /// returns the summed reward for `perspective`.
    fn simulate(&mut self, board: &Board, to_move: Side, perspective: Side, count: usize) -> f64 {
        let base: u64 = self.rng.gen();
        let turns = self.config.mcts.max_playout_turns;
        let policy = self.policy.as_ref();
        let evaluator = &self.evaluator;
        let playout = |worker: usize| {
            let mut rng = StdRng::seed_from_u64(base.wrapping_add(worker as u64));
            run_playout(board.clone(), to_move, perspective, policy, evaluator, turns, &mut rng)
        };

        match &self.pool {
            Some(pool) if count > 1 => pool.install(|| (0..count).into_par_iter().map(playout).sum::<f64>()),
            _ => (0..count).map(playout).sum(),
        }
    }

    fn grow(&mut self, board: &Board) -> (SearchTree, SearchStats) {
        let deadline = Deadline::after_ms(self.time_ms, self.config.mcts.time_safety);
        let mcts = self.config.mcts;
        let mut tree = SearchTree::new(board.clone(), self.side, self.policy.as_ref());
        let mut stats = SearchStats::default();
        let mut iterations = 0u64;

        while !deadline.expired() && mcts.max_iterations.map_or(true, |cap| iterations < cap) {
            iterations += 1;
            let leaf = tree.select(mcts.exploration);
            let Some(node) = tree.expand(leaf, mcts.expansion, self.policy.as_ref(), &mut self.rng, &deadline)
            else {
                break;
            };
            if node != leaf {
                stats.nodes_expanded += 1;
            }

            let target = &tree.nodes[node];
            stats.max_depth = stats.max_depth.max(target.depth);
            let reward = self.simulate(
                &target.board,
                target.to_move,
                target.to_move.opposite(),
                mcts.leaf_parallelism,
            );
            tree.backpropagate(node, reward, mcts.leaf_parallelism as u64);
            stats.simulations += mcts.leaf_parallelism as u64;
        }

        stats.nodes_reached = tree.nodes.len() as u64;
        stats.time_ms = deadline.elapsed_ms();
        (tree, stats)
    }

    pub fn search(&mut self, board: &Board) -> Option<(CompoundMove, SearchStats)> {
        let (tree, stats) = self.grow(board);
        let choice = tree
            .best_child(0, 0.0)
            .and_then(|child| tree.nodes[child].action.clone());

        let choice = match choice {
            Some(mv) => mv,
            None => {
                let mut scratch = board.clone();
                let fallback = match &tree.root().index {
                    Some(index) if index.total() > 0 => {
                        let n = self.rng.gen_range(0..index.total());
                        scratch.nth_compound_move(index, n)
                    }
                    _ => scratch.uniform_random_move(self.side, &mut self.rng),
                }?;
                log::warn!("mcts {} finished no simulation, playing a random move", self.side);
                fallback
            }
        };

        let root = tree.root();
        log::debug!(
            "mcts {}: {choice} after {} simulations, {} of {} root moves tried, {} nodes, depth {} in {} ms",
            self.side,
            stats.simulations,
            root.tried.len(),
            root.possible().unwrap_or_default(),
            stats.nodes_reached,
            stats.max_depth,
            stats.time_ms
        );
        Some((choice, stats))
    }
}

impl Agent for MctsAgent {
    fn side(&self) -> Side {
        self.side
    }

    fn get_choice(&mut self, board: &Board) -> Option<CompoundMove> {
        let (mv, stats) = self.search(board)?;
        self.stats.record(stats);
        Some(mv)
    }

    fn statistics(&self) -> &Statistics {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::PlayoutPolicy;
    use crate::engine::playout::RandomPlayout;
    use crate::logic::board::Cell;
    use crate::logic::piece::Rank;
    use crate::logic::terrain::Terrain;

    fn cell(r: usize, c: usize) -> Cell {
        Cell::new(r, c).unwrap()
    }

    fn config(f: impl FnOnce(&mut EngineConfig)) -> Arc<EngineConfig> {
        let mut config = EngineConfig::default();
        config.mcts.seed = Some(17);
        config.mcts.max_playout_turns = 20;
        f(&mut config);
        Arc::new(config)
    }

    fn skirmish() -> Board {
        let mut board = Board::new(Terrain::open(), 2);
        board
            .place_some_pieces(
                Side::Blue,
                None,
                &[(Rank::King, cell(2, 2)), (Rank::Sergeant, cell(5, 5))],
            )
            .unwrap();
        board
            .place_some_pieces(
                Side::Brown,
                None,
                &[(Rank::King, cell(20, 20)), (Rank::Pikemen, cell(12, 9))],
            )
            .unwrap();
        board
    }

    #[test]
    fn test_root_playouts_bounded_by_simulations() {
        let mut agent = MctsAgent::new(
            Side::Blue,
            10_000,
            config(|c| c.mcts.max_iterations = Some(150)),
        );
        let (tree, stats) = agent.grow(&skirmish());
        let root = tree.root();
        let children: u64 = root.children.iter().map(|&c| tree.nodes[c].playouts).sum();
        assert_eq!(stats.simulations, 150);
        assert_eq!(root.playouts, stats.simulations);
        assert!(children <= stats.simulations);
        assert_eq!(root.children.len(), root.tried.len());
        assert!(stats.nodes_reached > 1);
    }

    #[test]
    fn test_zero_exploration_prefers_best_mean() {
        let board = skirmish();
        let mut tree = SearchTree::new(board.clone(), Side::Blue, &RandomPlayout);
        for (utility, playouts) in [(3.0, 10), (6.0, 10), (1.0, 2)] {
            let child = tree.nodes.len();
            let mut node = Node::new(board.clone(), Some(0), None, 1, Side::Brown, &RandomPlayout);
            node.utility = utility;
            node.playouts = playouts;
            tree.nodes.push(node);
            tree.nodes[0].children.push(child);
            tree.nodes[0].playouts += playouts;
        }
        assert_eq!(tree.best_child(0, 0.0), Some(2));

        tree.nodes[1].utility = 7.0;
        assert_eq!(tree.best_child(0, 0.0), Some(1));
        // Exploration favours the barely visited child.
        assert_eq!(tree.best_child(0, 10.0), Some(3));
    }

    #[test]
    fn test_backpropagation_alternates() {
        let board = skirmish();
        let mut tree = SearchTree::new(board.clone(), Side::Blue, &RandomPlayout);
        tree.nodes.push(Node::new(board.clone(), Some(0), None, 1, Side::Brown, &RandomPlayout));
        tree.nodes.push(Node::new(board, Some(1), None, 2, Side::Blue, &RandomPlayout));
        tree.backpropagate(2, 2.5, 3);
        assert!((tree.nodes[2].utility - 2.5).abs() < 1e-12);
        assert!((tree.nodes[1].utility - 0.5).abs() < 1e-12);
        assert!((tree.nodes[0].utility - 2.5).abs() < 1e-12);
        assert!(tree.nodes.iter().all(|n| n.playouts == 3));
    }

    #[test]
    fn test_returns_legal_move() {
        let mut board = skirmish();
        let legal = board.get_all_moves(Side::Brown);
        for expansion in [ExpansionPolicy::Uniform, ExpansionPolicy::Biased] {
            let mut agent = MctsAgent::new(
                Side::Brown,
                5_000,
                config(|c| {
                    c.mcts.max_iterations = Some(60);
                    c.mcts.expansion = expansion;
                }),
            );
            let mv = agent.get_choice(&board).unwrap();
            assert!(legal.contains(&mv), "{mv}");
            assert_eq!(agent.statistics().last().map(|s| s.simulations), Some(60));
        }
    }

    #[test]
    fn test_greedy_playouts_take_the_win() {
        let mut board = Board::new(Terrain::open(), 1);
        board
            .place_some_pieces(
                Side::Blue,
                None,
                &[(Rank::King, cell(0, 0)), (Rank::Knight, cell(10, 2))],
            )
            .unwrap();
        board
            .place_some_pieces(
                Side::Brown,
                None,
                &[(Rank::Duke, cell(10, 9)), (Rank::Pikemen, cell(23, 23))],
            )
            .unwrap();
        let mut agent = MctsAgent::new(
            Side::Blue,
            10_000,
            config(|c| {
                c.mcts.max_iterations = Some(80);
                c.mcts.playout = PlayoutPolicy::Greedy;
            }),
        );
        let mv = agent.get_choice(&board).unwrap();
        assert_eq!(mv, CompoundMove::single(cell(10, 2), cell(10, 9)));
    }

    #[test]
    fn test_leaf_parallel_playouts() {
        let mut agent = MctsAgent::new(
            Side::Blue,
            10_000,
            config(|c| {
                c.mcts.max_iterations = Some(20);
                c.mcts.leaf_parallelism = 3;
            }),
        );
        let (tree, stats) = agent.grow(&skirmish());
        assert_eq!(stats.simulations, 60);
        assert_eq!(tree.root().playouts, 60);
        assert!(tree.root().utility <= 60.0);
    }

    #[test]
    fn test_expansion_covers_each_move_once() {
        let mut board = skirmish();
        let legal: HashSet<CompoundMove> = board.get_all_moves(Side::Blue).into_iter().collect();
        let mut rng = StdRng::seed_from_u64(4);
        let deadline = Deadline::unlimited();
        for expansion in [ExpansionPolicy::Uniform, ExpansionPolicy::Biased] {
            let mut tree = SearchTree::new(board.clone(), Side::Blue, &RandomPlayout);
            let mut seen = HashSet::new();
            while let Some(child) = tree.expand(0, expansion, &RandomPlayout, &mut rng, &deadline) {
                if child == 0 {
                    break;
                }
                let action = tree.nodes[child].action.clone().unwrap();
                assert!(legal.contains(&action), "{action}");
                assert!(seen.insert(action));
            }
            assert_eq!(seen, legal);
            assert!(tree.root().fully_expanded());
            assert_eq!(tree.root().possible(), Some(legal.len()));
        }
    }

    #[test]
    fn test_only_expanded_nodes_carry_an_index() {
        for expansion in [ExpansionPolicy::Uniform, ExpansionPolicy::Biased] {
            let mut agent = MctsAgent::new(
                Side::Blue,
                10_000,
                config(|c| {
                    c.mcts.max_iterations = Some(12);
                    c.mcts.expansion = expansion;
                }),
            );
            let (tree, _) = agent.grow(&skirmish());
            assert!(tree.nodes.iter().all(|n| n.index.is_none() || !n.children.is_empty()));
            assert_eq!(tree.root().index.is_some(), expansion == ExpansionPolicy::Uniform);
            assert!(!tree.root().fully_expanded());
        }
    }

    #[test]
    fn test_expansion_stops_at_deadline() {
        let mut tree = SearchTree::new(skirmish(), Side::Blue, &RandomPlayout);
        let mut rng = StdRng::seed_from_u64(1);
        let expired = Deadline::after_ms(0, 0.9);
        assert_eq!(
            tree.expand(0, ExpansionPolicy::Uniform, &RandomPlayout, &mut rng, &expired),
            None
        );
        assert!(tree.root().children.is_empty());
        assert!(tree.root().tried.is_empty());
    }

    #[test]
    fn test_zero_parallelism_is_clamped() {
        let mut agent = MctsAgent::new(
            Side::Blue,
            10_000,
            config(|c| {
                c.mcts.max_iterations = Some(12);
                c.mcts.leaf_parallelism = 0;
                c.mcts.time_safety = f64::NAN;
            }),
        );
        let (tree, stats) = agent.grow(&skirmish());
        assert_eq!(stats.simulations, 12);
        assert_eq!(tree.root().playouts, 12);
    }

    #[test]
    fn test_expired_budget_falls_back_to_random_legal_move() {
        let mut board = skirmish();
        let legal = board.get_all_moves(Side::Blue);
        let mut agent = MctsAgent::new(Side::Blue, 0, config(|_| {}));
        let (mv, stats) = agent.search(&board).unwrap();
        assert_eq!(stats.simulations, 0);
        assert!(legal.contains(&mv));
    }
}
