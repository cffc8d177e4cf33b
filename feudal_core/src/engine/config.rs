use crate::logic::piece::Rank;
use serde::{Deserialize, Serialize};

/// Relative value of each rank inside its material group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    pub king: f64,
    pub prince: f64,
    pub duke: f64,
    pub knight: f64,
    pub sergeant: f64,
    pub pikemen: f64,
    pub squire: f64,
    pub archer: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            king: 1.0,
            prince: 2.0,
            duke: 2.0,
            knight: 2.0,
            sergeant: 1.0,
            pikemen: 1.0,
            squire: 1.0,
            archer: 1.0,
        }
    }
}

impl RankWeights {
    #[must_use]
    pub const fn get(&self, rank: Rank) -> f64 {
        match rank {
            Rank::King => self.king,
            Rank::Prince => self.prince,
            Rank::Duke => self.duke,
            Rank::Knight => self.knight,
            Rank::Sergeant => self.sergeant,
            Rank::Pikemen => self.pikemen,
            Rank::Squire => self.squire,
            Rank::Archer => self.archer,
        }
    }
}

/// Weights of the static evaluation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalWeights {
    pub royalty: f64,
    pub other: f64,
    pub progress: f64,
    pub castle: f64,
    pub ranks: RankWeights,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            royalty: 0.4,
            other: 0.4,
            progress: 0.1,
            castle: 0.1,
            ranks: RankWeights::default(),
        }
    }
}

/// How each iterative-deepening step is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDriver {
    /// One full-window alpha-beta pass per depth.
    #[default]
    AlphaBeta,
    /// Null-window passes converging on the value (MTD(f)), seeded with the
    /// previous depth's value. Relies on the transposition table.
    MtdF,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegamaxConfig {
    pub use_transposition_table: bool,
    pub tt_size_mb: usize,
    /// Fraction of the time budget actually spent searching.
    pub time_safety: f64,
    pub max_depth: u8,
    /// Search children in order of their static evaluation, best first.
    pub move_ordering: bool,
    pub driver: SearchDriver,
}

impl Default for NegamaxConfig {
    fn default() -> Self {
        Self {
            use_transposition_table: true,
            tt_size_mb: 16,
            time_safety: 0.9,
            max_depth: 32,
            move_ordering: true,
            driver: SearchDriver::AlphaBeta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayoutPolicy {
    #[default]
    Random,
    Greedy,
}

/// How an untried action is drawn once the preferred queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionPolicy {
    /// Uniform over all untried compound moves. Each expanded node first
    /// counts its moves, which is costly on full armies.
    Uniform,
    /// Repeated biased random moves, falling back to uniform when they keep
    /// hitting tried actions.
    #[default]
    Biased,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctsConfig {
    /// Exploration constant `c` of the UCT formula.
    pub exploration: f64,
    pub playout: PlayoutPolicy,
    pub expansion: ExpansionPolicy,
    /// Playouts longer than this many turns are scored by the evaluator.
    pub max_playout_turns: u32,
    /// Number of concurrent playouts per expanded leaf.
    pub leaf_parallelism: usize,
    pub max_iterations: Option<u64>,
    pub time_safety: f64,
    pub seed: Option<u64>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            exploration: std::f64::consts::FRAC_1_SQRT_2,
            playout: PlayoutPolicy::Random,
            expansion: ExpansionPolicy::Biased,
            max_playout_turns: 200,
            leaf_parallelism: 1,
            max_iterations: None,
            time_safety: 0.9,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub eval: EvalWeights,
    pub negamax: NegamaxConfig,
    pub mcts: MctsConfig,
}

impl EngineConfig {
    /// Reads a configuration where every field is optional; missing fields
    /// keep their defaults and out-of-range values are clamped.
    pub fn load_from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json_str)?;
        Ok(config.clamped())
    }

    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.negamax.time_safety = clamp_fraction(self.negamax.time_safety);
        self.negamax.max_depth = self.negamax.max_depth.max(1);
        self.mcts.time_safety = clamp_fraction(self.mcts.time_safety);
        self.mcts.leaf_parallelism = self.mcts.leaf_parallelism.max(1);
        self.mcts.max_playout_turns = self.mcts.max_playout_turns.max(1);
        if !self.mcts.exploration.is_finite() || self.mcts.exploration < 0.0 {
            self.mcts.exploration = MctsConfig::default().exploration;
        }
        self
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(1.0)
    } else {
        0.9
    }
}
