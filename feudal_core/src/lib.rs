//! Move generation and adversarial search for a feudal-era strategy game on
//! a 24x24 board with terrain, castles and multi-piece turns.

pub mod engine;
pub mod error;
pub mod logic;

pub use error::{FeudalError, MoveError, SetupError};
