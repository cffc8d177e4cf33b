use crate::engine::Agent;
use crate::error::{FeudalError, MoveError};
use crate::logic::board::{Board, Side};
use crate::logic::compound::CompoundMove;
use crate::logic::piece::Piece;
use serde::{Deserialize, Serialize};

/// Turn cap used by [`GameState::default`].
pub const DEFAULT_MAX_TURNS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Playing,
    Won(Side),
    /// Both sides lost at once, the side to move was stuck, or the turn cap
    /// ran out.
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub side: Side,
    pub mv: CompoundMove,
    pub captured: Vec<Piece>,
    pub hash: u64,
}

/// A game between two sides on an already populated board.
#[derive(Debug, Clone)]
pub struct GameState {
    pub board: Board,
    pub turn: Side,
    pub status: GameStatus,
    pub history: Vec<TurnRecord>,
    pub max_turns: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Board::default(), DEFAULT_MAX_TURNS)
    }
}

impl GameState {
    /// Blue moves first.
    #[must_use]
    pub fn new(board: Board, max_turns: u32) -> Self {
        let mut state = Self {
            board,
            turn: Side::Blue,
            status: GameStatus::Playing,
            history: Vec::new(),
            max_turns,
        };
        state.update_status();
        state
    }

    /// Plays one validated compound move for the side to move.
    pub fn play_turn(&mut self, mv: &CompoundMove) -> Result<GameStatus, MoveError> {
        if self.status != GameStatus::Playing {
            return Err(MoveError::GameOver);
        }
        let records = self.board.play_moves(mv, self.turn)?;

        self.history.push(TurnRecord {
            side: self.turn,
            mv: mv.clone(),
            captured: records.iter().filter_map(|r| r.captured).collect(),
            hash: self.board.hash_key(self.turn.opposite()),
        });
        self.turn = self.turn.opposite();
        self.update_status();
        Ok(self.status)
    }

    fn update_status(&mut self) {
        self.status = if self.board.game_over() {
            self.board.winner().map_or(GameStatus::Draw, GameStatus::Won)
        } else if !self.board.has_moves(self.turn) || self.history.len() >= self.max_turns as usize {
            GameStatus::Draw
        } else {
            GameStatus::Playing
        };
    }

    /// Lets `blue` and `brown` alternate until the game ends.
    pub fn play(&mut self, blue: &mut dyn Agent, brown: &mut dyn Agent) -> Result<GameStatus, FeudalError> {
        for (seat, side) in [(Side::Blue, blue.side()), (Side::Brown, brown.side())] {
            if seat != side {
                return Err(MoveError::NotYourTurn(side).into());
            }
        }

        while self.status == GameStatus::Playing {
            let choice = match self.turn {
                Side::Blue => blue.get_choice(&self.board),
                Side::Brown => brown.get_choice(&self.board),
            };
            let Some(mv) = choice else {
                log::warn!("{} returned no move although it has one", self.turn);
                self.status = GameStatus::Draw;
                break;
            };
            log::debug!("turn {}: {} plays {mv}", self.history.len() + 1, self.turn);
            self.play_turn(&mv)?;
        }

        log::info!("game over after {} turns: {:?}", self.history.len(), self.status);
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
                Some(Castle {
                    green: cell(1, 3),
                    interior: cell(0, 3),
                }),
                &[(Rank::King, cell(2, 2)), (Rank::Knight, cell(10, 2))],
            )
            .unwrap();
        board
            .place_some_pieces(
                Side::Brown,
                None,
                &[(Rank::Duke, cell(10, 9)), (Rank::Pikemen, cell(23, 23))],
            )
            .unwrap();
        board
    }

    #[test]
    fn test_turns_alternate_and_record() {
        let mut game = GameState::new(board(), 10);
        assert_eq!(game.status, GameStatus::Playing);

        let quiet = CompoundMove::single(cell(2, 2), cell(3, 2));
        assert_eq!(game.play_turn(&quiet), Ok(GameStatus::Playing));
        assert_eq!(game.turn, Side::Brown);
        assert_eq!(game.history[0].side, Side::Blue);
        assert_eq!(game.history[0].hash, game.board.hash_key(Side::Brown));

        // Blue cannot move twice.
        let again = CompoundMove::single(cell(3, 2), cell(4, 2));
        assert_eq!(
            game.play_turn(&again),
            Err(MoveError::WrongSide {
                cell: cell(3, 2),
                side: Side::Brown
            })
        );
        assert_eq!(game.history.len(), 1);
    }

    #[test]
    fn test_capture_of_last_royal_wins() {
        let mut game = GameState::new(board(), 10);
        let take = CompoundMove::single(cell(10, 2), cell(10, 9));
        assert_eq!(game.play_turn(&take), Ok(GameStatus::Won(Side::Blue)));
        assert_eq!(game.history[0].captured.len(), 1);
        assert_eq!(game.history[0].captured[0].rank, Rank::Duke);
        assert_eq!(
            game.play_turn(&CompoundMove::single(cell(23, 23), cell(22, 23))),
            Err(MoveError::GameOver)
        );
    }

    #[test]
    fn test_turn_cap_is_a_draw() {
        let mut game = GameState::new(board(), 1);
        let quiet = CompoundMove::single(cell(2, 2), cell(3, 2));
        assert_eq!(game.play_turn(&quiet), Ok(GameStatus::Draw));
    }

    #[test]
    fn test_illegal_turn_leaves_state() {
        let mut game = GameState::new(board(), 10);
        let before = game.board.clone();
        let bad = CompoundMove::single(cell(2, 2), cell(9, 2));
        assert!(game.play_turn(&bad).is_err());
        assert_eq!(game.board, before);
        assert_eq!(game.turn, Side::Blue);
        assert!(game.history.is_empty());
    }
}
