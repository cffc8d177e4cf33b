//! Army placement before the first turn.

use crate::error::{FeudalError, SetupError};
use crate::logic::board::{Board, Castle, Cell, Side, BOARD_SIZE};
use crate::logic::piece::{Piece, Rank};
use crate::logic::terrain::Terrain;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Rows a side may place its castle and pieces on.
#[must_use]
pub const fn setup_rows(side: Side) -> RangeInclusive<u8> {
    match side {
        Side::Blue => 0..=11,
        Side::Brown => 12..=23,
    }
}

fn in_setup_area(cell: Cell, side: Side) -> bool {
    cell.is_on_board() && setup_rows(side).contains(&cell.row)
}

/// A full army for one side: castle cells plus a cell for every piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub castle: Castle,
    pub king: Cell,
    pub prince: Cell,
    pub duke: Cell,
    pub knights: [Cell; 2],
    pub sergeants: [Cell; 2],
    pub pikemen: [Cell; 4],
    pub squire: Cell,
    pub archer: Cell,
}

// Instance numbers: 0 for single ranks, 1-based otherwise.
fn instances(rank: Rank, cells: &[Cell]) -> impl Iterator<Item = (Rank, u8, Cell)> + '_ {
    let multi = rank.full_count() > 1;
    cells
        .iter()
        .zip(0u8..)
        .map(move |(&cell, i)| (rank, if multi { i + 1 } else { 0 }, cell))
}

// Terrain and castle restrictions on where a rank may start.
fn check_start_cell(
    terrain: &Terrain,
    castles: &[Castle],
    rank: Rank,
    cell: Cell,
) -> Result<(), SetupError> {
    let in_castle = castles
        .iter()
        .any(|c| c.green == cell || c.interior == cell);
    let reason = if !in_castle && terrain.is_mountain(cell) {
        Some("mountain")
    } else if !in_castle && rank.rules().blocked_by_rough && terrain.is_rough(cell) {
        Some("mounted rank on rough ground")
    } else if matches!(rank, Rank::Archer | Rank::Squire)
        && castles.iter().any(|c| c.interior == cell)
    {
        Some("rank may not start inside a castle")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SetupError::IllegalPlacement { rank, cell, reason }),
        None => Ok(()),
    }
}

fn check_castle(castle: Castle) -> Result<(), SetupError> {
    if castle.green.is_orthogonal_neighbour(castle.interior) {
        Ok(())
    } else {
        Err(SetupError::CastleNotAdjacent {
            green: castle.green,
            interior: castle.interior,
        })
    }
}

impl Placement {
    /// Every piece with its instance number and starting cell, in rank order.
    #[must_use]
    pub fn pieces(&self) -> Vec<(Rank, u8, Cell)> {
        let mut out = Vec::with_capacity(13);
        out.extend(instances(Rank::King, std::slice::from_ref(&self.king)));
        out.extend(instances(Rank::Prince, std::slice::from_ref(&self.prince)));
        out.extend(instances(Rank::Duke, std::slice::from_ref(&self.duke)));
        out.extend(instances(Rank::Knight, &self.knights));
        out.extend(instances(Rank::Sergeant, &self.sergeants));
        out.extend(instances(Rank::Pikemen, &self.pikemen));
        out.extend(instances(Rank::Squire, std::slice::from_ref(&self.squire)));
        out.extend(instances(Rank::Archer, std::slice::from_ref(&self.archer)));
        out
    }

    /// Checks the placement against the terrain for `side`.
    pub fn validate(&self, terrain: &Terrain, side: Side) -> Result<(), SetupError> {
        let pieces = self.pieces();
        let castle_cells = [self.castle.green, self.castle.interior];
        for cell in castle_cells
            .iter()
            .chain(pieces.iter().map(|(_, _, cell)| cell))
        {
            if !in_setup_area(*cell, side) {
                return Err(SetupError::OutsideSetupArea { cell: *cell, side });
            }
        }
        check_castle(self.castle)?;

        let mut used = vec![self.castle.green];
        for &(rank, _, cell) in &pieces {
            if used.contains(&cell) {
                return Err(SetupError::CellOccupied(cell));
            }
            used.push(cell);
            check_start_cell(terrain, &[self.castle], rank, cell)?;
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, FeudalError> {
        Ok(serde_json::from_str(text)?)
    }

    /// A random legal placement: the interior anywhere in the side's half, the
    /// green on one of its orthogonal neighbours, then each piece on a random
    /// free cell it may legally start on.
    pub fn random<R: Rng + ?Sized>(
        terrain: &Terrain,
        side: Side,
        rng: &mut R,
    ) -> Result<Self, SetupError> {
        let area: Vec<Cell> = setup_rows(side)
            .flat_map(|row| (0..BOARD_SIZE).filter_map(move |col| Cell::new(row.into(), col)))
            .collect();
        let no_room = |what| SetupError::NoRoom { what, side };

        let interior = *area.choose(rng).ok_or(no_room("castle"))?;
        let neighbours: Vec<Cell> = area
            .iter()
            .copied()
            .filter(|cell| cell.is_orthogonal_neighbour(interior))
            .collect();
        let green = *neighbours.choose(rng).ok_or(no_room("castle green"))?;
        let castle = Castle { green, interior };

        let mut free: Vec<Cell> = area.into_iter().filter(|&cell| cell != green).collect();
        let mut take = |rank: Rank| -> Result<Cell, SetupError> {
            let candidates: Vec<usize> = free
                .iter()
                .enumerate()
                .filter(|(_, &cell)| check_start_cell(terrain, &[castle], rank, cell).is_ok())
                .map(|(idx, _)| idx)
                .collect();
            let idx = *candidates.choose(rng).ok_or(no_room("army"))?;
            Ok(free.swap_remove(idx))
        };

        Ok(Self {
            castle,
            king: take(Rank::King)?,
            prince: take(Rank::Prince)?,
            duke: take(Rank::Duke)?,
            knights: [take(Rank::Knight)?, take(Rank::Knight)?],
            sergeants: [take(Rank::Sergeant)?, take(Rank::Sergeant)?],
            pikemen: [
                take(Rank::Pikemen)?,
                take(Rank::Pikemen)?,
                take(Rank::Pikemen)?,
                take(Rank::Pikemen)?,
            ],
            squire: take(Rank::Squire)?,
            archer: take(Rank::Archer)?,
        })
    }
}

impl Board {
    /// Places a full army and its castle. Fails without touching the board.
    pub fn place_pieces(&mut self, side: Side, placement: &Placement) -> Result<(), SetupError> {
        if self.pieces(side).next().is_some() || self.castle(side).is_some() {
            return Err(SetupError::AlreadyPlaced(side));
        }
        placement.validate(self.terrain(), side)?;
        let pieces = placement.pieces();
        if let Some(&(_, _, cell)) = pieces.iter().find(|(_, _, cell)| self.piece_at(*cell).is_some()) {
            return Err(SetupError::CellOccupied(cell));
        }

        self.set_castle(side, placement.castle);
        for (rank, instance, cell) in pieces {
            self.add_piece(cell, Piece::new(rank, side, instance));
        }
        log::debug!(
            "placed {side} army, castle green {} interior {}",
            placement.castle.green,
            placement.castle.interior
        );
        Ok(())
    }

    /// Places an arbitrary subset of pieces, optionally with a castle, anywhere
    /// on the board. Terrain and castle restrictions still apply and a rank
    /// never exceeds its full-army count. Fails without touching the board.
    pub fn place_some_pieces(
        &mut self,
        side: Side,
        castle: Option<Castle>,
        pieces: &[(Rank, Cell)],
    ) -> Result<(), SetupError> {
        let mut castles: Vec<Castle> = Side::BOTH.iter().filter_map(|&s| self.castle(s)).collect();
        if let Some(castle) = castle {
            if self.castle(side).is_some() {
                return Err(SetupError::AlreadyPlaced(side));
            }
            for cell in [castle.green, castle.interior] {
                if !cell.is_on_board() {
                    return Err(SetupError::OutsideSetupArea { cell, side });
                }
            }
            check_castle(castle)?;
            castles.push(castle);
        }

        let mut counts = self.get_counts(side);
        let mut planned: Vec<Piece> = Vec::with_capacity(pieces.len());
        let mut used: Vec<Cell> = Vec::with_capacity(pieces.len());
        for &(rank, cell) in pieces {
            if !cell.is_on_board() {
                return Err(SetupError::OutsideSetupArea { cell, side });
            }
            if self.piece_at(cell).is_some() || used.contains(&cell) {
                return Err(SetupError::CellOccupied(cell));
            }
            if counts.get(rank) >= rank.full_count() {
                return Err(SetupError::IllegalPlacement {
                    rank,
                    cell,
                    reason: "rank already complete",
                });
            }
            check_start_cell(self.terrain(), &castles, rank, cell)?;

            let instance = if rank.full_count() > 1 {
                (1..=rank.full_count())
                    .find(|&i| {
                        self.location_of(side, rank, i).is_none()
                            && !planned.iter().any(|p| p.rank == rank && p.instance == i)
                    })
                    .unwrap_or(0)
            } else {
                0
            };
            counts.increment(rank);
            planned.push(Piece::new(rank, side, instance));
            used.push(cell);
        }

        if let Some(castle) = castle {
            self.set_castle(side, castle);
        }
        for (piece, cell) in planned.into_iter().zip(used) {
            self.add_piece(cell, piece);
        }
        Ok(())
    }
}
