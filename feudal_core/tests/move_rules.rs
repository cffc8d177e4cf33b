#[cfg(test)]
mod tests {
    use feudal_core::logic::board::{Board, Castle, Cell, Side};
    use feudal_core::logic::movegen::Destination;
    use feudal_core::logic::piece::Rank;
    use feudal_core::logic::setup::Placement;
    use feudal_core::logic::terrain::{Terrain, TerrainKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cell(r: usize, c: usize) -> Cell {
        Cell::new(r, c).unwrap()
    }

    fn random_game(seed: u64, max_pieces_moved: usize) -> Board {
        let mut terrain = Terrain::open();
        for col in (0..24).step_by(3) {
            terrain.set(cell(11, col), TerrainKind::Rough);
            terrain.set(cell(12, col + 1), TerrainKind::Mountain);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut board = Board::new(terrain.clone(), max_pieces_moved);
        for side in Side::BOTH {
            let placement = Placement::random(&terrain, side, &mut rng).unwrap();
            board.place_pieces(side, &placement).unwrap();
        }
        board
    }

    #[test]
    fn two_adjacent_kings() {
        let mut board = Board::default();
        board
            .place_some_pieces(Side::Blue, None, &[(Rank::King, cell(10, 10))])
            .unwrap();
        board
            .place_some_pieces(Side::Brown, None, &[(Rank::King, cell(10, 11))])
            .unwrap();

        for (origin, other, beyond) in [
            (cell(10, 10), cell(10, 11), cell(10, 12)),
            (cell(10, 11), cell(10, 10), cell(10, 9)),
        ] {
            let moves = board.destinations(origin);
            assert_eq!(moves.len(), 15);
            assert!(moves.iter().all(|d| d.cell.distance(origin) <= 2));
            assert!(moves.iter().all(|d| d.capture == (d.cell == other)));
            assert!(!moves.iter().any(|d| d.cell == beyond));
        }
    }

    #[test]
    fn archer_shoots_past_its_green() {
        let mut board = Board::default();
        board
            .place_some_pieces(
                Side::Blue,
                Some(Castle {
                    green: cell(6, 22),
                    interior: cell(5, 22),
                }),
                &[(Rank::King, cell(0, 0)), (Rank::Archer, cell(6, 21))],
            )
            .unwrap();
        board
            .place_some_pieces(
                Side::Brown,
                None,
                &[(Rank::King, cell(23, 0)), (Rank::Pikemen, cell(6, 23))],
            )
            .unwrap();

        let east: Vec<Destination> = board
            .destinations(cell(6, 21))
            .into_iter()
            .filter(|d| d.cell.row == 6 && d.cell.col > 21)
            .collect();
        assert_eq!(
            east,
            vec![
                Destination {
                    cell: cell(6, 22),
                    capture: false
                },
                Destination {
                    cell: cell(6, 23),
                    capture: true
                },
            ]
        );

        // The shot removes the pikeman and leaves the archer where it stood.
        let record = board.apply_move(cell(6, 21), cell(6, 23), Side::Blue).unwrap();
        assert!(record.archer_shot);
        assert_eq!(board.piece_at(cell(6, 23)), None);
        assert_eq!(board.piece_at(cell(6, 21)).map(|p| p.rank), Some(Rank::Archer));
    }

    #[test]
    fn archer_ray_continues_after_a_mid_board_capture() {
        // Archer two cells short of a pikeman, its own green in between.
        let range = |blue: &[(Rank, Cell)], brown: &[(Rank, Cell)]| -> Board {
            let mut board = Board::default();
            board
                .place_some_pieces(
                    Side::Blue,
                    Some(Castle {
                        green: cell(6, 11),
                        interior: cell(5, 11),
                    }),
                    &[(Rank::King, cell(0, 0)), (Rank::Archer, cell(6, 10))],
                )
                .unwrap();
            board
                .place_some_pieces(
                    Side::Brown,
                    None,
                    &[(Rank::King, cell(23, 0)), (Rank::Pikemen, cell(6, 12))],
                )
                .unwrap();
            board.place_some_pieces(Side::Blue, None, blue).unwrap();
            board.place_some_pieces(Side::Brown, None, brown).unwrap();
            board
        };
        let east = |board: &Board| -> Vec<Destination> {
            board
                .destinations(cell(6, 10))
                .into_iter()
                .filter(|d| d.cell.row == 6 && d.cell.col > 10)
                .collect()
        };

        // Green, the shot, then one more cell before the reach of 3 runs out.
        let mut board = range(&[], &[]);
        assert_eq!(
            east(&board),
            vec![
                Destination {
                    cell: cell(6, 11),
                    capture: false
                },
                Destination {
                    cell: cell(6, 12),
                    capture: true
                },
                Destination {
                    cell: cell(6, 13),
                    capture: false
                },
            ]
        );

        // A second opponent behind the first is a capture too.
        let shots: Vec<bool> = east(&range(&[], &[(Rank::Sergeant, cell(6, 13))]))
            .iter()
            .map(|d| d.capture)
            .collect();
        assert_eq!(shots, vec![false, true, true]);

        // A friendly piece beyond the capture still ends the ray.
        assert_eq!(east(&range(&[(Rank::Sergeant, cell(6, 13))], &[])).len(), 2);

        // Landing past the shot moves the archer and takes nothing.
        let record = board.apply_move(cell(6, 10), cell(6, 13), Side::Blue).unwrap();
        assert!(!record.archer_shot);
        assert_eq!(board.piece_at(cell(6, 13)).map(|p| p.rank), Some(Rank::Archer));
        assert_eq!(board.piece_at(cell(6, 12)).map(|p| p.rank), Some(Rank::Pikemen));
    }

    #[test]
    fn destinations_respect_board_and_castles() {
        for seed in 0..4 {
            let board = random_game(seed, 3);
            for side in Side::BOTH {
                for (_, origin) in board.pieces(side) {
                    let on_green = board.is_green(origin);
                    for dest in board.destinations(origin) {
                        assert!(dest.cell.is_on_board());
                        assert!(board.piece_at(dest.cell).map_or(true, |p| p.side != side));
                        assert!(!board.terrain().is_mountain(dest.cell));
                        if board.is_interior(dest.cell) {
                            assert!(on_green, "{origin} reached an interior off the green");
                        }
                    }
                    assert_eq!(board.count_destinations(origin), board.destinations(origin).len());
                }
            }
        }
    }

    #[test]
    fn single_moves_apply_and_reverse_exactly() {
        let mut board = random_game(21, 3);
        let before = board.clone();
        for side in Side::BOTH {
            let pieces: Vec<Cell> = board.pieces(side).map(|(_, cell)| cell).collect();
            for origin in pieces {
                for dest in board.destinations(origin) {
                    let record = board.apply_move_ret_state(origin, dest.cell, side).unwrap();
                    assert!(board.validate().is_ok());
                    board.reverse_apply_move(&record);
                    assert_eq!(board, before);
                    assert_eq!(board.hash_key(side), before.hash_key(side));
                }
            }
        }
    }

    #[test]
    fn move_count_matches_enumeration() {
        for seed in [3, 8] {
            let mut board = random_game(seed, 2);
            let before = board.clone();
            for side in Side::BOTH {
                let counted = board.get_num_all_moves(side);
                let enumerated = board.compound_moves(side).count();
                assert_eq!(counted, enumerated, "seed {seed} {side}");
                assert!(counted > 0);
            }
            assert_eq!(board, before);
        }
    }

    #[test]
    fn hash_ignores_move_order() {
        let mut a = random_game(5, 2);
        let mut b = a.clone();
        // Second piece must not land where the first one started.
        let mv = a
            .compound_moves(Side::Blue)
            .find(|mv| mv.len() == 2 && mv.relocations()[1].1 != mv.relocations()[0].0)
            .unwrap();
        let moves = mv.relocations();

        a.apply_moves(&mv, Side::Blue).unwrap();
        for &(from, to) in moves.iter().rev() {
            b.apply_move_ret_state(from, to, Side::Blue).unwrap();
        }
        assert_eq!(a.hash_key(Side::Brown), b.hash_key(Side::Brown));
        assert_ne!(a.hash_key(Side::Brown), a.hash_key(Side::Blue));
    }
}
