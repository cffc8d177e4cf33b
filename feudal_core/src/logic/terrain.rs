use crate::error::SetupError;
use crate::logic::board::{Cell, BOARD_SIZE, NUM_CELLS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerrainKind {
    #[default]
    Open,
    Rough,
    Mountain,
}

/// Static terrain layer. Shared between board clones behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terrain {
    cells: Vec<TerrainKind>,
}

impl Default for Terrain {
    fn default() -> Self {
        Self::open()
    }
}

impl Terrain {
    /// A board with no rough ground and no mountains.
    #[must_use]
    pub fn open() -> Self {
        Self {
            cells: vec![TerrainKind::Open; NUM_CELLS],
        }
    }

    /// Parses the terrain text format: one line per row, cells separated by
    /// whitespace, `#` marks rough ground and `^` a mountain. Blank lines are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self, SetupError> {
        let mut terrain = Self::open();
        let rows: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
        if rows.len() != BOARD_SIZE {
            return Err(SetupError::TerrainRowCount {
                found: rows.len(),
                expected: BOARD_SIZE,
            });
        }

        for (row, line) in rows.iter().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != BOARD_SIZE {
                return Err(SetupError::TerrainRowLength {
                    row,
                    found: tokens.len(),
                    expected: BOARD_SIZE,
                });
            }
            for (col, token) in tokens.iter().enumerate() {
                let kind = if token.contains('#') {
                    TerrainKind::Rough
                } else if token.contains('^') {
                    TerrainKind::Mountain
                } else {
                    TerrainKind::Open
                };
                terrain.set(Cell::from_index(row * BOARD_SIZE + col), kind);
            }
        }
        Ok(terrain)
    }

    #[must_use]
    pub fn get(&self, cell: Cell) -> TerrainKind {
        self.cells[cell.index()]
    }

    pub fn set(&mut self, cell: Cell, kind: TerrainKind) {
        self.cells[cell.index()] = kind;
    }

    #[must_use]
    pub fn is_rough(&self, cell: Cell) -> bool {
        self.get(cell) == TerrainKind::Rough
    }

    #[must_use]
    pub fn is_mountain(&self, cell: Cell) -> bool {
        self.get(cell) == TerrainKind::Mountain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(rough: &[(u8, u8)], mountains: &[(u8, u8)]) -> String {
        let mut out = String::new();
        for r in 0..BOARD_SIZE as u8 {
            let row: Vec<&str> = (0..BOARD_SIZE as u8)
                .map(|c| {
                    if rough.contains(&(r, c)) {
                        "#"
                    } else if mountains.contains(&(r, c)) {
                        "^"
                    } else {
                        "."
                    }
                })
                .collect();
            out.push_str(&row.join("  "));
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_parse_terrain() {
        let text = render(&[(3, 4), (10, 10)], &[(0, 23)]);
        let terrain = Terrain::parse(&text).unwrap();
        assert!(terrain.is_rough(Cell::new(3, 4).unwrap()));
        assert!(terrain.is_rough(Cell::new(10, 10).unwrap()));
        assert!(terrain.is_mountain(Cell::new(0, 23).unwrap()));
        assert_eq!(terrain.get(Cell::new(5, 5).unwrap()), TerrainKind::Open);
        assert!(!terrain.is_rough(Cell::new(3, 5).unwrap()));
    }

    #[test]
    fn test_parse_tolerates_loose_spacing() {
        let tidy = Terrain::parse(&render(&[(7, 0), (7, 23)], &[(12, 12)])).unwrap();
        // Same layout with mixed separators, indentation and trailing blanks.
        let loose: String = render(&[(7, 0), (7, 23)], &[(12, 12)])
            .lines()
            .enumerate()
            .map(|(r, line)| {
                let cells: Vec<&str> = line.split_whitespace().collect();
                let sep = if r % 2 == 0 { " " } else { " \t  " };
                format!("  {}\t \n\n", cells.join(sep))
            })
            .collect();
        assert_eq!(Terrain::parse(&loose).unwrap(), tidy);
    }

    #[test]
    fn test_parse_rejects_short_rows() {
        let mut text = render(&[], &[]);
        text.push_str(".  .\n");
        assert!(matches!(
            Terrain::parse(&text),
            Err(SetupError::TerrainRowCount { found: 25, .. })
        ));

        let text = ".  .  .\n".repeat(BOARD_SIZE);
        assert!(matches!(
            Terrain::parse(&text),
            Err(SetupError::TerrainRowLength { row: 0, found: 3, .. })
        ));
    }
}
