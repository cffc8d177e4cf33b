#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TTFlag {
    Exact,
    LowerBound, // value >= beta (fail-high)
    UpperBound, // value <= alpha (fail-low)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TTEntry {
    pub key: u64,
    pub value: f64,
    /// Remaining search depth the value was computed with.
    pub depth: u8,
    pub flag: TTFlag,
}

pub struct TranspositionTable {
    entries: Vec<Option<TTEntry>>,
    mask: usize,
}

impl TranspositionTable {
    pub fn new(size_mb: usize) -> Self {
        let budget = (size_mb * 1024 * 1024) / std::mem::size_of::<Option<TTEntry>>();
        // Largest power of two within the budget, never below 1024 slots.
        let size = budget
            .checked_ilog2()
            .map_or(1024, |bits| (1usize << bits).max(1024));

        Self {
            entries: vec![None; size],
            mask: size - 1,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn slot(&self, key: u64) -> usize {
        (key as usize) & self.mask
    }

    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<TTEntry> {
        self.entries[self.slot(key)].filter(|entry| entry.key == key)
    }

    /// Replaces on a different key or when the new search was at least as deep.
    pub fn store(&mut self, key: u64, value: f64, depth: u8, flag: TTFlag) {
        let idx = self.slot(key);
        let slot = &mut self.entries[idx];
        if slot.map_or(true, |entry| entry.key != key || depth >= entry.depth) {
            *slot = Some(TTEntry {
                key,
                value,
                depth,
                flag,
            });
        }
    }

    pub fn clear(&mut self) {
        self.entries.fill(None);
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
