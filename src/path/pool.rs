use super::PathRecord;

/// Number of ranks available to live paths.
pub const MAX_PATHS: usize = 8;
/// Total pool capacity, including the best-path rank.
pub const POOL_SIZE: usize = MAX_PATHS + 1;
/// Rank reserved for the best complete path.
pub const BEST_RANK: usize = MAX_PATHS;

/// Arena of path slots addressed through a rank permutation.
///
/// Ranks `0..live` are live paths, ranks past that are free slots available
/// for children, and [`BEST_RANK`] holds the best complete path. Reordering
/// only ever permutes ranks; slot contents never move.
#[derive(Debug, Clone)]
pub struct PathPool {
    slots: Vec<PathRecord>,
    ranks: [usize; POOL_SIZE],
}

impl PathPool {
    /// Allocate a pool whose paths cover `num_flows` flows.
    pub fn new(num_flows: usize) -> Self {
        let mut ranks = [0; POOL_SIZE];
        for (rank, slot) in ranks.iter_mut().enumerate() {
            *slot = rank;
        }
        Self {
            slots: (0..POOL_SIZE)
                .map(|_| PathRecord::with_flows(num_flows))
                .collect(),
            ranks,
        }
    }

    /// Slot index currently at `rank`.
    #[inline]
    pub fn slot_of(&self, rank: usize) -> usize {
        self.ranks[rank]
    }

    /// Path at `rank`.
    #[inline]
    pub fn at(&self, rank: usize) -> &PathRecord {
        &self.slots[self.ranks[rank]]
    }

    /// Mutable path at `rank`.
    #[inline]
    pub fn at_mut(&mut self, rank: usize) -> &mut PathRecord {
        &mut self.slots[self.ranks[rank]]
    }

    /// Path stored in `slot`, independent of rank.
    #[inline]
    pub fn slot(&self, slot: usize) -> &PathRecord {
        &self.slots[slot]
    }

    /// Mutable path stored in `slot`.
    #[inline]
    pub fn slot_mut(&mut self, slot: usize) -> &mut PathRecord {
        &mut self.slots[slot]
    }

    /// Best complete path.
    #[inline]
    pub fn best(&self) -> &PathRecord {
        self.at(BEST_RANK)
    }

    /// Exchange the slots at two ranks.
    #[inline]
    pub fn swap(&mut self, a: usize, b: usize) {
        self.ranks.swap(a, b);
    }

    /// Place `slot` at `rank` without touching other ranks.
    #[inline]
    pub fn assign(&mut self, rank: usize, slot: usize) {
        self.ranks[rank] = slot;
    }

    /// Borrow two distinct slots, the first shared and the second mutable.
    pub fn pair_mut(&mut self, source: usize, target: usize) -> (&PathRecord, &mut PathRecord) {
        assert_ne!(source, target, "a path cannot be copied onto itself");
        if source < target {
            let (head, tail) = self.slots.split_at_mut(target);
            (&head[source], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(source);
            (&tail[0], &mut head[target])
        }
    }

    /// Iterate over every slot, whatever its rank.
    pub fn iter(&self) -> impl Iterator<Item = &PathRecord> {
        self.slots.iter()
    }

    /// Iterate over every slot mutably, whatever its rank.
    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut PathRecord> {
        self.slots.iter_mut()
    }
}
