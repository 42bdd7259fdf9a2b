use alloc::collections::BTreeMap;

use smallvec::SmallVec;

use crate::{Loop, LoopId};

// NEEDLE BED
// ================================================================================================

/// Loop storage for a single bed: a mapping from needle offset to the ordered stack of loops
/// held there, with an inverse loop-to-offset index.
///
/// Offsets with no loops are absent from the map, so the loop stacks are always non-empty.
#[derive(Clone, Debug, Default)]
pub struct NeedleBed {
    loops: BTreeMap<i32, SmallVec<[Loop; 1]>>,
    index: BTreeMap<LoopId, i32>,
}

impl NeedleBed {
    /// Returns the loop stack at `offset`, oldest first.
    pub fn loops_at(&self, offset: i32) -> &[Loop] {
        self.loops.get(&offset).map(|stack| stack.as_slice()).unwrap_or(&[])
    }

    /// Returns true when no loops sit at `offset`.
    pub fn is_empty_at(&self, offset: i32) -> bool {
        !self.loops.contains_key(&offset)
    }

    /// Returns true when the whole bed holds no loops.
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns how many loops the whole bed holds.
    pub fn loop_count(&self) -> usize {
        self.loops.values().map(|stack| stack.len()).sum()
    }

    /// Returns the offset holding the specified loop, if this bed holds it.
    pub fn offset_of(&self, id: LoopId) -> Option<i32> {
        self.index.get(&id).copied()
    }

    /// Iterates occupied offsets in ascending order.
    pub fn occupied_offsets(&self) -> impl Iterator<Item = i32> + '_ {
        self.loops.keys().copied()
    }

    /// Pushes a loop on top of the stack at `offset`.
    pub fn place(&mut self, offset: i32, lp: Loop) {
        self.index.insert(lp.id, offset);
        self.loops.entry(offset).or_default().push(lp);
    }

    /// Removes and returns the whole stack at `offset`, oldest first.
    pub fn take(&mut self, offset: i32) -> SmallVec<[Loop; 1]> {
        let stack = self.loops.remove(&offset).unwrap_or_default();
        for lp in &stack {
            self.index.remove(&lp.id);
        }
        stack
    }

    /// Appends a stack of loops at `offset`, preserving their order.
    pub fn place_all(&mut self, offset: i32, stack: impl IntoIterator<Item = Loop>) {
        for lp in stack {
            self.place(offset, lp);
        }
    }
}

// TESTS
// ================================================================================================
