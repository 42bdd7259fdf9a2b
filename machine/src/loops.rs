use smallvec::SmallVec;

use knitc_knitout::newtype_id;

newtype_id!(LoopId);

// LOOP
// ================================================================================================

/// A physical thread loop held on some needle.
///
/// Loops carry only opaque origin data: the traced-stitch index that formed them, the parent
/// loops they were knit through, and the previous loop formed from the same yarn. A loop is on
/// exactly one needle at any time; the owning [crate::NeedleBed] tracks which.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loop {
    pub id: LoopId,
    /// Index of the traced stitch that formed this loop, when known.
    pub stitch: Option<i64>,
    /// Loops this loop was knit (or split) through.
    pub parents: SmallVec<[LoopId; 2]>,
    /// The loop previously formed from the same yarn, for yarn-history walks.
    pub previous: Option<LoopId>,
}

impl Loop {
    /// Returns a new loop with no parents and no yarn history.
    pub fn new(id: LoopId) -> Self {
        Self {
            id,
            stitch: None,
            parents: SmallVec::new(),
            previous: None,
        }
    }
}
