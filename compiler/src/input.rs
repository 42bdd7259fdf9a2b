use alloc::{collections::BTreeMap, vec::Vec};

use knitc_knitout::{Carrier, CarrierSet, Direction, Needle};

use crate::ProgramId;

// STITCH KINDS
// ================================================================================================

/// The base operation of a traced stitch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StitchKind {
    #[default]
    Knit,
    Purl,
    Tuck,
    Miss,
    /// Knit, then move one needle leftward before the next course.
    MoveLeft1,
    /// Knit, then move one needle rightward before the next course.
    MoveRight1,
}

/// The shaping action attached to a traced stitch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ShapingKind {
    #[default]
    None,
    Increase,
    Decrease,
    Miss,
}

// YARN STACK
// ================================================================================================

/// What each back yarn of a stitch does while the front yarn knits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum YarnAction {
    #[default]
    None,
    Miss,
    Tuck,
    Knit,
}

/// Per-stitch yarn description: the full yarn set, the visible front subset, and the action of
/// each non-front yarn. Encodes jacquard, plating, and tuck-backing topologies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct YarnStack {
    pub yarns: CarrierSet,
    pub front: CarrierSet,
    pub back_actions: BTreeMap<Carrier, YarnAction>,
}

impl YarnStack {
    /// Returns a stack with a single front yarn.
    pub fn single(carrier: impl Into<Carrier>) -> Self {
        let carrier = carrier.into();
        Self {
            yarns: CarrierSet::single(carrier.clone()),
            front: CarrierSet::single(carrier),
            back_actions: BTreeMap::new(),
        }
    }

    /// Returns the action of the specified yarn: knit for front yarns, the recorded backing
    /// action otherwise.
    pub fn action(&self, carrier: &Carrier) -> YarnAction {
        if self.front.contains(carrier) {
            YarnAction::Knit
        } else {
            self.back_actions.get(carrier).copied().unwrap_or_default()
        }
    }
}

// TRACED STITCH
// ================================================================================================

/// Boolean attributes of a traced stitch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StitchFlags {
    pub circular: bool,
    pub short_row: bool,
    pub cast_on: bool,
    pub cast_off: bool,
    pub two_sided: bool,
}

/// A stitch of the upstream time-ordered trace.
///
/// Wale and course links are indices into the owning node's trace; `pass` distinguishes the two
/// traversals of a course (standard actions run on pass 0 only).
#[derive(Clone, Debug, PartialEq)]
pub struct TracedStitch {
    pub index: usize,
    pub pass: u8,
    pub wale_prev: Option<usize>,
    pub wale_next: Option<usize>,
    pub course_prev: Option<usize>,
    pub course_next: Option<usize>,
    pub yarns: YarnStack,
    pub shaping: ShapingKind,
    pub kind: StitchKind,
    pub flags: StitchFlags,
    /// User-assigned action program; stitches without one get a lifted program.
    pub program: Option<ProgramId>,
}

impl TracedStitch {
    /// Returns a plain knit stitch at the given trace index with a single yarn.
    pub fn knit(index: usize, carrier: impl Into<Carrier>) -> Self {
        Self {
            index,
            pass: 0,
            wale_prev: None,
            wale_next: None,
            course_prev: None,
            course_next: None,
            yarns: YarnStack::single(carrier),
            shaping: ShapingKind::None,
            kind: StitchKind::Knit,
            flags: StitchFlags::default(),
            program: None,
        }
    }
}

// STITCH BLOCK / STEP / NODE
// ================================================================================================

/// The row-like group of traced stitches a step works, with their needle assignments.
///
/// `stitches`, `needles`, and `targets` run parallel: entry `i` knits trace stitch
/// `stitches[i]` on `needles[i]` and leaves its loop on `targets[i]` once the step's shaping
/// pass has run.
#[derive(Clone, Debug, PartialEq)]
pub struct StitchBlock {
    pub stitches: Vec<usize>,
    pub needles: Vec<Needle>,
    pub targets: Vec<Needle>,
    pub direction: Direction,
    pub active_index: usize,
    pub circular: bool,
    pub starts_yarn: bool,
    pub ends_yarn: bool,
    pub needs_cast_on: bool,
    pub needs_cast_off: bool,
    pub row: u32,
}

impl StitchBlock {
    pub fn needles(&self) -> &[Needle] {
        &self.needles
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// Returns the entry direction and the direction of the return pass.
    pub fn directions(&self) -> (Direction, Direction) {
        if self.circular {
            (self.direction, self.direction)
        } else {
            (self.direction, self.direction.reversed())
        }
    }

    pub fn circular(&self) -> bool {
        self.circular
    }

    pub fn starts_yarn(&self) -> bool {
        self.starts_yarn
    }

    pub fn ends_yarn(&self) -> bool {
        self.ends_yarn
    }

    pub fn needs_cast_on(&self) -> bool {
        self.needs_cast_on
    }

    pub fn needs_cast_off(&self) -> bool {
        self.needs_cast_off
    }

    /// Returns true when any stitch moves to a different needle after the action pass.
    pub fn needs_shaping(&self) -> bool {
        self.needles != self.targets
    }
}

/// One compilation step of a yarn node.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub block: StitchBlock,
}

/// A time-ordered portion of fabric: a trace of stitches decomposed into steps.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct YarnNode {
    pub trace: Vec<TracedStitch>,
    pub steps: Vec<Step>,
    pub first_block_row: u32,
    pub last_block_row: u32,
    /// Index of the node knit next, when the nodes are linked.
    pub following: Option<usize>,
}

impl YarnNode {
    /// Returns the number of traced stitches in this node.
    pub fn stitch_count(&self) -> usize {
        self.trace.len()
    }
}
