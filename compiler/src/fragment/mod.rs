use alloc::vec::Vec;

use knitc_knitout::{CarrierSet, Direction, Needle, Stream, newtype_id};
use knitc_machine::MachineState;

use crate::{CompileError, CompilerOptions, ProgramId, Registry, TracedStitch};

mod action;
mod alignment;
mod cast_off;
mod cast_on;
mod shaping;
mod yarn;

pub use action::ActionEntry;

newtype_id!(FragmentId);

// BUILD CONTEXT
// ================================================================================================

/// Everything a fragment's generate step may touch.
///
/// Fragments write to the stream and observe the machine through `state`; flushing is the only
/// way their writes become visible to it.
pub struct BuildContext<'a> {
    pub stream: &'a mut Stream,
    pub state: &'a mut MachineState,
    pub options: &'a CompilerOptions,
    pub registry: &'a Registry,
}

impl BuildContext<'_> {
    /// Applies all not-yet-flushed stream entries to the machine state.
    pub fn flush(&mut self) -> Result<(), CompileError> {
        self.stream.flush_into(self.state)?;
        Ok(())
    }
}

// FRAGMENT
// ================================================================================================

/// The type tag of a fragment, also used for its default stream comment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FragmentKind {
    NodeStart,
    YarnStart,
    CastOn,
    Action,
    Shaping,
    Alignment,
    CastOff,
    YarnEnd,
    StepEnd,
}

impl FragmentKind {
    /// The comment attached at a fragment's first stream entry when none is present.
    pub fn comment(&self) -> &'static str {
        match self {
            FragmentKind::NodeStart => "node-start",
            FragmentKind::YarnStart => "yarn-start",
            FragmentKind::CastOn => "cast-on",
            FragmentKind::Action => "action",
            FragmentKind::Shaping => "shaping",
            FragmentKind::Alignment => "alignment",
            FragmentKind::CastOff => "cast-off",
            FragmentKind::YarnEnd => "yarn-end",
            FragmentKind::StepEnd => "step-end",
        }
    }
}

/// Bookkeeping shared by all fragment variants.
///
/// `first_ptr..last_ptr` is the fragment's half-open range in the stream, recorded when it is
/// built; sibling links are ids into the session's fragment vector.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FragmentHeader {
    pub first_ptr: usize,
    pub last_ptr: usize,
    /// Stitch number this fragment wants active, when it differs from the machine's.
    pub stitch_number: Option<u32>,
    pub prev: Option<FragmentId>,
    pub next: Option<FragmentId>,
}

/// A unit of compilation: one variant per pass type, with value-type payloads only.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub payload: FragmentPayload,
}

impl Fragment {
    pub fn new(payload: FragmentPayload) -> Self {
        Self { header: FragmentHeader::default(), payload }
    }

    /// Returns the fragment with a desired stitch number set.
    pub fn with_stitch_number(mut self, stitch_number: u32) -> Self {
        self.header.stitch_number = Some(stitch_number);
        self
    }

    pub fn kind(&self) -> FragmentKind {
        self.payload.kind()
    }
}

/// The per-variant payloads. Needle lists are recorded at attach time so hooks (half-gauge
/// conversion) can rewrite them before the fragment builds.
#[derive(Clone, Debug)]
pub enum FragmentPayload {
    NodeStart {
        node: usize,
    },
    YarnStart {
        cs: CarrierSet,
        needles: Vec<Needle>,
        direction: Direction,
    },
    CastOn {
        needles: Vec<Needle>,
        direction: Direction,
        cs: CarrierSet,
        circular: bool,
    },
    Action {
        entries: Vec<ActionEntry>,
        circular: bool,
    },
    Shaping {
        sources: Vec<Needle>,
        targets: Vec<Needle>,
        circular: bool,
    },
    Alignment {
        sources: Vec<Needle>,
        targets: Vec<Needle>,
    },
    CastOff {
        stitches: Vec<TracedStitch>,
        needles: Vec<Needle>,
        direction: Direction,
        cs: CarrierSet,
    },
    YarnEnd {
        cs: CarrierSet,
        tail: Needle,
        direction: Direction,
        use_tail: bool,
    },
    StepEnd {
        row: u32,
    },
}

impl FragmentPayload {
    pub fn kind(&self) -> FragmentKind {
        match self {
            FragmentPayload::NodeStart { .. } => FragmentKind::NodeStart,
            FragmentPayload::YarnStart { .. } => FragmentKind::YarnStart,
            FragmentPayload::CastOn { .. } => FragmentKind::CastOn,
            FragmentPayload::Action { .. } => FragmentKind::Action,
            FragmentPayload::Shaping { .. } => FragmentKind::Shaping,
            FragmentPayload::Alignment { .. } => FragmentKind::Alignment,
            FragmentPayload::CastOff { .. } => FragmentKind::CastOff,
            FragmentPayload::YarnEnd { .. } => FragmentKind::YarnEnd,
            FragmentPayload::StepEnd { .. } => FragmentKind::StepEnd,
        }
    }

    /// Writes this fragment's instructions; called exactly once, by the build template.
    pub(crate) fn generate(&self, ctx: &mut BuildContext<'_>) -> Result<(), CompileError> {
        match self {
            FragmentPayload::NodeStart { node } => {
                ctx.stream.append_comment(format!("node {node}"));
                Ok(())
            },
            FragmentPayload::StepEnd { row } => {
                ctx.stream.append_comment(format!("end of row {row}"));
                Ok(())
            },
            FragmentPayload::YarnStart { cs, needles, direction } => {
                yarn::generate_start(ctx, cs, needles, *direction)
            },
            FragmentPayload::YarnEnd { cs, tail, direction, use_tail } => {
                yarn::generate_end(ctx, cs, *tail, *direction, *use_tail)
            },
            FragmentPayload::CastOn { needles, direction, cs, circular } => {
                cast_on::generate(ctx, needles, *direction, cs, *circular)
            },
            FragmentPayload::CastOff { stitches, needles, direction, cs } => {
                cast_off::generate(ctx, stitches, needles, *direction, cs)
            },
            FragmentPayload::Action { entries, circular } => {
                action::generate(ctx, entries, *circular)
            },
            FragmentPayload::Shaping { sources, targets, circular } => {
                shaping::generate(ctx, sources, targets, *circular)
            },
            FragmentPayload::Alignment { sources, targets } => {
                alignment::generate(ctx, sources, targets)
            },
        }
    }

    /// Applies `f` to every needle recorded in the payload (hook support).
    pub fn map_needles(&mut self, f: impl Fn(Needle) -> Needle) {
        match self {
            FragmentPayload::NodeStart { .. } | FragmentPayload::StepEnd { .. } => {},
            FragmentPayload::YarnStart { needles, .. } => {
                for needle in needles {
                    *needle = f(*needle);
                }
            },
            FragmentPayload::CastOn { needles, .. } => {
                for needle in needles {
                    *needle = f(*needle);
                }
            },
            FragmentPayload::Action { entries, .. } => {
                for entry in entries {
                    entry.needle = f(entry.needle);
                }
            },
            FragmentPayload::Shaping { sources, targets, .. } => {
                for needle in sources.iter_mut().chain(targets.iter_mut()) {
                    *needle = f(*needle);
                }
            },
            FragmentPayload::Alignment { sources, targets } => {
                for needle in sources.iter_mut().chain(targets.iter_mut()) {
                    *needle = f(*needle);
                }
            },
            FragmentPayload::CastOff { needles, .. } => {
                for needle in needles {
                    *needle = f(*needle);
                }
            },
            FragmentPayload::YarnEnd { tail, .. } => *tail = f(*tail),
        }
    }
}

// SHARED EMISSION HELPERS
// ------------------------------------------------------------------------------------------------

/// Appends a `rack` line when the tracked racking differs from the wanted one.
pub(crate) fn ensure_racking(
    stream: &mut Stream,
    current: &mut knitc_knitout::Racking,
    wanted: knitc_knitout::Racking,
) {
    if *current != wanted {
        stream.append(knitc_knitout::Instruction::Rack(wanted));
        *current = wanted;
    }
}

// ACTION PROGRAM RESOLUTION
// ------------------------------------------------------------------------------------------------

/// Returns the program id assigned to a stitch, base-program fallback included.
pub(crate) fn resolve_program(stitch: &TracedStitch) -> ProgramId {
    if let Some(program) = stitch.program {
        return program;
    }
    match stitch.kind {
        crate::StitchKind::Knit => ProgramId::KNIT,
        crate::StitchKind::Purl => ProgramId::BKNIT,
        crate::StitchKind::Tuck => ProgramId::TUCK,
        crate::StitchKind::Miss => ProgramId::MISS,
        crate::StitchKind::MoveLeft1 | crate::StitchKind::MoveRight1 => ProgramId::KNIT,
    }
}
