use alloc::string::String;

use knitc_knitout::{Needle, Racking, StreamError};
use knitc_machine::{LoopId, MachineError};

// OPTIONS ERROR
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("insert depth must be at least 1, but was {0}")]
    InsertDepthTooSmall(usize),
    #[error("maximum racking must be at least 1, but was {0}")]
    MaxRackingTooSmall(i32),
}

// PLAN ERROR
// ================================================================================================

/// Failures of the transfer planner.
///
/// Planner failures are surfaced to the caller, which may retry with another algorithm before
/// aborting the compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("source and target counts differ: {sources} sources vs {targets} targets")]
    CardinalityMismatch { sources: usize, targets: usize },
    #[error("planner produced no transfers although loops must move")]
    EmptyPlan,
    #[error("transfer to {to} would merge loops that are not at a common final target")]
    IllegalMerge { to: Needle },
    #[error("required racking {racking} exceeds the machine maximum {max_racking}")]
    RackingOutOfRange { racking: Racking, max_racking: i32 },
    #[error("rotation search exhausted all corner options with winding error {winding} left")]
    RotationExhausted { winding: usize },
    #[error("shift pass failed to reduce the pending shift sum below {pending}")]
    ShiftStalled { pending: i64 },
    #[error("planner exceeded {0} passes without converging")]
    StepLimitExceeded(usize),
    #[error("collapse-shift-expand oracle returned an inconsistent plan: {0}")]
    CseInconsistent(String),
}

// COMPILE ERROR
// ================================================================================================

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid compiler options")]
    Options(#[from] OptionsError),
    #[error("machine state rejected an instruction")]
    Machine(#[from] MachineError),
    #[error("instruction stream access failed")]
    Stream(#[from] StreamError),
    #[error("transfer planning failed")]
    Plan(#[from] PlanError),
    #[error("slider beds hold loops at the boundary of a {fragment} fragment")]
    PendingSliders { fragment: &'static str },
    #[error("loop {lp} is not on its recorded target {expected} after shaping")]
    LoopTargetMismatch {
        lp: LoopId,
        expected: Needle,
        actual: Option<Needle>,
    },
    #[error("stitch {stitch} requested a second inter-pass move")]
    DuplicateMoveRequest { stitch: usize },
    #[error("stitch {stitch} requested an inter-pass move outside a post pass")]
    MoveOutsidePostPass { stitch: usize },
    #[error("{what} cardinality mismatch: {left} vs {right}")]
    CardinalityMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("fragment ranges do not partition the stream: expected start {expected}, found {found}")]
    FragmentRangeGap { expected: usize, found: usize },
    #[error("action program {0} is not registered")]
    UnknownProgram(u32),
    #[error("step has no needles to work")]
    EmptyStep,
}
