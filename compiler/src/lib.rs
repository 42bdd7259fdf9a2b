#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod driver;
mod errors;
mod fragment;
mod hooks;
mod input;
mod lift;
mod options;
mod registry;
mod session;

pub mod plan;

// RE-EXPORTS
// ================================================================================================

pub use driver::{CompilePhase, Compiler, CompileOutput};
pub use errors::{CompileError, OptionsError, PlanError};
pub use fragment::{Fragment, FragmentId, FragmentKind, FragmentPayload};
pub use hooks::{FragmentHook, HalfGaugeHook};
pub use input::{
    ShapingKind, Step, StitchBlock, StitchFlags, StitchKind, TracedStitch, YarnAction, YarnNode,
    YarnStack,
};
pub use lift::{PatternGrid, TopoXform, lift_programs};
pub use options::{
    CastOnType, CompilerOptions, Gauge, IntarsiaSide, IntarsiaTucks, ShapingAlgorithm,
};
pub use registry::{
    ActionContext, ActionProgram, BASE_PROGRAM_COUNT, MoveMap, Pass, PassPhase, ProgramId,
    Registry,
};
pub use session::Session;

pub use knitc_knitout as knitout;
pub use knitc_machine as machine;

/// Initializes `env_logger` for debugging compilations; safe to call more than once.
#[cfg(feature = "logging")]
pub fn init_logging() {
    let _ = env_logger::builder().try_init();
}
