#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod bed;
mod carriers;
mod errors;
mod loops;
mod state;

// RE-EXPORTS
// ================================================================================================

pub use bed::NeedleBed;
pub use carriers::CarrierState;
pub use errors::MachineError;
pub use loops::{Loop, LoopId};
pub use state::MachineState;

/// Needles this close to a carrier's parking position (in needle pitches) conflict with it.
pub const CARRIER_CONFLICT_THRESHOLD: i32 = 1;
