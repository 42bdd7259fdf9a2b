#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod carrier;
mod direction;
mod instruction;
mod needle;
mod rack;
mod stream;

pub mod indexing;

// RE-EXPORTS
// ================================================================================================

pub use carrier::{Carrier, CarrierSet};
pub use direction::{Direction, Side};
pub use instruction::{Instruction, PresserMode};
pub use needle::{Bed, Needle};
pub use rack::Racking;
pub use stream::{Entry, InstructionSink, Stream, StreamError};

/// Version line emitted at the top of every rendered knitout program.
pub const KNITOUT_MAGIC: &str = ";!knitout-2";
