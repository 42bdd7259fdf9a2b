use knitc_knitout::{Carrier, Needle, Racking};

// MACHINE ERROR
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    #[error("carrier {carrier} is already in the needle bed")]
    CarrierAlreadyIn { carrier: Carrier },
    #[error("carrier {carrier} is not active")]
    CarrierNotActive { carrier: Carrier },
    #[error("carrier {carrier} is not held by the yarn-inserting hook")]
    CarrierNotHooked { carrier: Carrier },
    #[error("transfer from {from} to {to} stays on the same bed side")]
    TransferSameSide { from: Needle, to: Needle },
    #[error(
        "transfer from {from} to {to} is misaligned at racking {racking}: front offsets {from_offset} vs {to_offset}"
    )]
    TransferMisaligned {
        from: Needle,
        to: Needle,
        racking: Racking,
        from_offset: i32,
        to_offset: i32,
    },
    #[error("transfer from {from} at fractional racking {racking}")]
    TransferFractionalRacking { from: Needle, racking: Racking },
}
