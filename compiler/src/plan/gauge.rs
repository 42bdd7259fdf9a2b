use knitc_knitout::{Bed, Needle};
use knitc_machine::MachineState;

// HALF-GAUGE MAPPING
// ================================================================================================
//
// Half-gauge fabric occupies even needles only, leaving every odd needle free. The pure mapping
// layer below contracts that space to full gauge (where the planner need not worry about
// carrier clearance) and expands planned needles back to physical offsets.

/// Contracts a physical half-gauge needle to its full-gauge equivalent.
pub fn half_to_full(needle: Needle) -> Needle {
    Needle::new(needle.bed, needle.offset.div_euclid(2))
}

/// Expands a full-gauge needle back to its physical half-gauge offset.
pub fn full_to_half(needle: Needle) -> Needle {
    Needle::new(needle.bed, needle.offset * 2)
}

/// Returns true when the state is a complete half-gauge state for the given plan: no pending
/// sliders and every participating hook loop on an even offset.
pub fn is_complete_half_gauge(state: &MachineState, sources: &[Needle], targets: &[Needle]) -> bool {
    if state.has_pending_sliders() {
        return false;
    }
    if sources.iter().chain(targets.iter()).any(|n| n.offset % 2 != 0) {
        return false;
    }
    for bed in [Bed::FrontHook, Bed::BackHook] {
        if state.bed(bed).occupied_offsets().any(|offset| offset % 2 != 0) {
            return false;
        }
    }
    true
}
