use alloc::vec::Vec;

use knitc_knitout::{CarrierSet, Direction, Instruction, Needle, Racking};

use super::BuildContext;
use crate::{CompileError, TracedStitch, plan::racking_for};

// CAST-OFF
// ================================================================================================

/// Chains the bound-off edge: knit each entry, pass its loop onto the next needle, repeat.
///
/// With pick-up stitches enabled, each entry first tucks on its predecessor to stabilize the
/// edge; the tucks travel along with the chain and whatever remains is dropped at the end.
pub(super) fn generate(
    ctx: &mut BuildContext<'_>,
    stitches: &[TracedStitch],
    needles: &[Needle],
    direction: Direction,
    cs: &CarrierSet,
) -> Result<(), CompileError> {
    if needles.is_empty() {
        return Err(CompileError::EmptyStep);
    }
    if stitches.len() != needles.len() {
        return Err(CompileError::CardinalityMismatch {
            what: "cast-off entries",
            left: stitches.len(),
            right: needles.len(),
        });
    }

    let mut racking = ctx.state.racking();
    let mut pick_ups: Vec<Needle> = Vec::new();
    for (index, needle) in needles.iter().enumerate() {
        if ctx.options.use_pick_up_stitch && index > 0 {
            let previous = needles[index - 1];
            ctx.stream.append(Instruction::Tuck(direction.reversed(), previous, cs.clone()));
            pick_ups.push(previous);
        }

        ctx.stream.append(Instruction::Knit(direction, *needle, cs.clone()));
        ctx.stream.set_metadata(-1, stitches[index].index as i64)?;

        let Some(next) = needles.get(index + 1) else { break };
        if next.bed.is_front() == needle.bed.is_front() {
            // Same-side pass-along goes through the opposite bed; kick the carrier back first
            // so the fresh loop's yarn is not dragged across.
            ctx.stream.append(Instruction::Miss(direction.reversed(), *needle, cs.clone()));
            let stage = needle.opposite_hook();
            super::ensure_racking(ctx.stream, &mut racking, racking_for(*needle, stage));
            ctx.stream.append(Instruction::Xfer(*needle, stage));
            super::ensure_racking(ctx.stream, &mut racking, racking_for(stage, *next));
            ctx.stream.append(Instruction::Xfer(stage, *next));
        } else {
            super::ensure_racking(ctx.stream, &mut racking, racking_for(*needle, *next));
            ctx.stream.append(Instruction::Xfer(*needle, *next));
        }
    }
    super::ensure_racking(ctx.stream, &mut racking, Racking::ZERO);

    // The chain end and any surviving pick-up tucks come off the needles.
    ctx.flush()?;
    let last = needles[needles.len() - 1];
    for needle in pick_ups.into_iter().chain(core::iter::once(last)) {
        if !ctx.state.is_empty(needle) {
            ctx.stream.append(Instruction::Drop(needle));
            ctx.flush()?;
        }
    }
    Ok(())
}
