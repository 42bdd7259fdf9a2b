use alloc::vec::Vec;

use knitc_knitout::{Instruction, Needle, Racking};

use super::BuildContext;
use crate::{CompileError, PlanError, plan::racking_for};

/// Largest per-round shift; bigger translations take additional rounds.
const MAX_SHIFT: i32 = 2;

// ALIGNMENT PASS
// ================================================================================================

/// Realizes inter-step translations: no topological change, each loop just slides along its
/// bed.
///
/// Every round stashes the still-pending movers on the opposite sliders, returns them grouped
/// by shift (clamped to ±2, one racking per group), and checks that the total pending shift
/// strictly decreased.
pub(super) fn generate(
    ctx: &mut BuildContext<'_>,
    sources: &[Needle],
    targets: &[Needle],
) -> Result<(), CompileError> {
    if sources.len() != targets.len() {
        return Err(CompileError::CardinalityMismatch {
            what: "alignment needles",
            left: sources.len(),
            right: targets.len(),
        });
    }
    ctx.flush()?;

    // Remaining movement per loop, keyed by its current needle.
    let mut pending: Vec<(Needle, i32)> = sources
        .iter()
        .zip(targets.iter())
        .filter(|(source, target)| source != target)
        .map(|(source, target)| (*source, target.offset - source.offset))
        .collect();
    let mut racking = ctx.state.racking();

    let mut total: i64 = pending.iter().map(|(_, shift)| shift.abs() as i64).sum();
    while total > 0 {
        for front_side in [true, false] {
            let mut movers: Vec<usize> = pending
                .iter()
                .enumerate()
                .filter(|(_, (needle, shift))| {
                    needle.bed.is_front() == front_side && *shift != 0
                })
                .map(|(index, _)| index)
                .collect();
            if movers.is_empty() {
                continue;
            }
            movers.sort_by_key(|&index| pending[index].0.offset);

            // Stash every mover on the opposite slider at racking 0.
            super::ensure_racking(ctx.stream, &mut racking, Racking::ZERO);
            for &index in &movers {
                let (needle, _) = pending[index];
                ctx.stream.append(Instruction::Xfer(needle, needle.opposite_slider()));
            }

            // Return shift group by shift group, one racking each.
            for delta in [-MAX_SHIFT, -1, 1, MAX_SHIFT] {
                let group: Vec<usize> = movers
                    .iter()
                    .copied()
                    .filter(|&index| pending[index].1.clamp(-MAX_SHIFT, MAX_SHIFT) == delta)
                    .collect();
                if group.is_empty() {
                    continue;
                }
                let stage = pending[group[0]].0.opposite_slider();
                let home = pending[group[0]].0.shifted(delta);
                super::ensure_racking(ctx.stream, &mut racking, racking_for(stage, home));
                for index in group {
                    let (needle, shift) = pending[index];
                    ctx.stream
                        .append(Instruction::Xfer(needle.opposite_slider(), needle.shifted(delta)));
                    pending[index] = (needle.shifted(delta), shift - delta);
                }
            }
        }
        let after: i64 = pending.iter().map(|(_, shift)| shift.abs() as i64).sum();
        if after >= total {
            return Err(CompileError::Plan(PlanError::ShiftStalled { pending: after }));
        }
        total = after;
    }
    super::ensure_racking(ctx.stream, &mut racking, Racking::ZERO);
    ctx.flush()?;
    Ok(())
}
