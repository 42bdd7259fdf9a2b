use alloc::collections::BTreeMap;

use knitc_knitout::{Instruction, Needle, Racking};
use knitc_machine::LoopId;

use super::BuildContext;
use crate::{CompileError, plan::plan_transfers};

// SHAPING PASS
// ================================================================================================

/// Realizes a step's shaping: plans the loop movement, emits it, and verifies against the live
/// state that every recorded source loop ended up on its recorded target.
pub(super) fn generate(
    ctx: &mut BuildContext<'_>,
    sources: &[Needle],
    targets: &[Needle],
    circular: bool,
) -> Result<(), CompileError> {
    if sources.len() != targets.len() {
        return Err(CompileError::CardinalityMismatch {
            what: "shaping needles",
            left: sources.len(),
            right: targets.len(),
        });
    }
    ctx.flush()?;

    let mut expected: BTreeMap<LoopId, Needle> = BTreeMap::new();
    for (source, target) in sources.iter().zip(targets.iter()) {
        for lp in ctx.state.needle_loops(*source) {
            expected.insert(lp.id, target.as_hook());
        }
    }

    let sequence = plan_transfers(ctx.state, sources, targets, circular, ctx.options)?;
    let racking =
        sequence.emit_into(ctx.stream, ctx.state, ctx.state.racking(), ctx.options.multi_transfer);
    if racking != Racking::ZERO {
        ctx.stream.append(Instruction::Rack(Racking::ZERO));
    }
    ctx.flush()?;

    for (id, target) in expected {
        let actual = ctx.state.loop_needle(id);
        if actual != Some(target) {
            return Err(CompileError::LoopTargetMismatch { lp: id, expected: target, actual });
        }
    }
    Ok(())
}
