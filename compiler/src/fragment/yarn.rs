use knitc_knitout::{CarrierSet, Direction, Instruction, Needle};

use super::BuildContext;
use crate::CompileError;

/// Length of the optional knit tail worked before a yarn leaves.
const TAIL_STITCHES: usize = 5;

// YARN START
// ================================================================================================

/// Brings carriers in with the hook, anchors the yarn with seed tucks, and releases the hook.
///
/// Tuck passes alternate direction and needle parity, one pass per insert-depth level: the
/// first pass tucks the odd entries of the upcoming row in its knitting direction, the next
/// pass the even entries coming back, and so on. Knitting over the seeds locks the tail in.
pub(super) fn generate_start(
    ctx: &mut BuildContext<'_>,
    cs: &CarrierSet,
    needles: &[Needle],
    direction: Direction,
) -> Result<(), CompileError> {
    ctx.stream.append(Instruction::InHook(cs.clone()));
    for level in 0..ctx.options.insert_depth {
        let pass_direction = if level % 2 == 0 { direction } else { direction.reversed() };
        let parity = (level + 1) % 2;
        let mut order: alloc::vec::Vec<usize> =
            (0..needles.len()).filter(|index| index % 2 == parity).collect();
        if pass_direction != direction {
            order.reverse();
        }
        for index in order {
            ctx.stream.append(Instruction::Tuck(pass_direction, needles[index], cs.clone()));
        }
    }
    ctx.stream.append(Instruction::ReleaseHook(cs.clone()));
    Ok(())
}

// YARN END
// ================================================================================================

/// Works the optional tail, takes the carriers out with the hook, and drops the tail needle.
pub(super) fn generate_end(
    ctx: &mut BuildContext<'_>,
    cs: &CarrierSet,
    tail: Needle,
    direction: Direction,
    use_tail: bool,
) -> Result<(), CompileError> {
    if use_tail {
        let mut d = direction;
        for _ in 0..TAIL_STITCHES {
            ctx.stream.append(Instruction::Knit(d, tail, cs.clone()));
            d = d.reversed();
        }
    }
    ctx.stream.append(Instruction::OutHook(cs.clone()));
    if use_tail {
        ctx.stream.append(Instruction::Drop(tail));
    }
    Ok(())
}
