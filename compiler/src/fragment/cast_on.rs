use knitc_knitout::{CarrierSet, Direction, Instruction, Needle};

use super::BuildContext;
use crate::{CastOnType, CompileError};

/// The kickback pattern needs room to look three entries back.
const KICKBACK_MIN: usize = 5;

// CAST-ON
// ================================================================================================

pub(super) fn generate(
    ctx: &mut BuildContext<'_>,
    needles: &[Needle],
    direction: Direction,
    cs: &CarrierSet,
    circular: bool,
) -> Result<(), CompileError> {
    if needles.len() < 2 {
        return Err(CompileError::EmptyStep);
    }
    match ctx.options.cast_on_type {
        CastOnType::Kickback if circular && needles.len() >= KICKBACK_MIN => {
            kickback(ctx, needles, direction, cs)
        },
        _ => interlock(ctx, needles, direction, cs, circular),
    }
}

/// Interlock cast-on: half the needles in one pass, the other half in a second.
///
/// Flat fabric knits the second pass coming back; circular fabric keeps both passes in the
/// round's direction so the joins line up.
fn interlock(
    ctx: &mut BuildContext<'_>,
    needles: &[Needle],
    direction: Direction,
    cs: &CarrierSet,
    circular: bool,
) -> Result<(), CompileError> {
    for index in (0..needles.len()).filter(|index| index % 2 == 0) {
        ctx.stream.append(Instruction::Knit(direction, needles[index], cs.clone()));
    }
    let odd = (0..needles.len()).filter(|index| index % 2 == 1);
    if circular {
        for index in odd {
            ctx.stream.append(Instruction::Knit(direction, needles[index], cs.clone()));
        }
    } else {
        for index in odd.rev() {
            ctx.stream
                .append(Instruction::Knit(direction.reversed(), needles[index], cs.clone()));
        }
    }
    Ok(())
}

/// Kickback cast-on for circular fabric: each position anchors against earlier ones with the
/// pattern (i−3, i−2, i, i−1 backward).
fn kickback(
    ctx: &mut BuildContext<'_>,
    needles: &[Needle],
    direction: Direction,
    cs: &CarrierSet,
) -> Result<(), CompileError> {
    let n = needles.len();
    let mut i = 3;
    while i < n {
        ctx.stream.append(Instruction::Knit(direction, needles[i - 3], cs.clone()));
        ctx.stream.append(Instruction::Knit(direction, needles[i - 2], cs.clone()));
        ctx.stream.append(Instruction::Knit(direction, needles[i], cs.clone()));
        ctx.stream
            .append(Instruction::Knit(direction.reversed(), needles[i - 1], cs.clone()));
        i += 4;
    }
    // Positions the stride left uncovered knit plainly in order.
    let mut covered = alloc::vec![false; n];
    let mut i = 3;
    while i < n {
        covered[i - 3] = true;
        covered[i - 2] = true;
        covered[i] = true;
        covered[i - 1] = true;
        i += 4;
    }
    for (index, done) in covered.iter().enumerate() {
        if !done {
            ctx.stream.append(Instruction::Knit(direction, needles[index], cs.clone()));
        }
    }
    Ok(())
}
