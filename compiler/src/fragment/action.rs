use alloc::vec::Vec;

use knitc_knitout::{Direction, Instruction, Needle, PresserMode, Racking};
use smallvec::SmallVec;

use super::BuildContext;
use crate::{
    CompileError, IntarsiaSide, IntarsiaTucks, MoveMap, PassPhase, ProgramId, TracedStitch,
    plan::{plan_transfers, racking_for},
    registry::ActionContext,
};

// ACTION ENTRY
// ================================================================================================

/// One stitch of an action pass: the traced stitch, the needle it knits on, its carriage
/// direction, and the action program driving it.
#[derive(Clone, Debug)]
pub struct ActionEntry {
    pub stitch: TracedStitch,
    pub needle: Needle,
    pub direction: Direction,
    pub program: ProgramId,
}

/// Options folded over a run's entries: counts are maxima, booleans are any-of.
#[derive(Clone, Debug, Default)]
struct FoldedOptions {
    pre_count: usize,
    main_count: usize,
    post_count: usize,
    split_by_side: bool,
    use_cse_moves: bool,
    quarter_racking: SmallVec<[bool; 2]>,
}

// ACTION PASS
// ================================================================================================

/// Emits a step's knitting: pre passes, main passes with side tucks and scoped presser /
/// quarter-racking, post passes, then the inter-pass moves the post passes requested.
pub(super) fn generate(
    ctx: &mut BuildContext<'_>,
    entries: &[ActionEntry],
    circular: bool,
) -> Result<(), CompileError> {
    if entries.is_empty() {
        return Err(CompileError::EmptyStep);
    }
    let folded = fold_options(ctx, entries)?;
    if folded.split_by_side {
        let mut start = 0;
        while start < entries.len() {
            let side = entries[start].needle.bed.is_front();
            let mut end = start + 1;
            while end < entries.len() && entries[end].needle.bed.is_front() == side {
                end += 1;
            }
            let run_folded = fold_options(ctx, &entries[start..end])?;
            generate_run(ctx, &entries[start..end], &run_folded, circular)?;
            start = end;
        }
        Ok(())
    } else {
        generate_run(ctx, entries, &folded, circular)
    }
}

fn fold_options(
    ctx: &BuildContext<'_>,
    entries: &[ActionEntry],
) -> Result<FoldedOptions, CompileError> {
    let mut folded = FoldedOptions::default();
    for entry in entries {
        let program = ctx.registry.get(entry.program)?;
        folded.pre_count = folded.pre_count.max(program.pre.len());
        folded.main_count = folded.main_count.max(program.main.len());
        folded.post_count = folded.post_count.max(program.post.len());
        folded.split_by_side |= program.split_by_side;
        folded.use_cse_moves |= program.use_cse_moves;
        for (index, quarter) in program.quarter_racking.iter().enumerate() {
            if folded.quarter_racking.len() <= index {
                folded.quarter_racking.push(false);
            }
            folded.quarter_racking[index] |= *quarter;
        }
    }
    Ok(folded)
}

fn generate_run(
    ctx: &mut BuildContext<'_>,
    entries: &[ActionEntry],
    folded: &FoldedOptions,
    circular: bool,
) -> Result<(), CompileError> {
    let mut moves = MoveMap::new();
    let mut racking = ctx.state.racking();
    let short_rows = entries.iter().any(|entry| entry.stitch.flags.short_row);

    for pass in 0..folded.pre_count {
        run_pass(ctx, entries, circular, PassPhase::Pre, pass, &mut moves, &mut racking)?;
    }

    // The presser stays on for exactly the main passes and comes back off on every exit path.
    if short_rows {
        ctx.stream.append(Instruction::Presser(PresserMode::On));
    }
    let main_result = (|| -> Result<(), CompileError> {
        for pass in 0..folded.main_count {
            let quarter = folded.quarter_racking.get(pass).copied().unwrap_or(false);
            if quarter {
                super::ensure_racking(ctx.stream, &mut racking, Racking::QUARTER);
            }
            let result =
                run_pass(ctx, entries, circular, PassPhase::Main, pass, &mut moves, &mut racking);
            if quarter {
                super::ensure_racking(ctx.stream, &mut racking, Racking::ZERO);
            }
            result?;
        }
        Ok(())
    })();
    if short_rows {
        ctx.stream.append(Instruction::Presser(PresserMode::Off));
    }
    main_result?;

    for pass in 0..folded.post_count {
        run_pass(ctx, entries, circular, PassPhase::Post, pass, &mut moves, &mut racking)?;
    }

    consume_moves(ctx, entries, &mut moves, folded.use_cse_moves, &mut racking)?;
    super::ensure_racking(ctx.stream, &mut racking, Racking::ZERO);
    ctx.flush()
}

/// Runs one pass list index over all entries.
fn run_pass(
    ctx: &mut BuildContext<'_>,
    entries: &[ActionEntry],
    circular: bool,
    phase: PassPhase,
    pass: usize,
    moves: &mut MoveMap,
    racking: &mut Racking,
) -> Result<(), CompileError> {
    for (index, entry) in entries.iter().enumerate() {
        // Keep the observed state current so tuck decisions and pass functions see the loops
        // formed earlier in this very pass.
        ctx.flush()?;
        let program = ctx.registry.get(entry.program)?;
        // Standard actions run on trace pass 0 only; the return traversal of a course would
        // otherwise knit everything twice.
        if entry.stitch.pass != 0 && entry.program.is_base() {
            continue;
        }
        let pass_fn = match phase {
            PassPhase::Pre => program.pre.get(pass),
            PassPhase::Main => program.main.get(pass),
            PassPhase::Post => program.post.get(pass),
        };
        let Some(pass_fn) = pass_fn.cloned() else { continue };

        if phase == PassPhase::Main {
            maybe_side_tuck(ctx, entries, index, circular, pass, IntarsiaSide::Before)?;
        }

        let next_needle = next_entry(entries, index, circular).map(|e| e.needle);
        let mut action_ctx = ActionContext {
            k: &mut *ctx.stream,
            d: entry.direction,
            n: entry.needle,
            ns: next_needle,
            rn: entry.needle.opposite_hook(),
            cs: entry.stitch.yarns.yarns.clone(),
            state: &*ctx.state,
            stitch: &entry.stitch,
            svs: ctx.options.use_svs,
            pass_index: pass,
            phase,
            moves: &mut *moves,
            rack: &mut *racking,
        };
        pass_fn.call(&mut action_ctx)?;

        if phase == PassPhase::Main {
            maybe_side_tuck(ctx, entries, index, circular, pass, IntarsiaSide::After)?;
        }
    }
    ctx.flush()
}

fn next_entry<'a>(
    entries: &'a [ActionEntry],
    index: usize,
    circular: bool,
) -> Option<&'a ActionEntry> {
    match entries.get(index + 1) {
        Some(entry) => Some(entry),
        None if circular && entries.len() > 1 => Some(&entries[0]),
        None => None,
    }
}

fn prev_entry<'a>(
    entries: &'a [ActionEntry],
    index: usize,
    circular: bool,
) -> Option<&'a ActionEntry> {
    if index > 0 {
        Some(&entries[index - 1])
    } else if circular && entries.len() > 1 {
        Some(&entries[entries.len() - 1])
    } else {
        None
    }
}

/// Emits the optional anchoring tuck next to an entry during a main pass.
///
/// Tucks anchor the working yarn against a neighbor at yarn boundaries (intarsia) and
/// short-row turns. They only apply on the program's front pass, never around splits, only
/// onto occupied needles, and under `safe_tucks` only onto single-loop needles.
fn maybe_side_tuck(
    ctx: &mut BuildContext<'_>,
    entries: &[ActionEntry],
    index: usize,
    circular: bool,
    pass: usize,
    side: IntarsiaSide,
) -> Result<(), CompileError> {
    let entry = &entries[index];
    let program = ctx.registry.get(entry.program)?;
    let is_split =
        entry.program == ProgramId::SPLIT || entry.program == ProgramId::RSPLIT;
    if is_split || program.front_pass != pass {
        return Ok(());
    }
    let neighbor = match side {
        IntarsiaSide::Before => prev_entry(entries, index, circular),
        IntarsiaSide::After => next_entry(entries, index, circular),
    };
    let Some(neighbor) = neighbor else { return Ok(()) };

    let short_row = entry.stitch.flags.short_row || neighbor.stitch.flags.short_row;
    let boundary = entry.stitch.yarns.yarns != neighbor.stitch.yarns.yarns;
    let applicable = if short_row {
        ctx.options.use_sr_tucks
    } else if boundary && ctx.options.intarsia_side == side {
        match ctx.options.intarsia_tucks {
            IntarsiaTucks::Both => true,
            IntarsiaTucks::Cw => entry.direction == Direction::Rightward,
            IntarsiaTucks::Ccw => entry.direction == Direction::Leftward,
            IntarsiaTucks::None => false,
        }
    } else {
        false
    };
    if !applicable {
        return Ok(());
    }

    let loops = ctx.state.needle_loops(neighbor.needle).len();
    if loops == 0 || (ctx.options.safe_tucks && loops > 1) {
        return Ok(());
    }
    ctx.stream.append(Instruction::Tuck(
        entry.direction,
        neighbor.needle,
        entry.stitch.yarns.yarns.clone(),
    ));
    ctx.stream.set_metadata(-1, entry.stitch.index as i64)?;
    Ok(())
}

/// Realizes the inter-pass shifts post passes recorded.
fn consume_moves(
    ctx: &mut BuildContext<'_>,
    entries: &[ActionEntry],
    moves: &mut MoveMap,
    use_cse_moves: bool,
    racking: &mut Racking,
) -> Result<(), CompileError> {
    if moves.is_empty() {
        return Ok(());
    }
    let requested: Vec<(usize, i32)> = moves.drain().collect();
    let entry_needle = |stitch: usize| {
        entries
            .iter()
            .find(|entry| entry.stitch.index == stitch)
            .map(|entry| entry.needle)
    };

    if use_cse_moves {
        // Route all moves through the planner in one batch.
        ctx.flush()?;
        let mut sources = Vec::new();
        let mut targets = Vec::new();
        for (stitch, delta) in &requested {
            let Some(needle) = entry_needle(*stitch) else { continue };
            sources.push(needle);
            targets.push(needle.shifted(*delta));
        }
        let sequence = plan_transfers(ctx.state, &sources, &targets, false, ctx.options)?;
        *racking = sequence.emit_into(ctx.stream, ctx.state, *racking, ctx.options.multi_transfer);
        return ctx.flush();
    }

    for (stitch, delta) in requested {
        let Some(needle) = entry_needle(stitch) else { continue };
        let stage = needle.opposite_slider();
        let home = needle.shifted(delta);
        super::ensure_racking(ctx.stream, racking, racking_for(needle, stage));
        ctx.stream.append(Instruction::Xfer(needle, stage));
        super::ensure_racking(ctx.stream, racking, racking_for(stage, home));
        ctx.stream.append(Instruction::Xfer(stage, home));
    }
    ctx.flush()
}
