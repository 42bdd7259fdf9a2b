use alloc::vec::Vec;

use knitc_knitout::{Instruction, Needle};
use knitc_machine::MachineState;

use super::{PlanRequest, TransferSequence, TransferStep, carrier_safety_steps, racking_for};
use crate::PlanError;

// CONSTANTS
// ================================================================================================

/// Soft cap on rotation/shift passes before the planner bails out.
const MAX_PASSES: usize = 64;

// ROTATION / SHIFT PLANNER
// ================================================================================================

/// Planner phases; rotation and shifting alternate until both error measures reach zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Init,
    Rotating,
    Shifting,
    Done,
}

/// The four CCW corners of a tubular slice, in tie-breaking order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum Corner {
    FrontLeft,
    FrontRight,
    BackRight,
    BackLeft,
}

/// A rotation candidate: a run of wrong-side loops, the corner it rotates around, and the
/// translation applied as it crosses to the other bed.
#[derive(Clone, Debug)]
struct RotationOption {
    run: Vec<usize>,
    corner: Corner,
    delta: i32,
}

/// Transfer planner for two-sided (tubular) configurations.
///
/// The planner alternates two phases. While any loop sits on the wrong bed side (winding
/// error), it rotates a run of loops around one of the slice corners onto empty opposite
/// hooks, choosing the corner and translation whose simulated continuation needs the fewest
/// transfers. Once sides agree, shift passes stage blocks on the opposite bed and drop them
/// back shifted, repeating until every loop reaches its target offset.
pub struct RsPlanner<'a> {
    request: &'a PlanRequest,
    sim: MachineState,
    cur: Vec<Needle>,
    target: Vec<Needle>,
    sequence: TransferSequence,
    phase: Phase,
}

impl<'a> RsPlanner<'a> {
    /// Prepares a planner over a copy of the live state.
    pub fn new(state: &MachineState, request: &'a PlanRequest) -> Self {
        let mut sim = state.clone();
        sim.set_loop_tag(None);
        Self {
            request,
            sim,
            cur: request.sources.iter().map(|n| n.as_hook()).collect(),
            target: request.targets.iter().map(|n| n.as_hook()).collect(),
            sequence: TransferSequence::new(),
            phase: Phase::Init,
        }
    }

    /// Runs the planner to completion.
    pub fn plan(mut self) -> Result<TransferSequence, PlanError> {
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > MAX_PASSES {
                return Err(PlanError::StepLimitExceeded(MAX_PASSES));
            }
            if self.winding_error() > 0 {
                self.phase = Phase::Rotating;
            } else if self.pending_sum() > 0 {
                self.phase = Phase::Shifting;
            } else {
                self.phase = Phase::Done;
                return Ok(self.sequence);
            }
            log::trace!("rs planner pass {passes}: {:?}", self.phase);
            match self.phase {
                Phase::Rotating => self.rotate_once(true)?,
                Phase::Shifting => self.shift_once()?,
                Phase::Init | Phase::Done => unreachable!(),
            }
        }
    }

    // ERROR MEASURES
    // --------------------------------------------------------------------------------------------

    fn mismatch(&self, i: usize) -> bool {
        self.cur[i].bed.is_front() != self.target[i].bed.is_front()
    }

    /// Number of loops whose bed-side traversal disagrees with the target's.
    fn winding_error(&self) -> usize {
        (0..self.cur.len()).filter(|&i| self.mismatch(i)).count()
    }

    fn pending(&self, i: usize) -> i32 {
        self.target[i].offset - self.cur[i].offset
    }

    fn pending_sum(&self) -> i64 {
        (0..self.cur.len())
            .filter(|&i| !self.mismatch(i))
            .map(|i| self.pending(i).abs() as i64)
            .sum()
    }

    // ROTATION
    // --------------------------------------------------------------------------------------------

    /// Rotates one run of wrong-side loops around a corner.
    ///
    /// Every feasible (run, corner, translation) option is simulated through its shift
    /// continuation; the option needing the fewest transfers wins, ties going to the lower
    /// corner order and smaller translation.
    fn rotate_once(&mut self, simulate: bool) -> Result<(), PlanError> {
        let runs = self.mismatch_runs();
        let mut best: Option<(usize, usize, RotationOption)> = None;
        for run in &runs {
            for (order, corner) in self.run_corners(run) {
                for delta in translation_candidates(self.request.max_racking) {
                    let option = RotationOption { run: run.clone(), corner, delta };
                    if !self.rotation_feasible(&option) {
                        continue;
                    }
                    let cost = if simulate {
                        match self.simulate_option(&option) {
                            Some(cost) => cost,
                            None => continue,
                        }
                    } else {
                        option.run.len()
                    };
                    match &best {
                        Some((best_cost, best_order, best_option))
                            if (*best_cost, *best_order, best_option.delta.abs())
                                <= (cost, order, option.delta.abs()) => {},
                        _ => best = Some((cost, order, option)),
                    }
                }
            }
        }
        let Some((_, _, option)) = best else {
            return Err(PlanError::RotationExhausted { winding: self.winding_error() });
        };
        self.apply_rotation(&option)
    }

    /// Maximal same-bed runs of consecutive wrong-side indices, wrapping when the slice is
    /// circular. A run rotates around one corner, so it never mixes bed sides.
    fn mismatch_runs(&self) -> Vec<Vec<usize>> {
        let n = self.cur.len();
        let mut runs: Vec<Vec<usize>> = Vec::new();
        let mut open: Option<Vec<usize>> = None;
        for i in 0..n {
            if self.mismatch(i) {
                let breaks_side = open
                    .as_ref()
                    .and_then(|run| run.last())
                    .is_some_and(|&prev| {
                        self.cur[prev].bed.is_front() != self.cur[i].bed.is_front()
                    });
                if breaks_side {
                    runs.extend(open.take());
                }
                open.get_or_insert_with(Vec::new).push(i);
            } else if let Some(run) = open.take() {
                runs.push(run);
            }
        }
        if let Some(run) = open {
            runs.push(run);
        }
        // Wrap-around: a run ending at n-1 continues at 0 when both sit on the same bed.
        if self.request.circular && runs.len() > 1 {
            let joins = runs.first().is_some_and(|first| first[0] == 0)
                && runs.last().is_some_and(|last| *last.last().unwrap() == n - 1)
                && self.cur[runs[0][0]].bed.is_front()
                    == self.cur[*runs.last().unwrap().last().unwrap()].bed.is_front();
            if joins {
                let first = runs.remove(0);
                runs.last_mut().unwrap().extend(first);
            }
        }
        runs
    }

    /// The corners a run can rotate around, with their tie-breaking order.
    fn run_corners(&self, run: &[usize]) -> Vec<(usize, Corner)> {
        let on_front = self.cur[run[0]].bed.is_front();
        if on_front {
            vec![(0, Corner::FrontLeft), (1, Corner::FrontRight)]
        } else {
            vec![(2, Corner::BackRight), (3, Corner::BackLeft)]
        }
    }

    fn rotation_feasible(&self, option: &RotationOption) -> bool {
        for &i in &option.run {
            let dest = self.rotation_dest(i, option.delta);
            if dest.offset < self.request.min_free || dest.offset >= self.request.max_free {
                return false;
            }
            if !self.sim.is_empty(dest) {
                return false;
            }
            if self.cur.iter().enumerate().any(|(j, n)| !option.run.contains(&j) && *n == dest) {
                return false;
            }
        }
        // Slack at the run boundaries; interior distances are translation-invariant.
        for &i in &option.run {
            for j in self.slice_neighbors(i) {
                if option.run.contains(&j) {
                    continue;
                }
                let slack = self.pair_slack(i, j);
                let new_offset = self.rotation_dest(i, option.delta).offset;
                if (new_offset - self.cur[j].offset).abs() > slack {
                    return false;
                }
            }
        }
        true
    }

    fn rotation_dest(&self, i: usize, delta: i32) -> Needle {
        self.cur[i].opposite_hook().shifted(delta)
    }

    /// Slice neighbors of index i, respecting circularity.
    fn slice_neighbors(&self, i: usize) -> Vec<usize> {
        let n = self.cur.len();
        let mut neighbors = Vec::with_capacity(2);
        if i > 0 {
            neighbors.push(i - 1);
        } else if self.request.circular {
            neighbors.push(n - 1);
        }
        if i + 1 < n {
            neighbors.push(i + 1);
        } else if self.request.circular {
            neighbors.push(0);
        }
        neighbors
    }

    /// Slack binding the pair (i, j) where j is a slice neighbor of i.
    fn pair_slack(&self, i: usize, j: usize) -> i32 {
        let lower = if (j + 1) % self.cur.len() == i { j } else { i };
        self.request.slack.get(lower).copied().unwrap_or(i32::MAX)
    }

    /// Applies a rotation option: carrier safety, then direct transfers to the opposite hooks,
    /// working inward from the chosen corner.
    fn apply_rotation(&mut self, option: &RotationOption) -> Result<(), PlanError> {
        let mut run = option.run.clone();
        match option.corner {
            Corner::FrontLeft | Corner::BackLeft => run.sort_by_key(|&i| self.cur[i].offset),
            Corner::FrontRight | Corner::BackRight => {
                run.sort_by_key(|&i| core::cmp::Reverse(self.cur[i].offset))
            },
        }
        for &i in &run {
            let from = self.cur[i];
            let to = self.rotation_dest(i, option.delta);
            self.push_xfer(from, to)?;
            self.cur[i] = to;
        }
        Ok(())
    }

    /// Runs an option on a scratch copy and returns its total transfer cost.
    fn simulate_option(&self, option: &RotationOption) -> Option<usize> {
        let mut scratch = RsPlanner {
            request: self.request,
            sim: self.sim.clone(),
            cur: self.cur.clone(),
            target: self.target.clone(),
            sequence: TransferSequence::new(),
            phase: Phase::Rotating,
        };
        scratch.apply_rotation(option).ok()?;
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > MAX_PASSES {
                return None;
            }
            if scratch.winding_error() > 0 {
                scratch.rotate_once(false).ok()?;
            } else if scratch.pending_sum() > 0 {
                scratch.shift_once().ok()?;
            } else {
                return Some(scratch.sequence.xfer_count());
            }
        }
    }

    // SHIFTING
    // --------------------------------------------------------------------------------------------

    /// One shift iteration over the four (bed side, direction sign) groups.
    ///
    /// Each group splits at carrier barriers into blocks; a block stages on the opposite bed
    /// and returns shifted by a single uniform amount, so the whole block needs exactly two
    /// rackings. The iteration must strictly reduce the pending shift sum.
    fn shift_once(&mut self) -> Result<(), PlanError> {
        let before = self.pending_sum();
        for (front_side, sign) in [(true, 1), (true, -1), (false, 1), (false, -1)] {
            let mut group: Vec<usize> = (0..self.cur.len())
                .filter(|&i| {
                    !self.mismatch(i)
                        && self.cur[i].bed.is_front() == front_side
                        && self.pending(i).signum() == sign
                })
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by_key(|&i| self.cur[i].offset);
            for block in self.split_at_barriers(&group) {
                self.shift_block(&block, sign)?;
            }
        }
        let after = self.pending_sum();
        if after >= before {
            return Err(PlanError::ShiftStalled { pending: after });
        }
        Ok(())
    }

    /// Carrier barrier positions on the bed: a barrier at `b` blocks loop movement across the
    /// gap between offsets `b` and `b + 1`. Carriers anchored on a block needle do not pin
    /// their own block.
    fn carrier_barriers(&self, exclude: &[Needle]) -> Vec<i32> {
        let mut barriers = Vec::new();
        for carrier in self.sim.carriers() {
            if !carrier.active {
                continue;
            }
            let Some(anchor) = carrier.anchor else { continue };
            if exclude.iter().any(|n| n.offset == anchor.offset) {
                continue;
            }
            let barrier = match carrier.side {
                knitc_knitout::Side::Right => anchor.offset,
                knitc_knitout::Side::Left => anchor.offset - 1,
            };
            barriers.push(barrier);
        }
        barriers.sort_unstable();
        barriers.dedup();
        barriers
    }

    /// Splits an LTR-sorted group at carrier barriers.
    fn split_at_barriers(&self, group: &[usize]) -> Vec<Vec<usize>> {
        let needles: Vec<Needle> = group.iter().map(|&i| self.cur[i]).collect();
        let barriers = self.carrier_barriers(&needles);
        let mut blocks: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        for &i in group {
            let offset = self.cur[i].offset;
            if let Some(&last) = current.last() {
                let prev_offset = self.cur[last].offset;
                let crossed = barriers
                    .iter()
                    .any(|&b| prev_offset <= b && b < offset);
                if crossed {
                    blocks.push(core::mem::take(&mut current));
                }
            }
            current.push(i);
        }
        if !current.is_empty() {
            blocks.push(current);
        }
        blocks
    }

    /// Shifts one block by a uniform amount within its constraints, staging on the opposite
    /// bed: the opposite hooks at shift 0 when free, at ±1 otherwise, the opposite sliders as
    /// the fallback.
    fn shift_block(&mut self, block: &[usize], sign: i32) -> Result<(), PlanError> {
        // The staging lane bounds the return racking, so pick it before sizing the shift.
        let stage_shift = self.pick_stage_shift(block);
        let stage_cost = stage_shift.map(|s| s.abs()).unwrap_or(0);
        let mut delta = block
            .iter()
            .map(|&i| self.pending(i).abs())
            .min()
            .unwrap_or(0)
            .min(self.request.max_racking - stage_cost);

        let block_needles: Vec<Needle> = block.iter().map(|&i| self.cur[i]).collect();
        let barriers = self.carrier_barriers(&block_needles);
        if sign > 0 {
            let block_max = block_needles.iter().map(|n| n.offset).max().unwrap();
            if let Some(&barrier) = barriers.iter().find(|&&b| b >= block_max) {
                delta = delta.min(barrier - block_max);
            }
        } else {
            let block_min = block_needles.iter().map(|n| n.offset).min().unwrap();
            if let Some(&barrier) = barriers.iter().rev().find(|&&b| b < block_min) {
                delta = delta.min(block_min - barrier - 1);
            }
        }

        while delta > 0 && !self.block_move_legal(block, sign * delta) {
            delta -= 1;
        }
        if delta == 0 {
            return Ok(());
        }
        let shift = sign * delta;

        // Stash pass: everything crosses to the opposite bed at one racking.
        let stages: Vec<Needle> = block
            .iter()
            .map(|&i| match stage_shift {
                Some(s) => self.cur[i].opposite_hook().shifted(s),
                None => self.cur[i].opposite_slider(),
            })
            .collect();
        for (&i, stage) in block.iter().zip(stages.iter()) {
            self.push_xfer(self.cur[i], *stage)?;
        }
        // Return pass: drop back to the home side, shifted.
        for (&i, stage) in block.iter().zip(stages.iter()) {
            let home = self.cur[i].shifted(shift);
            self.push_xfer(*stage, home)?;
            self.cur[i] = home;
        }
        Ok(())
    }

    /// Checks the slack, merge, and free-range constraints of moving a whole block by `shift`.
    fn block_move_legal(&self, block: &[usize], shift: i32) -> bool {
        for &i in block {
            let new_offset = self.cur[i].offset + shift;
            if new_offset < self.request.min_free || new_offset >= self.request.max_free {
                return false;
            }
            // Loops may coincide only when both sit at their common final target. Needles the
            // block itself vacates during the stash pass are not obstacles.
            let landing = Needle::new(self.cur[i].bed, new_offset);
            let occupied_by_peer = self
                .cur
                .iter()
                .enumerate()
                .any(|(j, n)| !block.contains(&j) && *n == landing);
            let vacated = block.iter().any(|&b| self.cur[b] == landing);
            if occupied_by_peer || (!vacated && !self.sim.is_empty(landing)) {
                let arrives_home = self.pending(i) == shift;
                let residents_home = self
                    .cur
                    .iter()
                    .enumerate()
                    .filter(|(_, n)| **n == landing)
                    .all(|(j, _)| self.pending(j) == 0 && self.target[j] == landing);
                if !(arrives_home && residents_home && self.target[i] == landing) {
                    return false;
                }
            }
            for j in self.slice_neighbors(i) {
                if block.contains(&j) {
                    continue;
                }
                let neighbor_offset = self.cur[j].offset;
                if (new_offset - neighbor_offset).abs() > self.pair_slack(i, j) {
                    return false;
                }
            }
        }
        true
    }

    /// Chooses the staging lane for a block: `Some(shift)` for the opposite hooks, `None` for
    /// the opposite sliders.
    fn pick_stage_shift(&self, block: &[usize]) -> Option<i32> {
        'shifts: for stage_shift in [0, 1, -1] {
            for &i in block {
                let stage = self.cur[i].opposite_hook().shifted(stage_shift);
                if !self.sim.is_empty(stage) {
                    continue 'shifts;
                }
                if self.cur.iter().enumerate().any(|(j, n)| !block.contains(&j) && *n == stage) {
                    continue 'shifts;
                }
            }
            return Some(stage_shift);
        }
        None
    }

    // SHARED EMISSION HELPERS
    // --------------------------------------------------------------------------------------------

    /// Misses conflicting carriers away from a transfer's travel path.
    fn clear_carriers(&mut self, from: Needle, to: Needle) -> Result<(), PlanError> {
        if self.request.skip_carrier_safety {
            return Ok(());
        }
        for step in carrier_safety_steps(&self.sim, from, to) {
            if let TransferStep::Miss { cs, needle, side } = &step {
                self.sim
                    .execute(&Instruction::Miss(side.approach(), *needle, cs.clone()))
                    .map_err(|_| PlanError::CseInconsistent("carrier miss rejected".into()))?;
                self.sequence.push_miss(cs.clone(), *needle, *side);
            }
        }
        Ok(())
    }

    fn push_xfer(&mut self, from: Needle, to: Needle) -> Result<(), PlanError> {
        self.clear_carriers(from, to)?;
        let racking = racking_for(from, to);
        if racking.whole().abs() > self.request.max_racking {
            return Err(PlanError::RackingOutOfRange {
                racking,
                max_racking: self.request.max_racking,
            });
        }
        self.sim
            .execute(&Instruction::Rack(racking))
            .and_then(|_| self.sim.execute(&Instruction::Xfer(from, to)))
            .map_err(|_| PlanError::CseInconsistent(format!("planned transfer {from} -> {to}")))?;
        self.sequence.push_xfer(from, to);
        Ok(())
    }
}

/// Translation candidates in tie-breaking order: smallest magnitude first.
fn translation_candidates(max_racking: i32) -> Vec<i32> {
    let mut deltas = Vec::with_capacity((2 * max_racking + 1) as usize);
    deltas.push(0);
    for magnitude in 1..=max_racking {
        deltas.push(magnitude);
        deltas.push(-magnitude);
    }
    deltas
}
