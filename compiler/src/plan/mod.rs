//! Transfer planning: given loops on needles and the needles they must reach, produce a short
//! legal sequence of rackings, transfers, and carrier moves.
//!
//! Two planners are offered. The collapse-shift-expand path drives a one-dimensional oracle and
//! post-processes its output; the rotation/shift planner handles two-sided (tubular)
//! configurations. Both produce a [TransferSequence] that the shaping fragment emits and the
//! shared verifier replays against a copy of the machine state before anything reaches the
//! output stream.

use alloc::{collections::BTreeMap, vec::Vec};

use knitc_knitout::{Bed, CarrierSet, Instruction, Needle, Racking, Side, Stream};
use knitc_machine::{LoopId, MachineState};

use crate::{CompilerOptions, Gauge, PlanError, ShapingAlgorithm};

mod cse;
mod gauge;
mod rs;
mod slack;

pub use cse::{CseRequest, CseSolver, FlatCseSolver};
pub use gauge::{full_to_half, half_to_full, is_complete_half_gauge};
pub use rs::RsPlanner;
pub use slack::compute_slack;

// TRANSFER SEQUENCE
// ================================================================================================

/// One abstract step of a planned transfer sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferStep {
    /// Move all loops from one needle to the other (opposite bed sides).
    Xfer { from: Needle, to: Needle },
    /// Miss the carriers to the given side of a needle, clearing them out of a transfer's way.
    Miss {
        cs: CarrierSet,
        needle: Needle,
        side: Side,
    },
}

impl TransferStep {
    /// Returns the racking this step requires, if it is a transfer.
    pub fn required_racking(&self) -> Option<Racking> {
        match self {
            TransferStep::Xfer { from, to } => Some(racking_for(*from, *to)),
            TransferStep::Miss { .. } => None,
        }
    }
}

/// Returns the racking that aligns `from` with `to` for a transfer.
pub fn racking_for(from: Needle, to: Needle) -> Racking {
    if from.bed.is_front() {
        Racking::from_whole(from.offset - to.offset)
    } else {
        Racking::from_whole(to.offset - from.offset)
    }
}

/// An ordered list of planned transfer steps, still abstract of rackings and pass grouping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferSequence {
    steps: Vec<TransferStep>,
}

impl TransferSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_xfer(&mut self, from: Needle, to: Needle) {
        self.steps.push(TransferStep::Xfer { from, to });
    }

    pub fn push_miss(&mut self, cs: CarrierSet, needle: Needle, side: Side) {
        self.steps.push(TransferStep::Miss { cs, needle, side });
    }

    pub fn extend(&mut self, other: TransferSequence) {
        self.steps.extend(other.steps);
    }

    pub fn steps(&self) -> &[TransferStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of transfer (not carrier-miss) steps.
    pub fn xfer_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, TransferStep::Xfer { .. }))
            .count()
    }

    /// Applies the sequence to a machine state, including the implied rack instructions.
    pub fn replay(&self, state: &mut MachineState) -> Result<(), PlanError> {
        for step in &self.steps {
            match step {
                TransferStep::Xfer { from, to } => {
                    let racking = racking_for(*from, *to);
                    state
                        .execute(&Instruction::Rack(racking))
                        .and_then(|_| state.execute(&Instruction::Xfer(*from, *to)))
                        .map_err(|_| PlanError::CseInconsistent(format!(
                            "illegal transfer {from} -> {to}"
                        )))?;
                },
                TransferStep::Miss { cs, needle, side } => {
                    state
                        .execute(&Instruction::Miss(side.approach(), *needle, cs.clone()))
                        .map_err(|_| PlanError::CseInconsistent(format!(
                            "carrier miss failed at {needle}"
                        )))?;
                },
            }
        }
        Ok(())
    }

    /// Emits the sequence as knitout, returning the racking left active.
    ///
    /// A `rack` line precedes any transfer whose racking differs from the previous one. With
    /// `multi_transfer`, consecutive transfers sharing a source side and racking are grouped
    /// into passes; a pass whose sources hold stacked loops is repeated per extra loop with a
    /// re-transfer comment.
    pub fn emit_into(
        &self,
        stream: &mut Stream,
        state: &MachineState,
        mut racking: Racking,
        multi_transfer: bool,
    ) -> Racking {
        let mut index = 0;
        while index < self.steps.len() {
            match &self.steps[index] {
                TransferStep::Miss { cs, needle, side } => {
                    stream.append(Instruction::Miss(side.approach(), *needle, cs.clone()));
                    index += 1;
                },
                TransferStep::Xfer { from, to } => {
                    let pass_racking = racking_for(*from, *to);
                    let side = from.bed.is_front();
                    let mut pass = vec![(*from, *to)];
                    if multi_transfer {
                        while let Some(TransferStep::Xfer { from: f, to: t }) =
                            self.steps.get(index + pass.len())
                        {
                            if f.bed.is_front() != side || racking_for(*f, *t) != pass_racking {
                                break;
                            }
                            pass.push((*f, *t));
                        }
                    }
                    if racking != pass_racking {
                        stream.append(Instruction::Rack(pass_racking));
                        racking = pass_racking;
                    }
                    let mut deepest = 1;
                    for (f, t) in &pass {
                        deepest = deepest.max(state.needle_loops(*f).len());
                        stream.append(Instruction::Xfer(*f, *t));
                    }
                    // Stacked sources need the pass repeated so every loop crosses over.
                    for _ in 1..deepest {
                        for (i, (f, t)) in pass.iter().enumerate() {
                            stream.append(Instruction::Xfer(*f, *t));
                            if i == 0 {
                                let _ = stream.set_comment(-1, "re-transfer");
                            }
                        }
                    }
                    index += pass.len();
                },
            }
        }
        racking
    }
}

// CARRIER SAFETY
// ================================================================================================

/// Returns the carrier-miss steps needed before transferring from `from` to `to`.
///
/// Only carriers sitting on the side the loops travel toward can snag; a pure cross-bed
/// transfer needs no clearing. Conflicting carriers are grouped by their (anchor offset, side)
/// position and each group is missed once, to the opposite side of its anchor.
pub fn carrier_safety_steps(state: &MachineState, from: Needle, to: Needle) -> Vec<TransferStep> {
    let travel = to.offset - from.offset;
    if travel == 0 {
        return Vec::new();
    }
    let travel_side = if travel < 0 { Side::Left } else { Side::Right };
    let mut names = state.carrier_conflicts(from);
    names.extend(state.carrier_conflicts(to));
    let mut groups: BTreeMap<(i32, bool), (Needle, Side, CarrierSet)> = BTreeMap::new();
    for name in names {
        let Some(carrier) = state.carrier(&name) else { continue };
        let Some(anchor) = carrier.anchor else { continue };
        if carrier.side != travel_side {
            continue;
        }
        let key = (anchor.offset, matches!(carrier.side, Side::Right));
        let entry = groups
            .entry(key)
            .or_insert_with(|| (anchor, carrier.side.opposite(), CarrierSet::new()));
        entry.2.push(name);
    }
    groups
        .into_values()
        .map(|(needle, side, cs)| TransferStep::Miss { cs, needle, side })
        .collect()
}

// PLAN REQUEST / ENTRY POINT
// ================================================================================================

/// Inputs shared by both planning algorithms.
#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub sources: Vec<Needle>,
    pub targets: Vec<Needle>,
    /// Max permitted distance between slice-consecutive loops; `slack[i]` binds (i, i+1).
    pub slack: Vec<i32>,
    pub circular: bool,
    pub max_racking: i32,
    /// Half-open staging bound on the left of the active block.
    pub min_free: i32,
    /// Half-open staging bound on the right of the active block.
    pub max_free: i32,
    /// Set on the half-gauge fast path, where expanded space makes conflicts impossible.
    pub skip_carrier_safety: bool,
}

impl PlanRequest {
    /// Builds a request from matched source/target needles against the live state.
    pub fn new(
        state: &MachineState,
        sources: Vec<Needle>,
        targets: Vec<Needle>,
        circular: bool,
        max_racking: i32,
    ) -> Result<Self, PlanError> {
        if sources.len() != targets.len() {
            return Err(PlanError::CardinalityMismatch {
                sources: sources.len(),
                targets: targets.len(),
            });
        }
        let slack = compute_slack(&sources, &targets, circular);
        let (min_free, max_free) = staging_range(state, &sources, &targets, max_racking);
        Ok(Self {
            sources,
            targets,
            slack,
            circular,
            max_racking,
            min_free,
            max_free,
            skip_carrier_safety: false,
        })
    }

    /// Returns true when sources or targets span both bed sides.
    pub fn is_two_sided(&self) -> bool {
        let mut front = false;
        let mut back = false;
        for needle in self.sources.iter().chain(self.targets.iter()) {
            if needle.bed.is_front() {
                front = true;
            } else {
                back = true;
            }
        }
        front && back
    }
}

/// Computes the free staging offsets on each side of the block worked by a plan.
///
/// The bounds start one maximum racking beyond the block and shrink to exclude offsets occupied
/// by loops that are not part of the plan.
pub fn staging_range(
    state: &MachineState,
    sources: &[Needle],
    targets: &[Needle],
    max_racking: i32,
) -> (i32, i32) {
    let offsets = || sources.iter().chain(targets.iter()).map(|n| n.offset);
    let block_min = offsets().min().unwrap_or(0);
    let block_max = offsets().max().unwrap_or(0);
    let mut min_free = block_min - max_racking;
    let mut max_free = block_max + max_racking + 1;
    let participating =
        |offset: i32| sources.iter().any(|n| n.offset == offset) || targets.iter().any(|n| n.offset == offset);
    for bed in Bed::ALL {
        for offset in state.bed(bed).occupied_offsets() {
            if participating(offset) {
                continue;
            }
            if offset < block_min {
                min_free = min_free.max(offset + 1);
            } else if offset > block_max {
                max_free = max_free.min(offset);
            }
        }
    }
    (min_free, max_free)
}

/// Plans the transfers moving every source loop to its matched target.
///
/// Picks the rotation/shift planner for two-sided configurations (or when configured), the
/// collapse-shift-expand oracle otherwise, and verifies the result by replay before returning
/// it. On the half-gauge fast path, planning happens in contracted full-gauge space.
pub fn plan_transfers(
    state: &MachineState,
    sources: &[Needle],
    targets: &[Needle],
    circular: bool,
    options: &CompilerOptions,
) -> Result<TransferSequence, PlanError> {
    let request = PlanRequest::new(
        state,
        sources.to_vec(),
        targets.to_vec(),
        circular,
        options.max_racking,
    )?;

    if sources == targets {
        return Ok(TransferSequence::new());
    }

    // Half-gauge states plan in contracted space where every other needle is free by
    // construction, then map back to physical offsets.
    if options.gauge == Gauge::Half && is_complete_half_gauge(state, sources, targets) {
        let contracted_sources: Vec<_> = sources.iter().map(|n| half_to_full(*n)).collect();
        let contracted_targets: Vec<_> = targets.iter().map(|n| half_to_full(*n)).collect();
        let mut contracted_state = MachineState::new();
        seed_contracted(state, &mut contracted_state, sources);
        let mut contracted_request = PlanRequest::new(
            &contracted_state,
            contracted_sources,
            contracted_targets,
            circular,
            options.max_racking,
        )?;
        contracted_request.skip_carrier_safety = true;
        let planned = run_planner(&contracted_state, &contracted_request, options)?;
        let mut expanded = TransferSequence::new();
        for step in planned.steps() {
            match step {
                TransferStep::Xfer { from, to } => expanded.push_xfer(full_to_half(*from), full_to_half(*to)),
                TransferStep::Miss { cs, needle, side } => {
                    expanded.push_miss(cs.clone(), full_to_half(*needle), *side)
                },
            }
        }
        verify_sequence(state, &expanded, sources, targets)?;
        return Ok(expanded);
    }

    let sequence = run_planner(state, &request, options)?;
    verify_sequence(state, &sequence, sources, targets)?;
    Ok(sequence)
}

fn run_planner(
    state: &MachineState,
    request: &PlanRequest,
    options: &CompilerOptions,
) -> Result<TransferSequence, PlanError> {
    if request.is_two_sided() || options.shaping_algorithm == ShapingAlgorithm::Rs {
        log::debug!("planning {} loops via rotation/shift", request.sources.len());
        RsPlanner::new(state, request).plan()
    } else {
        log::debug!("planning {} loops via collapse-shift-expand", request.sources.len());
        cse::plan_cse(state, request, &FlatCseSolver, options.reduce_transfers)
    }
}

/// Copies the plan-relevant loops of `state` into a contracted full-gauge state.
fn seed_contracted(state: &MachineState, contracted: &mut MachineState, sources: &[Needle]) {
    let cs = CarrierSet::single("0");
    let _ = contracted.consume(&Instruction::InHook(cs.clone()));
    for source in sources {
        let contracted_needle = half_to_full(*source);
        for _ in state.needle_loops(*source) {
            let _ = contracted.consume(&Instruction::Tuck(
                knitc_knitout::Direction::Rightward,
                contracted_needle,
                cs.clone(),
            ));
        }
    }
}

// VERIFICATION
// ================================================================================================

/// Replays a sequence against a copy of the state and checks that every source loop reaches its
/// recorded target, merging only at explicit decrease targets.
pub fn verify_sequence(
    state: &MachineState,
    sequence: &TransferSequence,
    sources: &[Needle],
    targets: &[Needle],
) -> Result<(), PlanError> {
    let mut expected: BTreeMap<LoopId, Needle> = BTreeMap::new();
    for (source, target) in sources.iter().zip(targets.iter()) {
        for lp in state.needle_loops(*source) {
            expected.insert(lp.id, target.as_hook());
        }
    }
    if expected.is_empty() {
        return Ok(());
    }
    if sequence.is_empty() && sources != targets {
        return Err(PlanError::EmptyPlan);
    }

    let mut replayed = state.clone();
    replayed.set_loop_tag(None);
    for step in sequence.steps() {
        if let TransferStep::Xfer { from, to } = step {
            // A landing on an occupied hook must be a final decrease: everything already
            // there, and everything arriving, is expected exactly at that hook.
            if !replayed.is_empty(*to) && !to.bed.is_slider() {
                let arriving_ok = replayed
                    .needle_loops(*from)
                    .iter()
                    .all(|lp| expected.get(&lp.id) == Some(&to.as_hook()));
                let resident_ok = replayed
                    .needle_loops(*to)
                    .iter()
                    .all(|lp| expected.get(&lp.id) == Some(&to.as_hook()));
                if !(arriving_ok && resident_ok) {
                    return Err(PlanError::IllegalMerge { to: *to });
                }
            }
        }
        let mut single = TransferSequence::new();
        single.steps.push(step.clone());
        single.replay(&mut replayed)?;
    }

    for (id, target) in &expected {
        match replayed.loop_needle(*id) {
            Some(needle) if needle == *target => {},
            _ => {
                return Err(PlanError::CseInconsistent(format!(
                    "loop {id:?} did not reach {target}"
                )));
            },
        }
    }
    if replayed.has_pending_sliders() {
        return Err(PlanError::CseInconsistent("sliders left pending".into()));
    }
    Ok(())
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests;
