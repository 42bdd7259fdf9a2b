use alloc::vec::Vec;

use knitc_knitout::{Instruction, Needle};
use knitc_machine::MachineState;

use super::{PlanRequest, TransferSequence, TransferStep, carrier_safety_steps, racking_for};
use crate::PlanError;

// CSE ORACLE CONTRACT
// ================================================================================================

/// The inputs handed to a collapse-shift-expand solver.
#[derive(Clone, Debug)]
pub struct CseRequest<'a> {
    pub sources: &'a [Needle],
    pub targets: &'a [Needle],
    pub slack: &'a [i32],
    pub max_racking: i32,
    pub min_free: i32,
    pub max_free: i32,
}

/// A one-dimensional transfer solver, consumed as an opaque oracle.
///
/// The solver returns raw (source, destination) pairs in emission order, or `None` when it
/// cannot produce a plan. Pruning, reduction, carrier safety, and verification all happen on
/// this side of the interface.
pub trait CseSolver {
    fn solve(&self, request: &CseRequest<'_>) -> Option<Vec<(Needle, Needle)>>;
}

// FLAT SOLVER
// ================================================================================================

/// Built-in solver for the one-sided case: collapse every source to the opposite slider,
/// then expand shift-group by shift-group onto the target hooks.
pub struct FlatCseSolver;

impl CseSolver for FlatCseSolver {
    fn solve(&self, request: &CseRequest<'_>) -> Option<Vec<(Needle, Needle)>> {
        let n = request.sources.len();
        if n == 0 {
            return Some(Vec::new());
        }
        let side = request.sources[0].bed.is_front();
        let one_sided = request
            .sources
            .iter()
            .chain(request.targets.iter())
            .all(|needle| needle.bed.is_front() == side && !needle.bed.is_slider());
        if !one_sided {
            return None;
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| request.sources[i].offset);

        let shift =
            |i: usize| request.targets[i].offset - request.sources[i].offset;
        if order.iter().any(|&i| shift(i).abs() > request.max_racking) {
            return None;
        }

        let mut pairs = Vec::with_capacity(2 * n);
        for &i in &order {
            pairs.push((request.sources[i], request.sources[i].opposite_slider()));
        }
        let mut shifts: Vec<i32> = order.iter().map(|&i| shift(i)).collect();
        shifts.sort_unstable();
        shifts.dedup();
        for delta in shifts {
            for &i in &order {
                if shift(i) == delta {
                    pairs.push((request.sources[i].opposite_slider(), request.targets[i]));
                }
            }
        }
        Some(pairs)
    }
}

// PLANNING AROUND THE ORACLE
// ================================================================================================

/// Runs the oracle and turns its raw pairs into a safe transfer sequence: prunes identity and
/// empty-source transfers, optionally drops identity collapse/expand triplets, and interleaves
/// carrier-safety misses.
pub fn plan_cse(
    state: &MachineState,
    request: &PlanRequest,
    solver: &dyn CseSolver,
    reduce: bool,
) -> Result<TransferSequence, PlanError> {
    let oracle_request = CseRequest {
        sources: &request.sources,
        targets: &request.targets,
        slack: &request.slack,
        max_racking: request.max_racking,
        min_free: request.min_free,
        max_free: request.max_free,
    };
    let raw = solver.solve(&oracle_request).ok_or(PlanError::EmptyPlan)?;

    let mut pairs = prune(state, raw)?;
    if reduce {
        pairs = reduce_triplets(pairs);
    }

    let mut sequence = TransferSequence::new();
    let mut sim = state.clone();
    for (from, to) in pairs {
        if !request.skip_carrier_safety {
            for step in carrier_safety_steps(&sim, from, to) {
                if let TransferStep::Miss { cs, needle, side } = &step {
                    sim.execute(&Instruction::Miss(side.approach(), *needle, cs.clone()))
                        .map_err(|_| PlanError::CseInconsistent("carrier miss rejected".into()))?;
                    sequence.push_miss(cs.clone(), *needle, *side);
                }
            }
        }
        sim.execute(&Instruction::Rack(racking_for(from, to)))
            .and_then(|_| sim.execute(&Instruction::Xfer(from, to)))
            .map_err(|_| {
                PlanError::CseInconsistent(format!("oracle transfer {from} -> {to} is illegal"))
            })?;
        sequence.push_xfer(from, to);
    }
    Ok(sequence)
}

/// Drops identity transfers and transfers from needles that hold no loops.
fn prune(
    state: &MachineState,
    raw: Vec<(Needle, Needle)>,
) -> Result<Vec<(Needle, Needle)>, PlanError> {
    let mut sim = state.clone();
    let mut kept = Vec::with_capacity(raw.len());
    for (from, to) in raw {
        if from == to || sim.is_empty(from) {
            continue;
        }
        sim.execute(&Instruction::Rack(racking_for(from, to)))
            .and_then(|_| sim.execute(&Instruction::Xfer(from, to)))
            .map_err(|_| {
                PlanError::CseInconsistent(format!("oracle transfer {from} -> {to} is illegal"))
            })?;
        kept.push((from, to));
    }
    Ok(kept)
}

/// Removes collapse/expand pairs whose full triplet effect is the identity.
///
/// A triplet is keyed by its slider staging needle: the transfer onto the slider is the
/// collapse, the transfers off it are the expands. When a slider's only expand returns the
/// loops exactly where the collapse picked them up, both transfers are dead.
fn reduce_triplets(pairs: Vec<(Needle, Needle)>) -> Vec<(Needle, Needle)> {
    let mut drop = vec![false; pairs.len()];
    for (ci, (c_from, c_to)) in pairs.iter().enumerate() {
        if !c_to.bed.is_slider() {
            continue;
        }
        let expands: Vec<usize> = pairs
            .iter()
            .enumerate()
            .filter(|(ei, (e_from, _))| *ei > ci && e_from == c_to)
            .map(|(ei, _)| ei)
            .collect();
        if let [ei] = expands.as_slice() {
            if pairs[*ei].1 == *c_from {
                drop[ci] = true;
                drop[*ei] = true;
            }
        }
    }
    pairs
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop[*i])
        .map(|(_, pair)| pair)
        .collect()
}

// TESTS
// ================================================================================================
