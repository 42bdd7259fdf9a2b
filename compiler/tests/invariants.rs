//! Property checks over the planner and whole compilations.

use knitc_compiler::{
    Compiler, CompilerOptions, ShapingKind, Step, StitchBlock, TracedStitch, YarnNode,
    knitout::{CarrierSet, Direction, Instruction, Needle},
    machine::MachineState,
    plan::{TransferStep, compute_slack, plan_transfers},
};
use proptest::prelude::*;

// HELPERS
// ================================================================================================

fn seeded(needles: &[Needle]) -> MachineState {
    let cs = CarrierSet::single("1");
    let mut state = MachineState::new();
    state.consume(&Instruction::InHook(cs.clone())).unwrap();
    for needle in needles {
        state
            .consume(&Instruction::Knit(Direction::Rightward, *needle, cs.clone()))
            .unwrap();
    }
    state.consume(&Instruction::OutHook(cs)).unwrap();
    state
}

fn knit_row_node(width: usize) -> YarnNode {
    let trace: Vec<TracedStitch> =
        (0..width).map(|index| TracedStitch::knit(index, "1")).collect();
    let needles: Vec<Needle> = (0..width as i32).map(Needle::front).collect();
    let block = StitchBlock {
        stitches: (0..width).collect(),
        needles: needles.clone(),
        targets: needles,
        direction: Direction::Rightward,
        active_index: 0,
        circular: false,
        starts_yarn: true,
        ends_yarn: false,
        needs_cast_on: false,
        needs_cast_off: false,
        row: 0,
    };
    YarnNode {
        trace,
        steps: vec![Step { block }],
        ..YarnNode::default()
    }
}

/// Replays a sequence step by step, checking loop conservation and slack after every transfer.
fn replay_checking_invariants(
    state: &MachineState,
    sequence: &knitc_compiler::plan::TransferSequence,
    sources: &[Needle],
    targets: &[Needle],
) {
    let ids: Vec<_> = sources
        .iter()
        .map(|needle| state.needle_loops(*needle)[0].id)
        .collect();
    let slack = compute_slack(sources, targets, false);

    let mut replayed = state.clone();
    for step in sequence.steps() {
        let mut single = knitc_compiler::plan::TransferSequence::new();
        match step {
            TransferStep::Xfer { from, to } => single.push_xfer(*from, *to),
            TransferStep::Miss { cs, needle, side } => {
                single.push_miss(cs.clone(), *needle, *side)
            },
        }
        single.replay(&mut replayed).unwrap();

        // Loop conservation: every source loop is somewhere on the beds.
        let positions: Vec<Needle> = ids
            .iter()
            .map(|id| replayed.loop_needle(*id).expect("loop vanished"))
            .collect();
        // Slack: slice-consecutive loops stay within their permitted distance, measured in
        // front-relative coordinates at the racking active after the step.
        let racking = replayed.racking();
        for (index, window) in positions.windows(2).enumerate() {
            let gap = (window[1].front_offset(racking) - window[0].front_offset(racking)).abs();
            assert!(
                gap <= slack[index],
                "slack violated between {} and {}: gap {gap} > {}",
                window[0],
                window[1],
                slack[index]
            );
        }
    }

    // Target fidelity at the end.
    for (id, target) in ids.iter().zip(targets.iter()) {
        assert_eq!(replayed.loop_needle(*id), Some(target.as_hook()));
    }
}

// DETERMINISM
// ================================================================================================

#[test]
fn identical_inputs_compile_to_identical_output() {
    let compile_once = || {
        let mut node = knit_row_node(12);
        node.steps[0].block.targets[11] = Needle::front(10);
        node.trace[11].shaping = ShapingKind::Decrease;
        let mut compiler = Compiler::new(CompilerOptions::default()).unwrap();
        compiler.compile(&[node]).unwrap().text
    };
    assert_eq!(compile_once(), compile_once());
}

// FRAGMENT ORDERING
// ================================================================================================

#[test]
fn fragment_ranges_partition_the_stream() {
    let mut compiler = Compiler::new(CompilerOptions::default()).unwrap();
    let output = compiler.compile(&[knit_row_node(6)]).unwrap();

    let mut cursor = 0;
    for (_, fragment) in output.session.fragments() {
        assert_eq!(fragment.header.first_ptr, cursor);
        assert!(fragment.header.last_ptr >= fragment.header.first_ptr);
        cursor = fragment.header.last_ptr;
    }
    assert_eq!(cursor, output.session.stream.len());
}

// PROGRESS
// ================================================================================================

#[test]
fn progress_is_monotonic_and_reaches_one() {
    let mut compiler = Compiler::new(CompilerOptions::default()).unwrap();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::<f32>::new()));
    let sink = seen.clone();
    compiler.on_progress(Box::new(move |fraction| sink.borrow_mut().push(fraction)));
    compiler.compile(&[knit_row_node(6)]).unwrap();

    let seen = seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(*seen.last().unwrap(), 1.0);
}

// PLANNER PROPERTIES
// ================================================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Flat rows shifted and decreased at random keep every invariant the replay checks.
    #[test]
    fn flat_shaping_preserves_invariants(
        width in 2usize..10,
        shift in -3i32..=3,
        decrease_last in proptest::bool::ANY,
    ) {
        let sources: Vec<Needle> = (0..width as i32).map(Needle::front).collect();
        let mut targets: Vec<Needle> =
            (0..width as i32).map(|offset| Needle::front(offset + shift)).collect();
        if decrease_last {
            targets[width - 1] = targets[width - 2];
        }
        let state = seeded(&sources);
        let options = CompilerOptions::default();

        let sequence = plan_transfers(&state, &sources, &targets, false, &options).unwrap();
        replay_checking_invariants(&state, &sequence, &sources, &targets);
    }

    /// Reduction never changes where loops end up.
    #[test]
    fn reduction_is_observationally_equivalent(
        width in 2usize..8,
        moved in 0usize..8,
    ) {
        let moved = moved % width;
        let sources: Vec<Needle> = (0..width as i32).map(Needle::front).collect();
        let mut targets = sources.clone();
        if moved > 0 {
            targets[moved] = Needle::front(moved as i32 - 1);
        }
        let state = seeded(&sources);

        let mut reduced_options = CompilerOptions::default();
        reduced_options.reduce_transfers = true;
        let mut plain_options = CompilerOptions::default();
        plain_options.reduce_transfers = false;

        for options in [reduced_options, plain_options] {
            let sequence = plan_transfers(&state, &sources, &targets, false, &options).unwrap();
            let mut end_state = state.clone();
            sequence.replay(&mut end_state).unwrap();
            for (source, target) in sources.iter().zip(targets.iter()) {
                let id = state.needle_loops(*source)[0].id;
                prop_assert_eq!(end_state.loop_needle(id), Some(*target));
            }
        }
    }
}
