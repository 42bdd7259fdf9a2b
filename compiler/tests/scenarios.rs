//! End-to-end compilations of small, fully specified fabrics.

use knitc_compiler::{
    Compiler, CompilerOptions, Step, StitchBlock, StitchFlags, TracedStitch, YarnNode,
    knitout::{Direction, Needle},
};
use pretty_assertions::assert_eq;

// FIXTURES
// ================================================================================================

fn flat_block(stitches: Vec<usize>, needles: Vec<Needle>, row: u32) -> StitchBlock {
    let targets = needles.clone();
    StitchBlock {
        stitches,
        needles,
        targets,
        direction: Direction::Rightward,
        active_index: 0,
        circular: false,
        starts_yarn: false,
        ends_yarn: false,
        needs_cast_on: false,
        needs_cast_off: false,
        row,
    }
}

fn knit_row_node(width: usize, carrier: &str) -> YarnNode {
    let trace: Vec<TracedStitch> =
        (0..width).map(|index| TracedStitch::knit(index, carrier)).collect();
    let needles: Vec<Needle> = (0..width as i32).map(Needle::front).collect();
    let mut block = flat_block((0..width).collect(), needles, 0);
    block.starts_yarn = true;
    YarnNode {
        trace,
        steps: vec![Step { block }],
        ..YarnNode::default()
    }
}

fn compile(nodes: &[YarnNode]) -> knitc_compiler::CompileOutput {
    let mut compiler = Compiler::new(CompilerOptions::default()).unwrap();
    compiler.compile(nodes).unwrap()
}

/// The non-comment instruction lines of a rendered program.
fn instruction_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.starts_with(';') && !line.is_empty())
        .map(|line| line.split(" ;").next().unwrap().to_string())
        .collect()
}

fn position(lines: &[String], wanted: &str) -> usize {
    lines
        .iter()
        .position(|line| line == wanted)
        .unwrap_or_else(|| panic!("line {wanted:?} not found in {lines:#?}"))
}

// S1: FLAT KNIT ROW
// ================================================================================================

#[test]
fn flat_knit_row() {
    let output = compile(&[knit_row_node(10, "1")]);
    let lines = instruction_lines(&output.text);

    let inhook = position(&lines, "inhook 1");
    let release = position(&lines, "releasehook 1");
    assert!(inhook < release);
    // Seed tucks land on the odd needles between hook-in and release.
    for offset in [1, 3, 5, 7, 9] {
        let tuck = position(&lines, &format!("tuck + f{offset} 1"));
        assert!(inhook < tuck && tuck < release);
    }
    // The knits run left to right after the release.
    let mut previous = release;
    for offset in 0..10 {
        let knit = position(&lines, &format!("knit + f{offset} 1"));
        assert!(knit > previous, "knit f{offset} out of order");
        previous = knit;
    }

    // Every loop survives on its needle.
    for offset in 0..10 {
        assert_eq!(output.session.state.needle_loops(Needle::front(offset)).len(), 1);
    }
}

// S2: INTERLOCK CAST-ON, CIRCULAR
// ================================================================================================

#[test]
fn interlock_cast_on_circular() {
    let width = 8;
    let mut node = knit_row_node(width, "1");
    node.steps[0].block.needs_cast_on = true;
    node.steps[0].block.circular = true;
    let output = compile(&[node]);
    let lines = instruction_lines(&output.text);

    let knits: Vec<&String> =
        lines.iter().filter(|line| line.starts_with("knit")).collect();
    assert_eq!(knits.len(), width);
    // Even indices first, then odd ones, every pass in the same direction.
    let expected: Vec<String> = [0, 2, 4, 6, 1, 3, 5, 7]
        .iter()
        .map(|offset| format!("knit + f{offset} 1"))
        .collect();
    let actual: Vec<String> = knits.iter().map(|s| (*s).clone()).collect();
    assert_eq!(actual, expected);
}

// S3: DECREASE AT THE RIGHT END
// ================================================================================================

#[test]
fn decrease_at_right_end() {
    let mut node = knit_row_node(10, "1");
    {
        let block = &mut node.steps[0].block;
        block.targets = (0..9).map(Needle::front).collect();
        block.targets.push(Needle::front(8));
        node.trace[9].shaping = knitc_compiler::ShapingKind::Decrease;
    }
    let output = compile(&[node]);

    let state = &output.session.state;
    assert_eq!(state.needle_loops(Needle::front(8)).len(), 2);
    assert!(state.is_empty(Needle::front(9)));
    assert!(!state.has_pending_sliders());
    assert_eq!(state.loop_count(), 10);
}

// S4: FLAT TO CIRCULAR TRANSITION
// ================================================================================================

#[test]
fn flat_to_circular_transition() {
    let mut stitch = TracedStitch::knit(0, "1");
    stitch.wale_next = Some(1);
    let mut above = TracedStitch::knit(1, "1");
    above.flags = StitchFlags { two_sided: true, ..StitchFlags::default() };

    let mut block = flat_block(vec![0], vec![Needle::front(0)], 0);
    block.starts_yarn = true;
    let node = YarnNode {
        trace: vec![stitch, above],
        steps: vec![Step { block }],
        ..YarnNode::default()
    };
    let output = compile(&[node]);
    let lines = instruction_lines(&output.text);

    // The front-back pass runs at the quarter racking and knits both beds.
    let quarter = position(&lines, "rack 0.25");
    let front = position(&lines, "knit + f0 1");
    let back = position(&lines, "knit + b0 1");
    let restore = position(&lines, "rack 0");
    assert!(quarter < front && front < back && back < restore);
}

// S5: ALIGNMENT ONLY
// ================================================================================================

#[test]
fn alignment_between_steps() {
    let trace: Vec<TracedStitch> =
        (0..8).map(|index| TracedStitch::knit(index, "1")).collect();
    let mut first = flat_block(
        (0..4).collect(),
        (0..4).map(Needle::front).collect(),
        0,
    );
    first.starts_yarn = true;
    let second = flat_block(
        (4..8).collect(),
        (2..6).map(Needle::front).collect(),
        1,
    );
    let node = YarnNode {
        trace,
        steps: vec![Step { block: first }, Step { block: second }],
        ..YarnNode::default()
    };
    let output = compile(&[node]);
    let lines = instruction_lines(&output.text);

    // Stash to the opposite sliders, one +2 shift group at racking 2, unstash.
    let stash = position(&lines, "xfer f0 bs0");
    let rack = position(&lines, "rack 2");
    let unstash = position(&lines, "xfer bs0 f2");
    assert!(stash < rack && rack < unstash);

    // Zero leftover shifts: the second row's loops sit on f2..f5.
    let state = &output.session.state;
    for offset in 2..6 {
        assert_eq!(state.needle_loops(Needle::front(offset)).len(), 1, "f{offset}");
    }
    assert!(state.is_empty(Needle::front(0)));
    assert!(state.is_empty(Needle::front(1)));
    assert!(!state.has_pending_sliders());
}

// S6: YARN SWITCH
// ================================================================================================

#[test]
fn yarn_switch_between_steps() {
    let mut trace: Vec<TracedStitch> =
        (0..4).map(|index| TracedStitch::knit(index, "1")).collect();
    trace.extend((4..8).map(|index| TracedStitch::knit(index, "2")));

    let mut first = flat_block((0..4).collect(), (0..4).map(Needle::front).collect(), 0);
    first.starts_yarn = true;
    first.ends_yarn = true;
    let mut second = flat_block((4..8).collect(), (0..4).map(Needle::front).collect(), 1);
    second.starts_yarn = true;
    let node = YarnNode {
        trace,
        steps: vec![Step { block: first }, Step { block: second }],
        ..YarnNode::default()
    };
    let output = compile(&[node]);
    let lines = instruction_lines(&output.text);

    let out_one = position(&lines, "outhook 1");
    let in_two = position(&lines, "inhook 2");
    let first_knit_two = position(&lines, "knit + f0 2");
    assert!(out_one < in_two, "old yarn must leave before the new one comes in");
    assert!(in_two < first_knit_two);
    // The new yarn seeds tucks before knitting.
    let tuck_two = position(&lines, "tuck + f1 2");
    assert!(in_two < tuck_two && tuck_two < first_knit_two);
}
