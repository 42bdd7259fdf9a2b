use knitc_knitout::{Carrier, CarrierSet, Direction, Instruction, Needle, Racking, Stream};
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

fn cs(name: &str) -> CarrierSet {
    CarrierSet::single(name)
}

fn knit(offset: i32) -> Instruction {
    Instruction::Knit(Direction::Rightward, Needle::front(offset), cs("1"))
}

fn state_with_row(width: i32) -> MachineState {
    let mut state = MachineState::new();
    state.consume(&Instruction::InHook(cs("1"))).unwrap();
    for offset in 0..width {
        state.consume(&knit(offset)).unwrap();
    }
    state
}

#[test]
fn knit_replaces_loops_and_tracks_parents() {
    let mut state = state_with_row(1);
    let first = state.needle_loops(Needle::front(0))[0].clone();
    assert!(first.parents.is_empty());

    state.consume(&knit(0)).unwrap();
    let second = &state.needle_loops(Needle::front(0))[0];
    assert_eq!(second.parents.as_slice(), &[first.id]);
    assert_eq!(second.previous, Some(first.id));
    assert_eq!(state.loop_count(), 1);
}

#[test]
fn tuck_stacks_without_consuming() {
    let mut state = state_with_row(1);
    state
        .consume(&Instruction::Tuck(Direction::Rightward, Needle::front(0), cs("1")))
        .unwrap();
    assert_eq!(state.needle_loops(Needle::front(0)).len(), 2);
}

#[test]
fn xfer_moves_whole_stack() {
    let mut state = state_with_row(1);
    state
        .consume(&Instruction::Tuck(Direction::Rightward, Needle::front(0), cs("1")))
        .unwrap();
    state.consume(&Instruction::Xfer(Needle::front(0), Needle::back(0))).unwrap();
    assert!(state.is_empty(Needle::front(0)));
    assert_eq!(state.needle_loops(Needle::back(0)).len(), 2);
}

#[rstest]
#[case::aligned_at_zero(Racking::ZERO, Needle::front(3), Needle::back(3), true)]
#[case::aligned_at_two(Racking::from_whole(2), Needle::back(1), Needle::front(3), true)]
#[case::misaligned(Racking::from_whole(1), Needle::front(3), Needle::back(3), false)]
#[case::same_side(Racking::ZERO, Needle::front(3), Needle::front_slider(3), false)]
#[case::fractional(Racking::QUARTER, Needle::front(3), Needle::back(3), false)]
fn xfer_legality(
    #[case] racking: Racking,
    #[case] from: Needle,
    #[case] to: Needle,
    #[case] legal: bool,
) {
    let mut state = MachineState::new();
    state.consume(&Instruction::InHook(cs("1"))).unwrap();
    state
        .consume(&Instruction::Knit(Direction::Rightward, from, cs("1")))
        .unwrap();
    state.consume(&Instruction::Rack(racking)).unwrap();
    let result = state.consume(&Instruction::Xfer(from, to));
    assert_eq!(result.is_ok(), legal, "{result:?}");
}

#[test]
fn split_forms_new_loop_and_pushes_old() {
    let mut state = state_with_row(1);
    let old = state.needle_loops(Needle::front(0))[0].id;
    state
        .consume(&Instruction::Split(
            Direction::Rightward,
            Needle::front(0),
            Needle::back(0),
            cs("1"),
        ))
        .unwrap();
    assert_eq!(state.needle_loops(Needle::back(0))[0].id, old);
    let new = &state.needle_loops(Needle::front(0))[0];
    assert_eq!(new.parents.as_slice(), &[old]);
}

#[test]
fn pending_sliders_detection() {
    let mut state = state_with_row(1);
    assert!(!state.has_pending_sliders());
    state
        .consume(&Instruction::Xfer(Needle::front(0), Needle::back_slider(0)))
        .unwrap();
    assert!(state.has_pending_sliders());
    state
        .consume(&Instruction::Xfer(Needle::back_slider(0), Needle::front(0)))
        .unwrap();
    assert!(!state.has_pending_sliders());
}

#[test]
fn carrier_lifecycle_errors() {
    let mut state = MachineState::new();
    state.consume(&Instruction::InHook(cs("1"))).unwrap();
    assert_eq!(
        state.consume(&Instruction::In(cs("1"))),
        Err(MachineError::CarrierAlreadyIn { carrier: Carrier::new("1") })
    );
    state.consume(&Instruction::ReleaseHook(cs("1"))).unwrap();
    assert_eq!(
        state.consume(&Instruction::ReleaseHook(cs("1"))),
        Err(MachineError::CarrierNotHooked { carrier: Carrier::new("1") })
    );
    state.consume(&Instruction::OutHook(cs("1"))).unwrap();
    assert_eq!(
        state.consume(&knit(0)),
        Err(MachineError::CarrierNotActive { carrier: Carrier::new("1") })
    );
}

#[test]
fn carrier_conflicts_follow_anchor_geometry() {
    let mut state = state_with_row(4);
    // Carrier 1 parked just right of f3.
    assert_eq!(state.carrier_conflicts(Needle::front(3)), vec![Carrier::new("1")]);
    assert_eq!(state.carrier_conflicts(Needle::front(4)), vec![Carrier::new("1")]);
    assert!(state.carrier_conflicts(Needle::front(1)).is_empty());
    // The back needle aligned with f3 at racking 0 conflicts as well.
    assert_eq!(state.carrier_conflicts(Needle::back(3)), vec![Carrier::new("1")]);
}

#[test]
fn loop_lookup_queries() {
    let mut state = state_with_row(3);
    let id = state.needle_loops(Needle::front(1))[0].id;
    assert_eq!(state.loop_needle(id), Some(Needle::front(1)));
    assert_eq!(state.find_loop_needle(|lp| lp.id == id), Some(Needle::front(1)));
    assert_eq!(state.filter_loop_needles(|_| true).len(), 3);
    state.consume(&Instruction::Drop(Needle::front(1))).unwrap();
    assert_eq!(state.loop_needle(id), None);
}

#[test]
fn loop_tags_backlink_to_stitches() {
    let mut state = MachineState::new();
    state.consume(&Instruction::InHook(cs("1"))).unwrap();
    state.set_loop_tag(Some(42));
    state.consume(&knit(0)).unwrap();
    assert_eq!(state.needle_loops(Needle::front(0))[0].stitch, Some(42));
}

#[test]
fn stream_flush_drives_live_state() {
    let mut stream = Stream::new();
    let mut state = MachineState::new();
    stream.append(Instruction::InHook(cs("1")));
    stream.append(knit(0));
    stream.flush_into(&mut state).unwrap();
    assert_eq!(state.loop_count(), 1);
    // A second flush must not re-apply anything.
    stream.flush_into(&mut state).unwrap();
    assert_eq!(state.loop_count(), 1);
}

#[test]
fn execute_records_for_replay() {
    let mut state = MachineState::new();
    state.execute(&Instruction::InHook(cs("1"))).unwrap();
    state.execute(&knit(0)).unwrap();
    assert_eq!(state.recorded().len(), 2);
    let recorded = state.take_recorded();
    assert_eq!(recorded[1], knit(0));
    assert!(state.recorded().is_empty());
}
