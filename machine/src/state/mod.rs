use alloc::{collections::BTreeMap, vec::Vec};

use knitc_knitout::{
    Bed, Carrier, CarrierSet, Direction, Instruction, InstructionSink, Needle, PresserMode,
    Racking, Side,
};

use crate::{CARRIER_CONFLICT_THRESHOLD, CarrierState, Loop, LoopId, MachineError, NeedleBed};

#[cfg(test)]
mod tests;

// MACHINE STATE
// ================================================================================================

/// Deterministic mirror of the machine: four needle beds, racking, carriers, and the scalar
/// carriage settings.
///
/// A live state is driven by flushing the instruction stream into it; every appended
/// instruction is consumed exactly once, in order. [MachineState::execute] additionally records
/// the instruction, which the transfer planner uses to replay candidate plans offline.
#[derive(Clone, Debug, Default)]
pub struct MachineState {
    front_hooks: NeedleBed,
    back_hooks: NeedleBed,
    front_sliders: NeedleBed,
    back_sliders: NeedleBed,
    racking: Racking,
    carriers: BTreeMap<Carrier, CarrierState>,
    stitch_number: Option<u32>,
    speed: Option<u32>,
    presser: PresserMode,
    last_cs: CarrierSet,
    next_loop: u32,
    loop_tag: Option<i64>,
    recorded: Vec<Instruction>,
}

impl MachineState {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns an empty machine at racking 0 with no carriers in.
    pub fn new() -> Self {
        Self::default()
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the bed holding loops for the specified bed side.
    pub fn bed(&self, bed: Bed) -> &NeedleBed {
        match bed {
            Bed::FrontHook => &self.front_hooks,
            Bed::BackHook => &self.back_hooks,
            Bed::FrontSlider => &self.front_sliders,
            Bed::BackSlider => &self.back_sliders,
        }
    }

    /// Returns the current racking.
    pub fn racking(&self) -> Racking {
        self.racking
    }

    /// Returns the current stitch number, if one has been set.
    pub fn stitch_number(&self) -> Option<u32> {
        self.stitch_number
    }

    /// Returns the current carriage speed, if one has been set.
    pub fn speed(&self) -> Option<u32> {
        self.speed
    }

    /// Returns the current presser mode.
    pub fn presser(&self) -> PresserMode {
        self.presser
    }

    /// Returns the carriers used by the most recent yarn-carrying instruction.
    pub fn last_carriers(&self) -> &CarrierSet {
        &self.last_cs
    }

    /// Returns the state of the specified carrier, if it has ever come in.
    pub fn carrier(&self, carrier: &Carrier) -> Option<&CarrierState> {
        self.carriers.get(carrier)
    }

    /// Iterates all carrier states in name order.
    pub fn carriers(&self) -> impl Iterator<Item = &CarrierState> {
        self.carriers.values()
    }

    /// Returns the loop stack on the specified needle, oldest first.
    pub fn needle_loops(&self, needle: Needle) -> &[Loop] {
        self.bed(needle.bed).loops_at(needle.offset)
    }

    /// Returns true when the specified needle holds no loops.
    pub fn is_empty(&self, needle: Needle) -> bool {
        self.bed(needle.bed).is_empty_at(needle.offset)
    }

    /// Returns true while either slider bed holds loops.
    ///
    /// Checked at every pass boundary: sliders are staging only, never storage.
    pub fn has_pending_sliders(&self) -> bool {
        !self.front_sliders.is_empty() || !self.back_sliders.is_empty()
    }

    /// Returns the total number of loops across all four beds.
    pub fn loop_count(&self) -> usize {
        self.front_hooks.loop_count()
            + self.back_hooks.loop_count()
            + self.front_sliders.loop_count()
            + self.back_sliders.loop_count()
    }

    /// Returns the needle currently holding the specified loop.
    pub fn loop_needle(&self, id: LoopId) -> Option<Needle> {
        for bed in Bed::ALL {
            if let Some(offset) = self.bed(bed).offset_of(id) {
                return Some(Needle::new(bed, offset));
            }
        }
        None
    }

    /// Returns the first needle (bed order, then ascending offset) holding a loop matching the
    /// predicate.
    pub fn find_loop_needle(&self, pred: impl Fn(&Loop) -> bool) -> Option<Needle> {
        for bed in Bed::ALL {
            for offset in self.bed(bed).occupied_offsets() {
                if self.bed(bed).loops_at(offset).iter().any(&pred) {
                    return Some(Needle::new(bed, offset));
                }
            }
        }
        None
    }

    /// Returns every needle holding at least one loop matching the predicate.
    pub fn filter_loop_needles(&self, pred: impl Fn(&Loop) -> bool) -> Vec<Needle> {
        let mut needles = Vec::new();
        for bed in Bed::ALL {
            for offset in self.bed(bed).occupied_offsets() {
                if self.bed(bed).loops_at(offset).iter().any(&pred) {
                    needles.push(Needle::new(bed, offset));
                }
            }
        }
        needles
    }

    /// Returns the carriers whose parking position conflicts with working the specified needle.
    ///
    /// A carrier parks half a pitch to `side` of its anchor; it conflicts with every needle
    /// whose front offset lies strictly within [CARRIER_CONFLICT_THRESHOLD] pitches of that
    /// position at the current racking.
    pub fn carrier_conflicts(&self, needle: Needle) -> Vec<Carrier> {
        self.carrier_conflicts_with_threshold(needle, CARRIER_CONFLICT_THRESHOLD)
    }

    /// [MachineState::carrier_conflicts] with an explicit threshold, in needle pitches.
    pub fn carrier_conflicts_with_threshold(&self, needle: Needle, threshold: i32) -> Vec<Carrier> {
        let needle_pos = 2 * needle.front_offset(self.racking);
        let mut conflicting = Vec::new();
        for state in self.carriers.values() {
            if !state.active {
                continue;
            }
            let Some(anchor) = state.anchor else { continue };
            let step = match state.side {
                Side::Left => -1,
                Side::Right => 1,
            };
            let carrier_pos = 2 * anchor.front_offset(self.racking) + step;
            if (carrier_pos - needle_pos).abs() < 2 * threshold {
                conflicting.push(state.name.clone());
            }
        }
        conflicting
    }

    /// Returns the instructions recorded by [MachineState::execute] since the last
    /// [MachineState::take_recorded].
    pub fn recorded(&self) -> &[Instruction] {
        &self.recorded
    }

    /// Drains the recorded instruction log.
    pub fn take_recorded(&mut self) -> Vec<Instruction> {
        core::mem::take(&mut self.recorded)
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Sets the traced-stitch tag attached to loops formed by subsequent instructions.
    pub fn set_loop_tag(&mut self, tag: Option<i64>) {
        self.loop_tag = tag;
    }

    /// Applies a single instruction to the state.
    pub fn consume(&mut self, instruction: &Instruction) -> Result<(), MachineError> {
        tracing::trace!(%instruction, "consume");
        match instruction {
            Instruction::Noop | Instruction::Pause | Instruction::Stitch => Ok(()),
            Instruction::StitchNumber(v) => {
                self.stitch_number = Some(*v);
                Ok(())
            },
            Instruction::SpeedNumber(v) => {
                self.speed = Some(*v);
                Ok(())
            },
            Instruction::Presser(mode) => {
                self.presser = *mode;
                Ok(())
            },
            Instruction::Rack(racking) => {
                self.racking = *racking;
                Ok(())
            },
            Instruction::In(cs) => self.bring_in(cs, true),
            Instruction::InHook(cs) => self.bring_in(cs, false),
            Instruction::Out(cs) | Instruction::OutHook(cs) => self.take_out(cs),
            Instruction::ReleaseHook(cs) => self.release(cs),
            Instruction::Knit(d, n, cs) => self.knit(*d, *n, cs),
            Instruction::Tuck(d, n, cs) => self.tuck(*d, *n, cs),
            Instruction::Miss(d, n, cs) => self.miss(*d, *n, cs),
            Instruction::Split(d, n, n2, cs) => self.split(*d, *n, *n2, cs),
            Instruction::Xfer(from, to) => self.xfer(*from, *to),
            Instruction::Drop(n) => {
                self.bed_mut(n.bed).take(n.offset);
                Ok(())
            },
            Instruction::AMiss(_) => Ok(()),
        }
    }

    /// Applies the instruction and records it in the offline log.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<(), MachineError> {
        self.consume(instruction)?;
        self.recorded.push(instruction.clone());
        Ok(())
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn bed_mut(&mut self, bed: Bed) -> &mut NeedleBed {
        match bed {
            Bed::FrontHook => &mut self.front_hooks,
            Bed::BackHook => &mut self.back_hooks,
            Bed::FrontSlider => &mut self.front_sliders,
            Bed::BackSlider => &mut self.back_sliders,
        }
    }

    fn allocate_loop(&mut self) -> Loop {
        let id = LoopId::from(self.next_loop);
        self.next_loop += 1;
        let mut lp = Loop::new(id);
        lp.stitch = self.loop_tag;
        lp
    }

    fn bring_in(&mut self, cs: &CarrierSet, released: bool) -> Result<(), MachineError> {
        for carrier in cs {
            if self.carriers.get(carrier).is_some_and(|state| state.active) {
                return Err(MachineError::CarrierAlreadyIn { carrier: carrier.clone() });
            }
            self.carriers
                .insert(carrier.clone(), CarrierState::new(carrier.clone(), released));
        }
        Ok(())
    }

    fn take_out(&mut self, cs: &CarrierSet) -> Result<(), MachineError> {
        for carrier in cs {
            let state = self.active_carrier(carrier)?;
            state.active = false;
            state.in_bed = false;
            state.released = true;
            state.anchor = None;
        }
        Ok(())
    }

    fn release(&mut self, cs: &CarrierSet) -> Result<(), MachineError> {
        for carrier in cs {
            let state = self.active_carrier(carrier)?;
            if state.released {
                return Err(MachineError::CarrierNotHooked { carrier: carrier.clone() });
            }
            state.released = true;
        }
        Ok(())
    }

    fn active_carrier(&mut self, carrier: &Carrier) -> Result<&mut CarrierState, MachineError> {
        match self.carriers.get_mut(carrier) {
            Some(state) if state.active => Ok(state),
            _ => Err(MachineError::CarrierNotActive { carrier: carrier.clone() }),
        }
    }

    fn park_carriers(
        &mut self,
        cs: &CarrierSet,
        needle: Needle,
        direction: Direction,
        formed: Option<LoopId>,
    ) -> Result<(), MachineError> {
        for carrier in cs {
            let state = self.active_carrier(carrier)?;
            state.park(needle, direction.parking_side());
            if let Some(id) = formed {
                state.last_loop = Some(id);
            }
        }
        if !cs.is_empty() {
            self.last_cs = cs.clone();
        }
        Ok(())
    }

    fn knit(&mut self, d: Direction, n: Needle, cs: &CarrierSet) -> Result<(), MachineError> {
        let parents = self.bed_mut(n.bed).take(n.offset);
        // A knit with no carriers pulls the old loops off without forming a new one.
        if cs.is_empty() {
            return Ok(());
        }
        let mut lp = self.allocate_loop();
        lp.parents = parents.iter().map(|parent| parent.id).collect();
        lp.previous = cs
            .iter()
            .next()
            .and_then(|carrier| self.carriers.get(carrier))
            .and_then(|state| state.last_loop);
        let id = lp.id;
        self.bed_mut(n.bed).place(n.offset, lp);
        self.park_carriers(cs, n, d, Some(id))
    }

    fn tuck(&mut self, d: Direction, n: Needle, cs: &CarrierSet) -> Result<(), MachineError> {
        let mut lp = self.allocate_loop();
        lp.previous = cs
            .iter()
            .next()
            .and_then(|carrier| self.carriers.get(carrier))
            .and_then(|state| state.last_loop);
        let id = lp.id;
        self.bed_mut(n.bed).place(n.offset, lp);
        self.park_carriers(cs, n, d, Some(id))
    }

    fn miss(&mut self, d: Direction, n: Needle, cs: &CarrierSet) -> Result<(), MachineError> {
        self.park_carriers(cs, n, d, None)
    }

    fn split(
        &mut self,
        d: Direction,
        n: Needle,
        n2: Needle,
        cs: &CarrierSet,
    ) -> Result<(), MachineError> {
        self.validate_transfer(n, n2)?;
        let moved = self.bed_mut(n.bed).take(n.offset);
        let mut lp = self.allocate_loop();
        lp.parents = moved.iter().map(|parent| parent.id).collect();
        lp.previous = cs
            .iter()
            .next()
            .and_then(|carrier| self.carriers.get(carrier))
            .and_then(|state| state.last_loop);
        let id = lp.id;
        self.bed_mut(n.bed).place(n.offset, lp);
        self.bed_mut(n2.bed).place_all(n2.offset, moved);
        self.park_carriers(cs, n, d, Some(id))
    }

    fn xfer(&mut self, from: Needle, to: Needle) -> Result<(), MachineError> {
        self.validate_transfer(from, to)?;
        let moved = self.bed_mut(from.bed).take(from.offset);
        self.bed_mut(to.bed).place_all(to.offset, moved);
        Ok(())
    }

    fn validate_transfer(&self, from: Needle, to: Needle) -> Result<(), MachineError> {
        if from.bed.is_front() == to.bed.is_front() {
            return Err(MachineError::TransferSameSide { from, to });
        }
        if !self.racking.is_integral() {
            return Err(MachineError::TransferFractionalRacking { from, racking: self.racking });
        }
        let from_offset = from.front_offset(self.racking);
        let to_offset = to.front_offset(self.racking);
        if from_offset != to_offset {
            return Err(MachineError::TransferMisaligned {
                from,
                to,
                racking: self.racking,
                from_offset,
                to_offset,
            });
        }
        Ok(())
    }
}

impl InstructionSink for MachineState {
    type Error = MachineError;

    fn consume(&mut self, instruction: &Instruction) -> Result<(), MachineError> {
        MachineState::consume(self, instruction)
    }
}
