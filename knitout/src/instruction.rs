use core::fmt;

use crate::{CarrierSet, Direction, Needle, Racking};

// PRESSER MODE
// ================================================================================================

/// Fabric presser behavior, set via the `x-presser-mode` extension.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PresserMode {
    #[default]
    Off,
    Auto,
    On,
}

impl fmt::Display for PresserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresserMode::Off => f.write_str("off"),
            PresserMode::Auto => f.write_str("auto"),
            PresserMode::On => f.write_str("on"),
        }
    }
}

// INSTRUCTION
// ================================================================================================

/// A single knitout instruction.
///
/// The set is fixed; extensions use the `x-` form. `Noop` emits no machine action and exists so
/// bare comment lines occupy a stream index like any other entry.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
    Noop,
    /// Brings carriers into the needle bed without the yarn-inserting hook.
    In(CarrierSet),
    /// Brings carriers in using the yarn-inserting hook.
    InHook(CarrierSet),
    /// Takes carriers out of the needle bed.
    Out(CarrierSet),
    /// Takes carriers out using the hook, cutting the yarn.
    OutHook(CarrierSet),
    /// Releases the yarn-inserting hook holding the named carriers' tails.
    ReleaseHook(CarrierSet),
    /// Sets the back-bed racking.
    Rack(Racking),
    Knit(Direction, Needle, CarrierSet),
    Tuck(Direction, Needle, CarrierSet),
    Miss(Direction, Needle, CarrierSet),
    /// Moves all loops from the first needle to the second.
    Xfer(Needle, Needle),
    /// Knits a new loop on the first needle while pushing its previous loops to the second.
    Split(Direction, Needle, Needle, CarrierSet),
    /// Drops all loops from the needle.
    Drop(Needle),
    /// A needle actuation without yarn (clears tuck accumulation).
    AMiss(Needle),
    Pause,
    Stitch,
    StitchNumber(u32),
    SpeedNumber(u32),
    Presser(PresserMode),
}

impl Instruction {
    /// Returns the needle this instruction acts on, if any.
    pub fn needle(&self) -> Option<Needle> {
        match self {
            Instruction::Knit(_, n, _)
            | Instruction::Tuck(_, n, _)
            | Instruction::Miss(_, n, _)
            | Instruction::Xfer(n, _)
            | Instruction::Split(_, n, _, _)
            | Instruction::Drop(n)
            | Instruction::AMiss(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the carriers this instruction references, if any.
    pub fn carriers(&self) -> Option<&CarrierSet> {
        match self {
            Instruction::In(cs)
            | Instruction::InHook(cs)
            | Instruction::Out(cs)
            | Instruction::OutHook(cs)
            | Instruction::ReleaseHook(cs)
            | Instruction::Knit(_, _, cs)
            | Instruction::Tuck(_, _, cs)
            | Instruction::Miss(_, _, cs)
            | Instruction::Split(_, _, _, cs) => Some(cs),
            _ => None,
        }
    }

    /// Returns true for instructions that form or release loops on needles.
    pub fn touches_loops(&self) -> bool {
        matches!(
            self,
            Instruction::Knit(..)
                | Instruction::Tuck(..)
                | Instruction::Xfer(..)
                | Instruction::Split(..)
                | Instruction::Drop(..)
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Noop => Ok(()),
            Instruction::In(cs) => write!(f, "in {cs}"),
            Instruction::InHook(cs) => write!(f, "inhook {cs}"),
            Instruction::Out(cs) => write!(f, "out {cs}"),
            Instruction::OutHook(cs) => write!(f, "outhook {cs}"),
            Instruction::ReleaseHook(cs) => write!(f, "releasehook {cs}"),
            Instruction::Rack(r) => write!(f, "rack {r}"),
            Instruction::Knit(d, n, cs) => write!(f, "knit {d} {n} {cs}"),
            Instruction::Tuck(d, n, cs) => write!(f, "tuck {d} {n} {cs}"),
            Instruction::Miss(d, n, cs) => write!(f, "miss {d} {n} {cs}"),
            Instruction::Xfer(from, to) => write!(f, "xfer {from} {to}"),
            Instruction::Split(d, from, to, cs) => write!(f, "split {d} {from} {to} {cs}"),
            Instruction::Drop(n) => write!(f, "drop {n}"),
            Instruction::AMiss(n) => write!(f, "amiss {n}"),
            Instruction::Pause => f.write_str("pause"),
            Instruction::Stitch => f.write_str("stitch"),
            Instruction::StitchNumber(v) => write!(f, "x-stitch-number {v}"),
            Instruction::SpeedNumber(v) => write!(f, "x-speed-number {v}"),
            Instruction::Presser(mode) => write!(f, "x-presser-mode {mode}"),
        }
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bed, Carrier};

    #[test]
    fn instruction_rendering() {
        let cs = CarrierSet::single("1");
        assert_eq!(format!("{}", Instruction::Knit(Direction::Rightward, Needle::front(0), cs.clone())), "knit + f0 1");
        assert_eq!(
            format!("{}", Instruction::Xfer(Needle::front(3), Needle::back(3))),
            "xfer f3 b3"
        );
        assert_eq!(
            format!(
                "{}",
                Instruction::Split(
                    Direction::Leftward,
                    Needle::new(Bed::BackHook, -2),
                    Needle::front(-2),
                    cs.clone(),
                )
            ),
            "split - b-2 f-2 1"
        );
        assert_eq!(format!("{}", Instruction::Rack(Racking::QUARTER)), "rack 0.25");
        assert_eq!(format!("{}", Instruction::StitchNumber(23)), "x-stitch-number 23");
        assert_eq!(format!("{}", Instruction::OutHook(CarrierSet::single("2"))), "outhook 2");
    }

    #[test]
    fn accessors() {
        let cs = CarrierSet::single("3");
        let knit = Instruction::Knit(Direction::Rightward, Needle::front(1), cs.clone());
        assert_eq!(knit.needle(), Some(Needle::front(1)));
        assert!(knit.carriers().unwrap().contains(&Carrier::new("3")));
        assert!(knit.touches_loops());
        assert!(!Instruction::Pause.touches_loops());
    }
}
