use core::fmt;

use crate::Racking;

// BED
// ================================================================================================

/// One of the four needle beds of a V-bed machine.
///
/// Each physical bed carries a row of hooks and a parallel row of sliders; sliders hold loops
/// only as temporary staging during transfer sequences.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Bed {
    FrontHook,
    BackHook,
    FrontSlider,
    BackSlider,
}

impl Bed {
    /// All four beds, front hooks first.
    pub const ALL: [Bed; 4] = [Bed::FrontHook, Bed::BackHook, Bed::FrontSlider, Bed::BackSlider];

    /// Returns true for the front side of the machine.
    pub const fn is_front(&self) -> bool {
        matches!(self, Bed::FrontHook | Bed::FrontSlider)
    }

    /// Returns true for slider beds.
    pub const fn is_slider(&self) -> bool {
        matches!(self, Bed::FrontSlider | Bed::BackSlider)
    }

    /// Returns the hook bed on the same side.
    pub const fn hook(&self) -> Bed {
        if self.is_front() { Bed::FrontHook } else { Bed::BackHook }
    }

    /// Returns the slider bed on the same side.
    pub const fn slider(&self) -> Bed {
        if self.is_front() { Bed::FrontSlider } else { Bed::BackSlider }
    }

    /// Returns the hook bed on the opposite side.
    pub const fn opposite_hook(&self) -> Bed {
        if self.is_front() { Bed::BackHook } else { Bed::FrontHook }
    }

    /// Returns the slider bed on the opposite side.
    pub const fn opposite_slider(&self) -> Bed {
        if self.is_front() { Bed::BackSlider } else { Bed::FrontSlider }
    }

    /// Returns the knitout bed prefix (`f`, `b`, `fs`, `bs`).
    pub const fn prefix(&self) -> &'static str {
        match self {
            Bed::FrontHook => "f",
            Bed::BackHook => "b",
            Bed::FrontSlider => "fs",
            Bed::BackSlider => "bs",
        }
    }
}

impl fmt::Display for Bed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// NEEDLE
// ================================================================================================

/// A needle location: a bed and an integer offset along it.
///
/// Offsets may be negative; the machine's physical needle range is a concern of the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Needle {
    pub bed: Bed,
    pub offset: i32,
}

impl Needle {
    /// Returns a new needle at the specified bed and offset.
    pub const fn new(bed: Bed, offset: i32) -> Self {
        Self { bed, offset }
    }

    /// Front-hook needle at `offset`.
    pub const fn front(offset: i32) -> Self {
        Self::new(Bed::FrontHook, offset)
    }

    /// Back-hook needle at `offset`.
    pub const fn back(offset: i32) -> Self {
        Self::new(Bed::BackHook, offset)
    }

    /// Front-slider needle at `offset`.
    pub const fn front_slider(offset: i32) -> Self {
        Self::new(Bed::FrontSlider, offset)
    }

    /// Back-slider needle at `offset`.
    pub const fn back_slider(offset: i32) -> Self {
        Self::new(Bed::BackSlider, offset)
    }

    /// Returns the front-relative offset of this needle under the specified racking.
    ///
    /// Front-bed needles are their own front offset; back-bed needles align with the front
    /// needle at `offset + racking`. Only meaningful for integral rackings.
    pub fn front_offset(&self, racking: Racking) -> i32 {
        if self.bed.is_front() {
            self.offset
        } else {
            self.offset + racking.whole()
        }
    }

    /// Returns the needle on the same side with the same offset, but on the hook bed.
    pub const fn as_hook(&self) -> Self {
        Self::new(self.bed.hook(), self.offset)
    }

    /// Returns the needle on the same side with the same offset, but on the slider bed.
    pub const fn as_slider(&self) -> Self {
        Self::new(self.bed.slider(), self.offset)
    }

    /// Returns the needle with the same offset on the opposite hook bed.
    pub const fn opposite_hook(&self) -> Self {
        Self::new(self.bed.opposite_hook(), self.offset)
    }

    /// Returns the needle with the same offset on the opposite slider bed.
    pub const fn opposite_slider(&self) -> Self {
        Self::new(self.bed.opposite_slider(), self.offset)
    }

    /// Returns this needle shifted by `delta` along its bed.
    pub const fn shifted(&self, delta: i32) -> Self {
        Self::new(self.bed, self.offset + delta)
    }
}

impl fmt::Display for Needle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.bed.prefix(), self.offset)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needle_rendering() {
        assert_eq!(format!("{}", Needle::front(12)), "f12");
        assert_eq!(format!("{}", Needle::back(-3)), "b-3");
        assert_eq!(format!("{}", Needle::front_slider(5)), "fs5");
        assert_eq!(format!("{}", Needle::back_slider(7)), "bs7");
    }

    #[test]
    fn front_offset_under_racking() {
        let rack = Racking::from_whole(2);
        assert_eq!(Needle::front(4).front_offset(rack), 4);
        assert_eq!(Needle::back(4).front_offset(rack), 6);
        assert_eq!(Needle::back_slider(-1).front_offset(rack), 1);
    }

    #[test]
    fn bed_relatives() {
        assert_eq!(Bed::FrontHook.opposite_hook(), Bed::BackHook);
        assert_eq!(Bed::BackSlider.hook(), Bed::BackHook);
        assert_eq!(Bed::FrontHook.opposite_slider(), Bed::BackSlider);
        assert!(!Bed::BackHook.is_front());
        assert!(Bed::FrontSlider.is_slider());
    }
}
