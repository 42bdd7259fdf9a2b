use knitc_knitout::{Carrier, Needle, Side};

use crate::LoopId;

// CARRIER STATE
// ================================================================================================

/// Live state of one yarn carrier.
///
/// A carrier's physical position is modelled as "just to `side` of `anchor`"; that position is
/// what determines conflicts with needles a transfer pass must touch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarrierState {
    pub name: Carrier,
    /// True from `in`/`inhook` until `out`/`outhook`.
    pub active: bool,
    /// True while the carrier has formed at least one loop since coming in.
    pub in_bed: bool,
    /// True once the yarn-inserting hook no longer holds this carrier's tail.
    pub released: bool,
    /// The needle the carrier last worked; `None` until its first use after coming in.
    pub anchor: Option<Needle>,
    /// Which side of the anchor the carrier parked on.
    pub side: Side,
    /// The most recent loop formed from this carrier's yarn.
    pub last_loop: Option<LoopId>,
}

impl CarrierState {
    /// Returns a fresh carrier state for a carrier just brought in.
    ///
    /// `released` starts true for plain `in` (no hook engaged) and false for `inhook`.
    pub fn new(name: Carrier, released: bool) -> Self {
        Self {
            name,
            active: true,
            in_bed: false,
            released,
            anchor: None,
            side: Side::Right,
            last_loop: None,
        }
    }

    /// Re-anchors the carrier just to `side` of `needle`.
    pub fn park(&mut self, needle: Needle, side: Side) {
        self.anchor = Some(needle);
        self.side = side;
        self.in_bed = true;
    }
}
