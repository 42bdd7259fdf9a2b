use core::{fmt, ops};

// RACKING
// ================================================================================================

/// Horizontal offset of the back bed relative to the front bed, in quarter-pitch units.
///
/// Transfers require an integral racking; a ±0.25 racking is used by front-back jacquard passes
/// that knit both beds in one carriage pass. Storing quarters keeps the type exact (no floats in
/// state comparisons).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Racking(i32);

impl Racking {
    pub const ZERO: Racking = Racking(0);
    /// The +0.25 racking used by front-back passes.
    pub const QUARTER: Racking = Racking(1);

    /// Returns a racking of `whole` full needle pitches.
    pub const fn from_whole(whole: i32) -> Self {
        Racking(whole * 4)
    }

    /// Returns a racking of `quarters` quarter pitches.
    pub const fn from_quarters(quarters: i32) -> Self {
        Racking(quarters)
    }

    /// Returns true when this racking is a whole number of pitches.
    pub const fn is_integral(&self) -> bool {
        self.0 % 4 == 0
    }

    /// Returns the whole-pitch component, truncated toward zero.
    pub const fn whole(&self) -> i32 {
        self.0 / 4
    }

    /// Returns the raw quarter-pitch count.
    pub const fn quarters(&self) -> i32 {
        self.0
    }
}

impl From<i32> for Racking {
    fn from(whole: i32) -> Self {
        Racking::from_whole(whole)
    }
}

impl ops::Add for Racking {
    type Output = Racking;

    fn add(self, rhs: Racking) -> Racking {
        Racking(self.0 + rhs.0)
    }
}

impl ops::Sub for Racking {
    type Output = Racking;

    fn sub(self, rhs: Racking) -> Racking {
        Racking(self.0 - rhs.0)
    }
}

impl ops::Neg for Racking {
    type Output = Racking;

    fn neg(self) -> Racking {
        Racking(-self.0)
    }
}

impl fmt::Display for Racking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            return write!(f, "{}", self.whole());
        }
        // Fractional rackings print as decimals so the knitout line parses as a number.
        let sign = if self.0 < 0 { "-" } else { "" };
        let quarters = self.0.abs();
        let frac = match quarters % 4 {
            1 => "25",
            2 => "5",
            _ => "75",
        };
        write!(f, "{sign}{}.{frac}", quarters / 4)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_whole_and_fractional() {
        assert_eq!(format!("{}", Racking::from_whole(2)), "2");
        assert_eq!(format!("{}", Racking::from_whole(-1)), "-1");
        assert_eq!(format!("{}", Racking::QUARTER), "0.25");
        assert_eq!(format!("{}", Racking::from_quarters(-3)), "-0.75");
        assert_eq!(format!("{}", Racking::from_quarters(-5)), "-1.25");
    }

    #[test]
    fn integral_checks() {
        assert!(Racking::ZERO.is_integral());
        assert!(Racking::from_whole(-7).is_integral());
        assert!(!Racking::QUARTER.is_integral());
        assert_eq!(Racking::from_whole(3).whole(), 3);
    }
}
