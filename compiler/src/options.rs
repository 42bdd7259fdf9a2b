use crate::OptionsError;

// OPTION ENUMS
// ================================================================================================

/// Needle gauge the program compiles for.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Gauge {
    #[default]
    Full,
    /// Every other needle; interleaved empty positions make transfers safe by construction.
    Half,
}

/// Which yarn-boundary neighbors receive anchoring tucks in intarsia regions.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum IntarsiaTucks {
    #[default]
    Both,
    Cw,
    Ccw,
    None,
}

/// Whether intarsia tucks land on the entry before or after the current one.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum IntarsiaSide {
    #[default]
    Before,
    After,
}

/// Transfer-planning algorithm for shaping passes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ShapingAlgorithm {
    /// Collapse-shift-expand via the one-dimensional oracle.
    #[default]
    Cse,
    /// Rotation + shift planning; required for two-sided (tubular) configurations.
    Rs,
}

/// Cast-on pattern.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CastOnType {
    #[default]
    Interlock,
    Kickback,
}

// COMPILER OPTIONS
// ================================================================================================

/// Validated configuration for a compilation session.
#[derive(Clone, Debug, PartialEq)]
pub struct CompilerOptions {
    pub gauge: Gauge,
    /// Emit a dedicated stitch number around increase shaping.
    pub use_increase_stitch_number: bool,
    /// Allow anchoring tucks on short-row turns.
    pub use_sr_tucks: bool,
    /// Allow single-vs-split selection in action programs.
    pub use_svs: bool,
    pub intarsia_tucks: IntarsiaTucks,
    pub intarsia_side: IntarsiaSide,
    /// Only tuck on needles holding at most one loop.
    pub safe_tucks: bool,
    pub shaping_algorithm: ShapingAlgorithm,
    /// Group same-racking transfers into combined passes.
    pub multi_transfer: bool,
    /// Drop identity collapse/expand pairs from oracle plans.
    pub reduce_transfers: bool,
    /// Stabilize cast-off edges with pick-up tucks.
    pub use_pick_up_stitch: bool,
    /// Number of anchoring tuck passes after bringing a yarn in.
    pub insert_depth: usize,
    pub cast_on_type: CastOnType,
    /// Largest racking the machine can reach, in whole pitches.
    pub max_racking: i32,
    /// Base stitch number for action passes; `None` leaves stitch numbers untouched.
    pub stitch_number: Option<u32>,
    /// Dedicated stitch number emitted around increases when enabled.
    pub increase_stitch_number: u32,
}

impl CompilerOptions {
    /// Returns options with the specified fields validated.
    pub fn new(insert_depth: usize, max_racking: i32) -> Result<Self, OptionsError> {
        if insert_depth < 1 {
            return Err(OptionsError::InsertDepthTooSmall(insert_depth));
        }
        if max_racking < 1 {
            return Err(OptionsError::MaxRackingTooSmall(max_racking));
        }
        Ok(Self {
            insert_depth,
            max_racking,
            ..Self::default()
        })
    }

    /// Validates the current field values.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.insert_depth < 1 {
            return Err(OptionsError::InsertDepthTooSmall(self.insert_depth));
        }
        if self.max_racking < 1 {
            return Err(OptionsError::MaxRackingTooSmall(self.max_racking));
        }
        Ok(())
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            gauge: Gauge::Full,
            use_increase_stitch_number: false,
            use_sr_tucks: true,
            use_svs: false,
            intarsia_tucks: IntarsiaTucks::Both,
            intarsia_side: IntarsiaSide::Before,
            safe_tucks: true,
            shaping_algorithm: ShapingAlgorithm::Cse,
            multi_transfer: true,
            reduce_transfers: true,
            use_pick_up_stitch: true,
            insert_depth: 1,
            cast_on_type: CastOnType::Interlock,
            max_racking: 4,
            stitch_number: None,
            increase_stitch_number: 1,
        }
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_bounds() {
        assert!(CompilerOptions::new(0, 4).is_err());
        assert!(CompilerOptions::new(1, 0).is_err());
        let options = CompilerOptions::new(2, 3).unwrap();
        assert_eq!(options.insert_depth, 2);
        assert_eq!(options.max_racking, 3);
        options.validate().unwrap();
    }
}
