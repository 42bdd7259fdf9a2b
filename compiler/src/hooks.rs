use crate::{
    CompilerOptions, Gauge,
    fragment::Fragment,
    plan::full_to_half,
};

// FRAGMENT HOOKS
// ================================================================================================

/// A transform applied to fragments as they are attached to the session.
///
/// Hooks rewrite fragment payloads in flight, before anything is built; they never touch the
/// stream or the machine state.
pub trait FragmentHook {
    fn on_attach(&self, fragment: &mut Fragment, options: &CompilerOptions);
}

/// Rewrites logical full-gauge needle assignments onto the physical half-gauge bed (every
/// other needle).
pub struct HalfGaugeHook;

impl FragmentHook for HalfGaugeHook {
    fn on_attach(&self, fragment: &mut Fragment, options: &CompilerOptions) {
        if options.gauge != Gauge::Half {
            return;
        }
        fragment.payload.map_needles(full_to_half);
    }
}

#[cfg(test)]
mod tests {
    use knitc_knitout::{CarrierSet, Direction, Needle};

    use super::*;
    use crate::fragment::FragmentPayload;

    #[test]
    fn half_gauge_hook_doubles_offsets() {
        let mut fragment = Fragment::new(FragmentPayload::Shaping {
            sources: vec![Needle::front(1), Needle::front(2)],
            targets: vec![Needle::front(1), Needle::front(1)],
            circular: false,
        });
        let mut options = CompilerOptions::default();
        options.gauge = Gauge::Half;
        HalfGaugeHook.on_attach(&mut fragment, &options);
        match &fragment.payload {
            FragmentPayload::Shaping { sources, targets, .. } => {
                assert_eq!(sources, &[Needle::front(2), Needle::front(4)]);
                assert_eq!(targets, &[Needle::front(2), Needle::front(2)]);
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn hook_is_inert_at_full_gauge() {
        let mut fragment = Fragment::new(FragmentPayload::YarnStart {
            cs: CarrierSet::single("1"),
            needles: vec![Needle::front(3)],
            direction: Direction::Rightward,
        });
        HalfGaugeHook.on_attach(&mut fragment, &CompilerOptions::default());
        match &fragment.payload {
            FragmentPayload::YarnStart { needles, .. } => {
                assert_eq!(needles, &[Needle::front(3)]);
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
