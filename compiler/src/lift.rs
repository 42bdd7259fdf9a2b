use alloc::{
    string::String,
    vec::Vec,
};

use itertools::Itertools;
use knitc_knitout::{Carrier, CarrierSet, Instruction};
use smallvec::SmallVec;

use crate::{
    ActionProgram, CompilerOptions, Pass, ProgramId, Registry, ShapingKind, StitchKind,
    TracedStitch, YarnAction, YarnNode,
    fragment::resolve_program,
};

// TOPOLOGICAL TRANSITION
// ================================================================================================

/// Whether a stitch crosses between one-sided and two-sided fabric at its course boundary.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TopoXform {
    #[default]
    None,
    OneToTwoSided,
    TwoToOneSided,
}

impl TopoXform {
    fn tag(&self) -> &'static str {
        match self {
            TopoXform::None => "-",
            TopoXform::OneToTwoSided => "1to2",
            TopoXform::TwoToOneSided => "2to1",
        }
    }
}

// LIFT PASS
// ================================================================================================

/// Assigns an action program to every stitch of a node that has none.
///
/// The synthesized schedule covers yarn arrival (inhook plus anchoring tucks), one main pass
/// per yarn in sorted order, the stitch-kind transfer, and yarn departure; it is interned
/// under a name that uniquely encodes the schedule, so identical stitches share one id.
pub fn lift_programs(
    registry: &mut Registry,
    node: &YarnNode,
    options: &CompilerOptions,
) -> Vec<ProgramId> {
    node.trace
        .iter()
        .map(|stitch| match stitch.program {
            Some(program) => program,
            None => lift_stitch(registry, node, stitch, options),
        })
        .collect()
}

fn lift_stitch(
    registry: &mut Registry,
    node: &YarnNode,
    stitch: &TracedStitch,
    options: &CompilerOptions,
) -> ProgramId {
    let insert = yarn_difference(stitch, stitch.course_prev.map(|i| &node.trace[i]));
    let remove = yarn_difference(stitch, stitch.course_next.map(|i| &node.trace[i]));
    let topo = topo_xform(node, stitch);

    // A miss shaping action forces the stitch kind to miss, even when the stitch also moves
    // yarns in or out.
    let kind = if stitch.shaping == ShapingKind::Miss { StitchKind::Miss } else { stitch.kind };

    let mut yarns: Vec<Carrier> = stitch.yarns.yarns.iter().cloned().collect();
    yarns.sort();
    let front_pass = yarns
        .iter()
        .position(|carrier| stitch.yarns.front.contains(carrier))
        .unwrap_or(0);

    if yarns.len() == 1
        && insert.is_empty()
        && remove.is_empty()
        && topo == TopoXform::None
        && matches!(kind, StitchKind::Knit | StitchKind::Purl | StitchKind::Tuck | StitchKind::Miss)
    {
        // Plain single-yarn stitches fall straight through to the base table.
        let mut plain = stitch.clone();
        plain.kind = kind;
        return resolve_program(&plain);
    }

    let name = encode_name(kind, &yarns, &insert, &remove, topo, front_pass);
    if let Some(existing) = registry.id_by_name(&name) {
        return existing;
    }
    let program = synthesize(kind, &yarns, stitch, &insert, &remove, topo, front_pass, options);
    registry.register(program, Some(&name))
}

/// Yarns of `stitch` that its course neighbor does not carry; short-row joins do not count as
/// arrivals.
fn yarn_difference(stitch: &TracedStitch, neighbor: Option<&TracedStitch>) -> Vec<Carrier> {
    if stitch.flags.short_row {
        return Vec::new();
    }
    let Some(neighbor) = neighbor else { return Vec::new() };
    let mut difference: Vec<Carrier> = stitch
        .yarns
        .yarns
        .iter()
        .filter(|carrier| !neighbor.yarns.yarns.contains(carrier))
        .cloned()
        .collect();
    difference.sort();
    difference
}

fn topo_xform(node: &YarnNode, stitch: &TracedStitch) -> TopoXform {
    let next_two_sided = stitch
        .wale_next
        .map(|i| node.trace[i].flags.two_sided)
        .unwrap_or(stitch.flags.two_sided);
    match (stitch.flags.two_sided, next_two_sided) {
        (false, true) => TopoXform::OneToTwoSided,
        (true, false) => TopoXform::TwoToOneSided,
        _ => TopoXform::None,
    }
}

fn encode_name(
    kind: StitchKind,
    yarns: &[Carrier],
    insert: &[Carrier],
    remove: &[Carrier],
    topo: TopoXform,
    front_pass: usize,
) -> String {
    let list = |carriers: &[Carrier]| carriers.iter().map(|carrier| carrier.name()).join(",");
    format!(
        "lift/k={kind:?}/y={}/i={}/r={}/x={}/f={front_pass}",
        list(yarns),
        list(insert),
        list(remove),
        topo.tag(),
    )
}

#[allow(clippy::too_many_arguments)]
fn synthesize(
    kind: StitchKind,
    yarns: &[Carrier],
    stitch: &TracedStitch,
    insert: &[Carrier],
    remove: &[Carrier],
    topo: TopoXform,
    front_pass: usize,
    options: &CompilerOptions,
) -> ActionProgram {
    let mut pre: Vec<Pass> = Vec::new();
    let mut main: Vec<Pass> = Vec::new();
    let mut post: Vec<Pass> = Vec::new();

    // Yarn arrivals: hook in, anchor with depth tucks, release.
    for carrier in insert {
        let cs = CarrierSet::single(carrier.clone());
        let depth = options.insert_depth;
        pre.push(Pass::new(move |ctx| {
            ctx.k.append(Instruction::InHook(cs.clone()));
            let mut direction = ctx.d.reversed();
            for _ in 0..depth {
                ctx.k.append(Instruction::Tuck(direction, ctx.n, cs.clone()));
                direction = direction.reversed();
            }
            ctx.k.append(Instruction::ReleaseHook(cs.clone()));
            Ok(())
        }));
    }

    // Purl works on the opposite bed: stash before the mains, return after them.
    let purl = kind == StitchKind::Purl;
    if purl {
        pre.push(Pass::new(|ctx| {
            if ctx.state.is_empty(ctx.n) {
                return Ok(());
            }
            ctx.ensure_racking(knitc_knitout::Racking::ZERO);
            ctx.emit(Instruction::Xfer(ctx.n, ctx.rn))
        }));
    }

    // One main pass per yarn, sorted; the front yarn knits, back yarns follow their tags.
    for (pass_index, carrier) in yarns.iter().enumerate() {
        let cs = CarrierSet::single(carrier.clone());
        let action = stitch.yarns.action(carrier);
        let crossing = topo == TopoXform::OneToTwoSided && pass_index == front_pass;
        let effective = match kind {
            StitchKind::Miss => YarnAction::Miss,
            StitchKind::Tuck if action == YarnAction::Knit => YarnAction::Tuck,
            _ => action,
        };
        main.push(Pass::new(move |ctx| match effective {
            YarnAction::None => Ok(()),
            YarnAction::Miss => ctx.emit(Instruction::Miss(ctx.d, ctx.n, cs.clone())),
            YarnAction::Tuck => ctx.emit(Instruction::Tuck(ctx.d, ctx.n, cs.clone())),
            YarnAction::Knit => {
                let needle = if purl { ctx.rn } else { ctx.n };
                ctx.emit(Instruction::Knit(ctx.d, needle, cs.clone()))?;
                if crossing {
                    // First course of a tube: the front-back pass knits both beds at the
                    // quarter racking the program requested.
                    ctx.emit(Instruction::Knit(ctx.d, ctx.rn, cs.clone()))?;
                }
                Ok(())
            },
        }));
    }

    if purl {
        post.push(Pass::new(|ctx| {
            ctx.ensure_racking(knitc_knitout::Racking::ZERO);
            ctx.emit(Instruction::Xfer(ctx.rn, ctx.n))
        }));
    }
    match kind {
        StitchKind::MoveLeft1 => post.push(Pass::new(|ctx| ctx.request_move(-1))),
        StitchKind::MoveRight1 => post.push(Pass::new(|ctx| ctx.request_move(1))),
        _ => {},
    }
    for carrier in remove {
        let cs = CarrierSet::single(carrier.clone());
        post.push(Pass::new(move |ctx| {
            ctx.k.append(Instruction::OutHook(cs.clone()));
            Ok(())
        }));
    }

    let mut quarter_racking: SmallVec<[bool; 2]> = SmallVec::new();
    if topo == TopoXform::OneToTwoSided {
        for pass_index in 0..main.len() {
            quarter_racking.push(pass_index == front_pass);
        }
    }

    ActionProgram {
        pre,
        main,
        post,
        split_by_side: false,
        use_cse_moves: false,
        quarter_racking,
        front_pass,
    }
}

// PATTERN GRID (AUTHORED LAYER)
// ================================================================================================

/// A user-authored pattern layer: a courses-by-wales grid of program ids tiled over a node's
/// rows.
#[derive(Clone, Debug, Default)]
pub struct PatternGrid {
    wales: usize,
    rows: Vec<Vec<Option<ProgramId>>>,
}

impl PatternGrid {
    pub fn new(courses: usize, wales: usize) -> Self {
        Self {
            wales,
            rows: vec![vec![None; wales]; courses],
        }
    }

    pub fn courses(&self) -> usize {
        self.rows.len()
    }

    pub fn wales(&self) -> usize {
        self.wales
    }

    pub fn set(&mut self, course: usize, wale: usize, program: ProgramId) {
        self.rows[course][wale] = Some(program);
    }

    /// Returns the authored program at a fabric position, tiling the grid over courses.
    pub fn lookup(&self, course: usize, wale: usize) -> Option<ProgramId> {
        if self.rows.is_empty() || wale >= self.wales {
            return None;
        }
        self.rows[course % self.rows.len()][wale]
    }

    /// Stamps authored programs onto a node's stitches by (row, wale) position.
    pub fn apply(&self, node: &mut YarnNode, first_row: u32) {
        for step in &node.steps {
            let block = &step.block;
            let course = block.row.saturating_sub(first_row) as usize;
            for (wale, &stitch) in block.stitches.iter().enumerate() {
                if let Some(program) = self.lookup(course, wale) {
                    node.trace[stitch].program = Some(program);
                }
            }
        }
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{StitchFlags, registry::BASE_PROGRAM_COUNT};

    fn node_with(stitches: Vec<TracedStitch>) -> YarnNode {
        YarnNode { trace: stitches, ..YarnNode::default() }
    }

    #[test]
    fn plain_knit_uses_base_program() {
        let node = node_with(vec![TracedStitch::knit(0, "1")]);
        let mut registry = Registry::new();
        let lifted = lift_programs(&mut registry, &node, &CompilerOptions::default());
        assert_eq!(lifted, vec![ProgramId::KNIT]);
        assert_eq!(registry.len(), BASE_PROGRAM_COUNT);
    }

    #[test]
    fn identical_stitches_share_one_lifted_id() {
        let mut a = TracedStitch::knit(0, "1");
        a.kind = StitchKind::MoveLeft1;
        let mut b = TracedStitch::knit(1, "1");
        b.kind = StitchKind::MoveLeft1;
        let node = node_with(vec![a, b]);
        let mut registry = Registry::new();
        let lifted = lift_programs(&mut registry, &node, &CompilerOptions::default());
        assert_eq!(lifted[0], lifted[1]);
        assert_eq!(registry.len(), BASE_PROGRAM_COUNT + 1);
    }

    #[test]
    fn yarn_arrivals_and_departures_are_detected() {
        let mut prev = TracedStitch::knit(0, "1");
        prev.course_next = Some(1);
        let mut cur = TracedStitch::knit(1, "2");
        cur.course_prev = Some(0);
        let node = node_with(vec![prev, cur]);

        let insert = yarn_difference(&node.trace[1], Some(&node.trace[0]));
        assert_eq!(insert, vec![Carrier::new("2")]);
        let remove = yarn_difference(&node.trace[0], Some(&node.trace[1]));
        assert_eq!(remove, vec![Carrier::new("1")]);
    }

    #[test]
    fn short_row_joins_are_not_arrivals() {
        let prev = TracedStitch::knit(0, "1");
        let mut cur = TracedStitch::knit(1, "2");
        cur.flags = StitchFlags { short_row: true, ..StitchFlags::default() };
        cur.course_prev = Some(0);
        let node = node_with(vec![prev, cur.clone()]);
        assert!(yarn_difference(&cur, Some(&node.trace[0])).is_empty());
    }

    #[test]
    fn one_to_two_sided_gets_quarter_racked_front_pass() {
        let mut cur = TracedStitch::knit(0, "1");
        cur.wale_next = Some(1);
        let mut above = TracedStitch::knit(1, "1");
        above.flags = StitchFlags { two_sided: true, ..StitchFlags::default() };
        // A second yarn forces synthesis instead of the base-table fallback.
        cur.yarns.yarns.push(Carrier::new("2"));
        cur.yarns.back_actions.insert(Carrier::new("2"), YarnAction::Miss);
        let node = node_with(vec![cur, above]);

        let mut registry = Registry::new();
        let lifted = lift_programs(&mut registry, &node, &CompilerOptions::default());
        let program = registry.get(lifted[0]).unwrap();
        assert_eq!(program.main.len(), 2);
        assert!(program.quarter_racking_at(program.front_pass));
        assert!(!program.quarter_racking_at(1 - program.front_pass));
    }

    #[test]
    fn miss_shaping_aliases_stitch_kind() {
        let mut stitch = TracedStitch::knit(0, "1");
        stitch.shaping = ShapingKind::Miss;
        let node = node_with(vec![stitch]);
        let mut registry = Registry::new();
        let lifted = lift_programs(&mut registry, &node, &CompilerOptions::default());
        assert_eq!(lifted, vec![ProgramId::MISS]);
    }

    #[test]
    fn pattern_grid_tiles_over_courses() {
        let mut grid = PatternGrid::new(2, 3);
        grid.set(0, 0, ProgramId::KNIT);
        grid.set(1, 0, ProgramId::TUCK);
        // Alignment runs over courses: row 4 of a 2-course grid is course 0 again.
        assert_eq!(grid.lookup(0, 0), Some(ProgramId::KNIT));
        assert_eq!(grid.lookup(1, 0), Some(ProgramId::TUCK));
        assert_eq!(grid.lookup(4, 0), Some(ProgramId::KNIT));
        assert_eq!(grid.lookup(5, 0), Some(ProgramId::TUCK));
        assert_eq!(grid.lookup(0, 2), None);
    }
}
