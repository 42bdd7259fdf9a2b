use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};

use knitc_knitout::{
    CarrierSet, Direction, Instruction, Needle, Racking, Stream, newtype_id,
    indexing::IndexVec,
};
use knitc_machine::MachineState;
use smallvec::SmallVec;

use crate::{CompileError, TracedStitch};

newtype_id!(ProgramId);

/// Number of seeded base programs; user registrations start here.
pub const BASE_PROGRAM_COUNT: usize = 8;

impl ProgramId {
    pub const KNIT: ProgramId = ProgramId(0);
    pub const TUCK: ProgramId = ProgramId(1);
    pub const MISS: ProgramId = ProgramId(2);
    pub const KICKBACK: ProgramId = ProgramId(3);
    pub const SPLIT: ProgramId = ProgramId(4);
    pub const RSPLIT: ProgramId = ProgramId(5);
    pub const BKNIT: ProgramId = ProgramId(6);
    pub const FBKNIT: ProgramId = ProgramId(7);

    /// Returns true for the eight seeded base programs.
    pub fn is_base(&self) -> bool {
        (self.0 as usize) < BASE_PROGRAM_COUNT
    }
}

// MOVE MAP
// ================================================================================================

/// Inter-pass shift requests recorded by post-pass functions.
///
/// A stitch may request at most one shift; requests from pre or main passes are rejected. The
/// action pass drains the map once every post function has returned.
#[derive(Clone, Debug, Default)]
pub struct MoveMap {
    requests: BTreeMap<usize, i32>,
}

impl MoveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Records a shift of `delta` needles for the stitch, failing on a second request.
    fn record(&mut self, stitch: usize, delta: i32) -> Result<(), CompileError> {
        if self.requests.contains_key(&stitch) {
            return Err(CompileError::DuplicateMoveRequest { stitch });
        }
        self.requests.insert(stitch, delta);
        Ok(())
    }

    /// Drains all recorded requests in stitch order.
    pub fn drain(&mut self) -> impl Iterator<Item = (usize, i32)> {
        core::mem::take(&mut self.requests).into_iter()
    }
}

// ACTION CONTEXT
// ================================================================================================

/// Which of the three pass lists is currently running.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PassPhase {
    Pre,
    Main,
    Post,
}

/// The structured argument handed to every pass function.
///
/// Field names follow the action-entry projections: `k` is the instruction stream, `n` the
/// entry's needle, `ns` the next entry's needle, `rn` the paired needle on the opposite bed,
/// `cs` the carriers of the running pass.
pub struct ActionContext<'a> {
    pub k: &'a mut Stream,
    pub d: Direction,
    pub n: Needle,
    pub ns: Option<Needle>,
    pub rn: Needle,
    pub cs: CarrierSet,
    pub state: &'a MachineState,
    pub stitch: &'a TracedStitch,
    pub svs: bool,
    pub pass_index: usize,
    pub(crate) phase: PassPhase,
    pub(crate) moves: &'a mut MoveMap,
    /// Racking shadow for instructions emitted but not yet flushed.
    pub(crate) rack: &'a mut Racking,
}

impl ActionContext<'_> {
    /// Requests an inter-pass shift of the current stitch; honored from post passes only.
    pub fn request_move(&mut self, delta: i32) -> Result<(), CompileError> {
        if self.phase != PassPhase::Post {
            return Err(CompileError::MoveOutsidePostPass { stitch: self.stitch.index });
        }
        self.moves.record(self.stitch.index, delta)
    }

    /// Appends an instruction and back-links it to the current stitch.
    pub fn emit(&mut self, instruction: Instruction) -> Result<(), CompileError> {
        self.k.append(instruction);
        self.k.set_metadata(-1, self.stitch.index as i64)?;
        Ok(())
    }

    /// Emits a `rack` line when the pending racking differs from `racking`.
    pub fn ensure_racking(&mut self, racking: Racking) {
        if *self.rack != racking {
            self.k.append(Instruction::Rack(racking));
            *self.rack = racking;
        }
    }
}

// ACTION PROGRAM
// ================================================================================================

/// A single pass function of an action program.
#[derive(Clone)]
pub struct Pass(Arc<dyn Fn(&mut ActionContext<'_>) -> Result<(), CompileError>>);

impl Pass {
    pub fn new(f: impl Fn(&mut ActionContext<'_>) -> Result<(), CompileError> + 'static) -> Self {
        Pass(Arc::new(f))
    }

    pub fn call(&self, ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
        (self.0)(ctx)
    }
}

impl core::fmt::Debug for Pass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Pass(..)")
    }
}

/// An extensible description of how one stitch knits: ordered pre, main, and post pass lists
/// plus program-level pass options.
#[derive(Clone, Debug, Default)]
pub struct ActionProgram {
    pub pre: Vec<Pass>,
    pub main: Vec<Pass>,
    pub post: Vec<Pass>,
    /// Process same-side needle runs independently.
    pub split_by_side: bool,
    /// Realize post-pass moves through the collapse-shift-expand planner.
    pub use_cse_moves: bool,
    /// Per-main-pass quarter-racking requirement.
    pub quarter_racking: SmallVec<[bool; 2]>,
    /// Index of the main pass carrying the visible front yarn.
    pub front_pass: usize,
}

impl ActionProgram {
    /// Returns a program with a single main pass.
    pub fn single(main: Pass) -> Self {
        Self { main: vec![main], ..Self::default() }
    }

    /// Returns whether main pass `index` runs at quarter racking.
    pub fn quarter_racking_at(&self, index: usize) -> bool {
        self.quarter_racking.get(index).copied().unwrap_or(false)
    }
}

// REGISTRY
// ================================================================================================

/// The session-owned table of action programs.
///
/// Ids below [BASE_PROGRAM_COUNT] are the seeded base programs; named registrations intern by
/// name, so registering the same name twice returns the original id.
#[derive(Debug)]
pub struct Registry {
    programs: IndexVec<ProgramId, ActionProgram>,
    names: BTreeMap<String, ProgramId>,
}

impl Registry {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a registry seeded with the eight base programs.
    pub fn new() -> Self {
        let mut registry = Self { programs: IndexVec::new(), names: BTreeMap::new() };
        registry.seed();
        registry
    }

    fn seed(&mut self) {
        debug_assert!(self.programs.is_empty());
        self.programs.push(ActionProgram::single(Pass::new(pass_knit)));
        self.programs.push(ActionProgram::single(Pass::new(pass_tuck)));
        self.programs.push(ActionProgram::single(Pass::new(pass_miss)));
        self.programs.push(ActionProgram::single(Pass::new(pass_kickback)));
        self.programs.push(ActionProgram::single(Pass::new(pass_split)));
        self.programs.push(ActionProgram::single(Pass::new(pass_rsplit)));
        self.programs.push(ActionProgram {
            pre: vec![Pass::new(pass_stash_opposite)],
            main: vec![Pass::new(pass_knit_opposite)],
            post: vec![Pass::new(pass_return_from_opposite)],
            ..ActionProgram::default()
        });
        self.programs.push(ActionProgram {
            main: vec![Pass::new(pass_front_back_knit)],
            quarter_racking: smallvec::smallvec![true],
            ..ActionProgram::default()
        });
    }

    // MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Registers a program, interning by name when one is given.
    pub fn register(&mut self, program: ActionProgram, name: Option<&str>) -> ProgramId {
        if let Some(name) = name {
            if let Some(id) = self.names.get(name) {
                return *id;
            }
            let id = self.programs.push(program);
            self.names.insert(name.to_string(), id);
            id
        } else {
            self.programs.push(program)
        }
    }

    /// Truncates the table back to the eight base programs.
    pub fn reset(&mut self) {
        self.programs.truncate(BASE_PROGRAM_COUNT);
        self.names.clear();
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn get(&self, id: ProgramId) -> Result<&ActionProgram, CompileError> {
        self.programs.get(id).ok_or(CompileError::UnknownProgram(id.into()))
    }

    /// Returns the id registered under `name`, if any.
    pub fn id_by_name(&self, name: &str) -> Option<ProgramId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

// BASE PASS FUNCTIONS
// ================================================================================================

fn pass_knit(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Knit(ctx.d, ctx.n, ctx.cs.clone()))
}

fn pass_tuck(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Tuck(ctx.d, ctx.n, ctx.cs.clone()))
}

fn pass_miss(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Miss(ctx.d, ctx.n, ctx.cs.clone()))
}

/// A tiny reverse miss, re-positioning the carriers on the other side of the needle.
fn pass_kickback(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Miss(ctx.d.reversed(), ctx.n, ctx.cs.clone()))
}

fn pass_split(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.ensure_racking(Racking::ZERO);
    ctx.emit(Instruction::Split(ctx.d, ctx.n, ctx.rn, ctx.cs.clone()))
}

/// Split pulled from the paired needle back onto the entry needle.
fn pass_rsplit(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.ensure_racking(Racking::ZERO);
    ctx.emit(Instruction::Split(ctx.d, ctx.rn, ctx.n, ctx.cs.clone()))
}

fn pass_stash_opposite(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    if ctx.state.is_empty(ctx.n) {
        return Ok(());
    }
    ctx.ensure_racking(Racking::ZERO);
    ctx.emit(Instruction::Xfer(ctx.n, ctx.rn))
}

fn pass_knit_opposite(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Knit(ctx.d, ctx.rn, ctx.cs.clone()))
}

fn pass_return_from_opposite(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.ensure_racking(Racking::ZERO);
    ctx.emit(Instruction::Xfer(ctx.rn, ctx.n))
}

/// Knits the entry needle and its opposite partner in one pass; runs at quarter racking.
fn pass_front_back_knit(ctx: &mut ActionContext<'_>) -> Result<(), CompileError> {
    ctx.emit(Instruction::Knit(ctx.d, ctx.n, ctx.cs.clone()))?;
    ctx.emit(Instruction::Knit(ctx.d, ctx.rn, ctx.cs.clone()))
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn base_programs_are_seeded() {
        let registry = Registry::new();
        assert_eq!(registry.len(), BASE_PROGRAM_COUNT);
        assert!(registry.get(ProgramId::KNIT).is_ok());
        assert!(registry.get(ProgramId::FBKNIT).is_ok());
        assert!(registry.get(ProgramId::from(8)).is_err());
    }

    #[test]
    fn register_interns_by_name() {
        let mut registry = Registry::new();
        let a = registry.register(ActionProgram::default(), Some("rib-2x2"));
        let b = registry.register(ActionProgram::default(), Some("rib-2x2"));
        let c = registry.register(ActionProgram::default(), Some("rib-1x1"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.id_by_name("rib-2x2"), Some(a));
        assert_eq!(u32::from(a), BASE_PROGRAM_COUNT as u32);
    }

    #[test]
    fn unnamed_registrations_always_allocate() {
        let mut registry = Registry::new();
        let a = registry.register(ActionProgram::default(), None);
        let b = registry.register(ActionProgram::default(), None);
        assert_ne!(a, b);
    }

    #[test]
    fn reset_truncates_to_base() {
        let mut registry = Registry::new();
        registry.register(ActionProgram::default(), Some("tmp"));
        registry.reset();
        assert_eq!(registry.len(), BASE_PROGRAM_COUNT);
        assert_eq!(registry.id_by_name("tmp"), None);
        // Re-registering after reset reuses the freed id range.
        let id = registry.register(ActionProgram::default(), Some("tmp"));
        assert_eq!(u32::from(id), BASE_PROGRAM_COUNT as u32);
    }

    #[test]
    fn quarter_racking_defaults_off_past_list() {
        let registry = Registry::new();
        let fbknit = registry.get(ProgramId::FBKNIT).unwrap();
        assert!(fbknit.quarter_racking_at(0));
        assert!(!fbknit.quarter_racking_at(1));
    }
}
