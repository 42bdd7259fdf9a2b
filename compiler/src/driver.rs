use alloc::{boxed::Box, string::String, vec::Vec};

use itertools::Itertools;
use knitc_knitout::{Carrier, CarrierSet, Needle};

use crate::{
    CompileError, CompilerOptions, Gauge, HalfGaugeHook, ProgramId, Session, Step, StitchBlock,
    YarnNode,
    fragment::{ActionEntry, Fragment, FragmentPayload},
    lift::lift_programs,
};

// COMPILE PHASES
// ================================================================================================

/// The linear phases of a compilation, in order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CompilePhase {
    Alloc,
    Init,
    Assemble,
    Generate,
    Modify,
    Finish,
}

impl CompilePhase {
    /// Progress fraction reached when this phase completes.
    fn ceiling(&self) -> f32 {
        match self {
            CompilePhase::Alloc => 0.05,
            CompilePhase::Init => 0.15,
            CompilePhase::Assemble => 0.30,
            CompilePhase::Generate => 0.90,
            CompilePhase::Modify => 0.95,
            CompilePhase::Finish => 1.0,
        }
    }

    fn floor(&self) -> f32 {
        match self {
            CompilePhase::Alloc => 0.0,
            CompilePhase::Init => CompilePhase::Alloc.ceiling(),
            CompilePhase::Assemble => CompilePhase::Init.ceiling(),
            CompilePhase::Generate => CompilePhase::Assemble.ceiling(),
            CompilePhase::Modify => CompilePhase::Generate.ceiling(),
            CompilePhase::Finish => CompilePhase::Modify.ceiling(),
        }
    }
}

// COMPILE OUTPUT
// ================================================================================================

/// The result of a successful compilation.
pub struct CompileOutput {
    /// The rendered knitout program.
    pub text: String,
    /// The session, kept for inspection of the stream, state, and fragments.
    pub session: Session,
}

// COMPILER
// ================================================================================================

/// The compile driver: walks nodes and steps in time order, attaches the right fragments, and
/// builds them against the shared session.
pub struct Compiler {
    options: CompilerOptions,
    phase: CompilePhase,
    progress: f32,
    progress_callback: Option<Box<dyn FnMut(f32)>>,
}

impl Compiler {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    pub fn new(options: CompilerOptions) -> Result<Self, CompileError> {
        options.validate()?;
        Ok(Self {
            options,
            phase: CompilePhase::Alloc,
            progress: 0.0,
            progress_callback: None,
        })
    }

    /// Registers a callback invoked whenever the progress fraction advances.
    pub fn on_progress(&mut self, callback: Box<dyn FnMut(f32)>) {
        self.progress_callback = Some(callback);
    }

    /// Returns the current monotonic progress fraction in [0, 1].
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn phase(&self) -> CompilePhase {
        self.phase
    }

    // COMPILATION
    // --------------------------------------------------------------------------------------------

    /// Compiles the nodes into a knitout program.
    pub fn compile(&mut self, nodes: &[YarnNode]) -> Result<CompileOutput, CompileError> {
        // Alloc: size the session for the whole trace.
        self.enter(CompilePhase::Alloc, 1.0);
        let stitch_count: usize = nodes.iter().map(|node| node.stitch_count()).sum();
        log::info!("compiling {} nodes, {stitch_count} stitches", nodes.len());
        let mut session = Session::new(self.options.clone(), stitch_count)?;
        session.stream.set_header_carriers(collect_carriers(nodes));
        if self.options.gauge == Gauge::Half {
            session.add_hook(Box::new(HalfGaugeHook));
        }

        // Init: lift per-stitch action programs, one node at a time.
        let mut lifted: Vec<Vec<ProgramId>> = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            lifted.push(lift_programs(&mut session.registry, node, &self.options));
            self.enter(CompilePhase::Init, (index + 1) as f32 / nodes.len().max(1) as f32);
        }
        self.enter(CompilePhase::Init, 1.0);

        // Assemble: nodes and steps become fragments.
        let total_steps: usize = nodes.iter().map(|node| node.steps.len()).sum();
        let mut assembled_steps = 0usize;
        for (node_index, node) in nodes.iter().enumerate() {
            session.attach(Fragment::new(FragmentPayload::NodeStart { node: node_index }));
            for (step_index, step) in node.steps.iter().enumerate() {
                self.assemble_step(&mut session, node, &lifted[node_index], step)?;
                self.align_toward_next(&mut session, node, nodes, node_index, step_index);
                assembled_steps += 1;
                self.enter(
                    CompilePhase::Assemble,
                    assembled_steps as f32 / total_steps.max(1) as f32,
                );
            }
        }
        self.enter(CompilePhase::Assemble, 1.0);

        // Generate: build every fragment, in order.
        let fragment_count = session.fragment_count();
        while session.build_next()? {
            self.enter(
                CompilePhase::Generate,
                session.built_count() as f32 / fragment_count.max(1) as f32,
            );
        }
        self.enter(CompilePhase::Generate, 1.0);

        // Modify: post-build validation of the fragment/stream contract.
        self.verify_ranges(&session)?;
        self.enter(CompilePhase::Modify, 1.0);

        // Finish: render.
        let text = format!("{}", session.stream);
        self.enter(CompilePhase::Finish, 1.0);
        Ok(CompileOutput { text, session })
    }

    // STEP ASSEMBLY
    // --------------------------------------------------------------------------------------------

    fn assemble_step(
        &self,
        session: &mut Session,
        node: &YarnNode,
        lifted: &[ProgramId],
        step: &Step,
    ) -> Result<(), CompileError> {
        let block = &step.block;
        if block.stitches.is_empty() || block.needles.is_empty() {
            return Err(CompileError::EmptyStep);
        }
        if block.needles.len() != block.stitches.len() {
            return Err(CompileError::CardinalityMismatch {
                what: "step needles",
                left: block.needles.len(),
                right: block.stitches.len(),
            });
        }
        if block.targets.len() != block.needles.len() {
            return Err(CompileError::CardinalityMismatch {
                what: "step targets",
                left: block.targets.len(),
                right: block.needles.len(),
            });
        }
        let cs = block_carriers(node, block);
        let direction = block.direction;

        if block.starts_yarn() {
            session.attach(Fragment::new(FragmentPayload::YarnStart {
                cs: cs.clone(),
                needles: block.needles.clone(),
                direction,
            }));
        }

        if block.needs_cast_on() {
            session.attach(Fragment::new(FragmentPayload::CastOn {
                needles: block.needles.clone(),
                direction,
                cs: cs.clone(),
                circular: block.circular(),
            }));
        } else if block.needs_cast_off() {
            let stitches: Vec<_> =
                block.stitches.iter().map(|&index| node.trace[index].clone()).collect();
            session.attach(Fragment::new(FragmentPayload::CastOff {
                stitches,
                needles: block.needles.clone(),
                direction,
                cs: cs.clone(),
            }));
        } else {
            let entries: Vec<ActionEntry> = block
                .stitches
                .iter()
                .zip(block.needles.iter())
                .map(|(&index, &needle)| ActionEntry {
                    stitch: node.trace[index].clone(),
                    needle,
                    direction,
                    program: lifted[index],
                })
                .collect();
            let mut action = Fragment::new(FragmentPayload::Action {
                entries,
                circular: block.circular(),
            });
            if let Some(base) = self.options.stitch_number {
                action = action.with_stitch_number(base);
            }
            session.attach(action);

            if block.needs_shaping() {
                let mut shaping = Fragment::new(FragmentPayload::Shaping {
                    sources: block.needles.clone(),
                    targets: block.targets.clone(),
                    circular: block.circular(),
                });
                let has_increase = block
                    .stitches
                    .iter()
                    .any(|&index| node.trace[index].shaping == crate::ShapingKind::Increase);
                if self.options.use_increase_stitch_number && has_increase {
                    shaping = shaping.with_stitch_number(self.options.increase_stitch_number);
                }
                session.attach(shaping);
            }
        }

        if block.ends_yarn() {
            let tail = *block.targets.last().unwrap_or(&block.needles[block.needles.len() - 1]);
            session.attach(Fragment::new(FragmentPayload::YarnEnd {
                cs,
                tail,
                direction,
                use_tail: block.needs_cast_off(),
            }));
        }

        session.attach(Fragment::new(FragmentPayload::StepEnd { row: block.row }));
        Ok(())
    }

    /// Attaches an alignment fragment when the next step expects this step's loops translated
    /// along their beds.
    fn align_toward_next(
        &self,
        session: &mut Session,
        node: &YarnNode,
        nodes: &[YarnNode],
        node_index: usize,
        step_index: usize,
    ) {
        let block = &node.steps[step_index].block;
        let next_block = match node.steps.get(step_index + 1) {
            Some(step) => &step.block,
            None => match node
                .following
                .and_then(|following| nodes.get(following))
                .and_then(|next| next.steps.first())
            {
                Some(step) => &step.block,
                None => return,
            },
        };
        if let Some((sources, targets)) = translation(&block.targets, &next_block.needles) {
            session.attach(Fragment::new(FragmentPayload::Alignment { sources, targets }));
        }
    }

    // VALIDATION
    // --------------------------------------------------------------------------------------------

    /// Checks that built fragments partition the stream into contiguous, ordered ranges.
    fn verify_ranges(&self, session: &Session) -> Result<(), CompileError> {
        let mut cursor = 0usize;
        for (_, fragment) in session.fragments() {
            if fragment.header.first_ptr != cursor {
                return Err(CompileError::FragmentRangeGap {
                    expected: cursor,
                    found: fragment.header.first_ptr,
                });
            }
            cursor = fragment.header.last_ptr;
        }
        if cursor != session.stream.len() {
            return Err(CompileError::FragmentRangeGap {
                expected: session.stream.len(),
                found: cursor,
            });
        }
        Ok(())
    }

    // PROGRESS
    // --------------------------------------------------------------------------------------------

    fn enter(&mut self, phase: CompilePhase, fraction: f32) {
        self.phase = phase;
        let span = phase.ceiling() - phase.floor();
        let progress = if fraction >= 1.0 {
            phase.ceiling()
        } else {
            (phase.floor() + span * fraction.max(0.0)).min(phase.ceiling())
        };
        if progress > self.progress {
            self.progress = progress;
            if let Some(callback) = &mut self.progress_callback {
                callback(self.progress);
            }
        }
    }
}

// HELPERS
// ================================================================================================

/// All carriers used anywhere in the input, in name order, for the rendered header.
fn collect_carriers(nodes: &[YarnNode]) -> Vec<Carrier> {
    nodes
        .iter()
        .flat_map(|node| &node.trace)
        .flat_map(|stitch| stitch.yarns.yarns.iter().cloned())
        .sorted()
        .dedup()
        .collect()
}

/// The carriers a block works with, in first-use order.
fn block_carriers(node: &YarnNode, block: &StitchBlock) -> CarrierSet {
    block
        .stitches
        .iter()
        .flat_map(|&index| node.trace[index].yarns.yarns.iter().cloned())
        .collect()
}

/// Returns (sources, targets) when `to` is a pure per-bed translation of `from`.
fn translation(from: &[Needle], to: &[Needle]) -> Option<(Vec<Needle>, Vec<Needle>)> {
    if from.len() != to.len() || from.is_empty() {
        return None;
    }
    let delta = to[0].offset - from[0].offset;
    for (a, b) in from.iter().zip(to.iter()) {
        if a.bed != b.bed || b.offset - a.offset != delta {
            return None;
        }
    }
    if delta == 0 {
        return None;
    }
    Some((from.to_vec(), to.to_vec()))
}
