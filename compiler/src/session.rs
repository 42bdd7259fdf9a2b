use alloc::{boxed::Box, vec::Vec};

use knitc_knitout::{Stream, indexing::IndexVec};
use knitc_machine::MachineState;

use crate::{
    CompileError, CompilerOptions, FragmentHook, Registry,
    fragment::{BuildContext, Fragment, FragmentId},
};

// SESSION
// ================================================================================================

/// Owner of everything one compilation produces and consumes: the instruction stream, the live
/// machine state, the fragment vector, the action-program registry, and the attach hooks.
///
/// Fragments are appended during assembly and built exactly once, in order. Building runs the
/// shared template: slider check, pointer recording, stitch-number maintenance, variant
/// generation, flush, and the default type comment.
pub struct Session {
    pub options: CompilerOptions,
    pub registry: Registry,
    pub stream: Stream,
    pub state: MachineState,
    fragments: IndexVec<FragmentId, Fragment>,
    hooks: Vec<Box<dyn FragmentHook>>,
    built: usize,
}

impl Session {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a session sized for a program of `stitch_count` traced stitches.
    pub fn new(options: CompilerOptions, stitch_count: usize) -> Result<Self, CompileError> {
        options.validate()?;
        Ok(Self {
            options,
            registry: Registry::new(),
            stream: Stream::for_stitch_count(stitch_count),
            state: MachineState::new(),
            fragments: IndexVec::new(),
            hooks: Vec::new(),
            built: 0,
        })
    }

    // HOOKS
    // --------------------------------------------------------------------------------------------

    /// Adds a transform applied to every subsequently attached fragment.
    pub fn add_hook(&mut self, hook: Box<dyn FragmentHook>) {
        self.hooks.push(hook);
    }

    // FRAGMENT MANAGEMENT
    // --------------------------------------------------------------------------------------------

    /// Attaches a fragment: hooks rewrite it in flight, then it is linked after the previous
    /// fragment.
    pub fn attach(&mut self, mut fragment: Fragment) -> FragmentId {
        for hook in &self.hooks {
            hook.on_attach(&mut fragment, &self.options);
        }
        let id = self.fragments.next_id();
        if !self.fragments.is_empty() {
            let prev = FragmentId::from(u32::from(id) - 1);
            fragment.header.prev = Some(prev);
            self.fragments[prev].header.next = Some(id);
        }
        self.fragments.push(fragment)
    }

    /// Returns the number of attached fragments.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Returns the number of fragments built so far.
    pub fn built_count(&self) -> usize {
        self.built
    }

    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    /// Iterates fragments in emission order.
    pub fn fragments(&self) -> impl Iterator<Item = (FragmentId, &Fragment)> {
        self.fragments.iter_enumerated()
    }

    // BUILDING
    // --------------------------------------------------------------------------------------------

    /// Builds the next unbuilt fragment; returns false once all fragments are built.
    pub fn build_next(&mut self) -> Result<bool, CompileError> {
        let id = FragmentId::from(self.built as u32);
        if self.fragments.get(id).is_none() {
            return Ok(false);
        }
        self.build_fragment(id)?;
        self.built += 1;
        Ok(true)
    }

    /// Builds every remaining fragment in order.
    pub fn build_all(&mut self) -> Result<(), CompileError> {
        while self.build_next()? {}
        Ok(())
    }

    fn build_fragment(&mut self, id: FragmentId) -> Result<(), CompileError> {
        let kind = self.fragments[id].kind();
        if self.state.has_pending_sliders() {
            return Err(CompileError::PendingSliders { fragment: kind.comment() });
        }

        let first_ptr = self.stream.len();
        if let Some(desired) = self.fragments[id].header.stitch_number {
            if self.state.stitch_number() != Some(desired) {
                self.stream.append(knitc_knitout::Instruction::StitchNumber(desired));
            }
        }

        let payload = self.fragments[id].payload.clone();
        let mut ctx = BuildContext {
            stream: &mut self.stream,
            state: &mut self.state,
            options: &self.options,
            registry: &self.registry,
        };
        payload.generate(&mut ctx)?;

        self.stream.flush_into(&mut self.state)?;
        let last_ptr = self.stream.len();
        {
            let header = &mut self.fragments[id].header;
            header.first_ptr = first_ptr;
            header.last_ptr = last_ptr;
        }
        if first_ptr < last_ptr && self.stream.entry(first_ptr as isize)?.comment.is_none() {
            self.stream.set_comment(first_ptr as isize, kind.comment())?;
        }
        Ok(())
    }
}

// TESTS
// ================================================================================================
