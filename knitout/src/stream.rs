use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use crate::{Carrier, Instruction, KNITOUT_MAGIC};

// ERRORS
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream index {index} is out of bounds for a stream of {len} entries")]
    IndexOutOfBounds { index: isize, len: usize },
}

// INSTRUCTION SINK
// ================================================================================================

/// A consumer of flushed instructions.
///
/// The live machine state implements this; [Stream::flush_into] guarantees each appended
/// instruction is consumed exactly once, in emission order.
pub trait InstructionSink {
    type Error;

    fn consume(&mut self, instruction: &Instruction) -> Result<(), Self::Error>;
}

// ENTRY
// ================================================================================================

/// One stream slot: an instruction plus its optional comment and metadata.
///
/// Metadata back-links an emitted instruction to the traced stitch it realizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub instruction: Instruction,
    pub comment: Option<String>,
    pub metadata: Option<i64>,
}

impl Entry {
    fn new(instruction: Instruction) -> Self {
        Self { instruction, comment: None, metadata: None }
    }
}

// STREAM
// ================================================================================================

/// Append-only log of knitout instructions.
///
/// Entries are never removed or reordered; fragments reference ranges of the stream by index
/// only. A flush watermark separates entries already applied to the live machine state from
/// entries appended since.
#[derive(Clone, Debug, Default)]
pub struct Stream {
    entries: Vec<Entry>,
    flushed: usize,
    /// Carriers named in the `;;Carriers:` header of the rendered program.
    header_carriers: Vec<Carrier>,
}

impl Stream {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Returns an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an empty stream sized for a program of `stitch_count` traced stitches.
    ///
    /// Three instructions per stitch is an empirical fit across shaped, tubular inputs.
    pub fn for_stitch_count(stitch_count: usize) -> Self {
        Self {
            entries: Vec::with_capacity(3 * stitch_count),
            flushed: 0,
            header_carriers: Vec::new(),
        }
    }

    /// Declares the carriers listed in the rendered header, in machine order.
    pub fn set_header_carriers(&mut self, carriers: impl IntoIterator<Item = Carrier>) {
        self.header_carriers = carriers.into_iter().collect();
    }

    // MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Appends an instruction and returns its index.
    pub fn append(&mut self, instruction: Instruction) -> usize {
        self.entries.push(Entry::new(instruction));
        self.entries.len() - 1
    }

    /// Appends a bare comment line (a no-op entry carrying the comment).
    pub fn append_comment(&mut self, comment: impl AsRef<str>) -> usize {
        let index = self.append(Instruction::Noop);
        self.entries[index].comment = Some(comment.as_ref().to_string());
        index
    }

    /// Sets the comment of the entry at `index`; negative indices count from the end.
    pub fn set_comment(&mut self, index: isize, comment: impl AsRef<str>) -> Result<(), StreamError> {
        let index = self.resolve_index(index)?;
        self.entries[index].comment = Some(comment.as_ref().to_string());
        Ok(())
    }

    /// Sets the stitch-metadata slot of the entry at `index`; negative indices count from the end.
    pub fn set_metadata(&mut self, index: isize, metadata: i64) -> Result<(), StreamError> {
        let index = self.resolve_index(index)?;
        self.entries[index].metadata = Some(metadata);
        Ok(())
    }

    /// Applies every not-yet-flushed entry to `sink`, in order, exactly once.
    ///
    /// Returns the number of entries applied. On error the watermark stays on the failing
    /// entry, so the sink never sees an instruction twice.
    pub fn flush_into<S: InstructionSink>(&mut self, sink: &mut S) -> Result<usize, S::Error> {
        let mut applied = 0;
        while self.flushed < self.entries.len() {
            sink.consume(&self.entries[self.flushed].instruction)?;
            self.flushed += 1;
            applied += 1;
        }
        Ok(applied)
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many entries have been flushed to the live state.
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    /// Returns the entry at `index`; negative indices count from the end (`-1` = last).
    pub fn entry(&self, index: isize) -> Result<&Entry, StreamError> {
        let index = self.resolve_index(index)?;
        Ok(&self.entries[index])
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    fn resolve_index(&self, index: isize) -> Result<usize, StreamError> {
        let len = self.entries.len();
        let resolved = if index < 0 { index + len as isize } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(StreamError::IndexOutOfBounds { index, len });
        }
        Ok(resolved as usize)
    }
}

impl fmt::Display for Stream {
    /// Renders the full knitout program: magic, carriers header, then one line per entry.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{KNITOUT_MAGIC}")?;
        if !self.header_carriers.is_empty() {
            write!(f, ";;Carriers:")?;
            for carrier in &self.header_carriers {
                write!(f, " {carrier}")?;
            }
            writeln!(f)?;
        }
        for entry in &self.entries {
            match (&entry.instruction, &entry.comment) {
                (Instruction::Noop, None) => continue,
                (Instruction::Noop, Some(comment)) => writeln!(f, ";{comment}")?,
                (instruction, None) => writeln!(f, "{instruction}")?,
                (instruction, Some(comment)) => writeln!(f, "{instruction} ;{comment}")?,
            }
        }
        Ok(())
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{CarrierSet, Direction, Needle};

    struct Counter(usize);

    impl InstructionSink for Counter {
        type Error = ();

        fn consume(&mut self, _instruction: &Instruction) -> Result<(), ()> {
            self.0 += 1;
            Ok(())
        }
    }

    fn knit(offset: i32) -> Instruction {
        Instruction::Knit(Direction::Rightward, Needle::front(offset), CarrierSet::single("1"))
    }

    #[test]
    fn append_and_negative_indexing() {
        let mut stream = Stream::new();
        stream.append(knit(0));
        stream.append(knit(1));
        stream.set_comment(-1, "last").unwrap();
        assert_eq!(stream.entry(-1).unwrap().comment.as_deref(), Some("last"));
        assert_eq!(stream.entry(1).unwrap().comment.as_deref(), Some("last"));
        assert!(stream.entry(-3).is_err());
        assert!(stream.set_metadata(2, 0).is_err());
    }

    #[test]
    fn flush_applies_each_entry_once() {
        let mut stream = Stream::new();
        let mut sink = Counter(0);
        stream.append(knit(0));
        stream.append(knit(1));
        assert_eq!(stream.flush_into(&mut sink).unwrap(), 2);
        assert_eq!(stream.flush_into(&mut sink).unwrap(), 0);
        stream.append(knit(2));
        assert_eq!(stream.flush_into(&mut sink).unwrap(), 1);
        assert_eq!(sink.0, 3);
    }

    #[test]
    fn renders_program_text() {
        let mut stream = Stream::new();
        stream.set_header_carriers([Carrier::new("1"), Carrier::new("2")]);
        stream.append_comment("cast-on");
        stream.append(knit(0));
        stream.set_comment(-1, "first").unwrap();
        let text = format!("{stream}");
        assert_eq!(text, ";!knitout-2\n;;Carriers: 1 2\n;cast-on\nknit + f0 1 ;first\n");
    }
}
