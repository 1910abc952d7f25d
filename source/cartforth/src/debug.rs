//! Address to source mappings, and the stack crawls built from them.
//!
//! The mappings are recorded while code is emitted and are best effort:
//! code written through `,` from a running immediate word is attributed to
//! the line of the token that ran it, and `here !` can make old ranges lie.

use core::fmt;
use std::collections::BTreeMap;

struct WordRange {
    name: String,
    start: i32,
    /// Exclusive. Equal to `start` until the definition is closed by `;`.
    end: i32,
}

#[derive(Copy, Clone)]
struct LineInfo {
    file: usize,
    line: u32,
}

#[derive(Default)]
pub struct DebugInfo {
    files: Vec<String>,
    words: Vec<WordRange>,
    lines: BTreeMap<i32, LineInfo>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source label and returns its index.
    pub fn start_file(&mut self, name: &str) -> usize {
        self.files.push(name.to_owned());
        self.files.len() - 1
    }

    pub fn file_name(&self, file: usize) -> &str {
        self.files.get(file).map_or("<unknown>", String::as_str)
    }

    pub fn start_word(&mut self, name: &str, address: i32) {
        self.words.push(WordRange {
            name: name.to_owned(),
            start: address,
            end: address,
        });
    }

    /// Closes the range of the most recently started word.
    pub fn end_word(&mut self, address: i32) {
        if let Some(word) = self.words.last_mut() {
            word.end = address;
        }
    }

    pub fn add_line_mapping(&mut self, address: i32, file: usize, line: u32) {
        self.lines.insert(address, LineInfo { file, line });
    }

    /// Drops the words and line mappings at or above `address`, for code
    /// space that is being reclaimed.
    pub fn forget_from(&mut self, address: i32) {
        self.words.retain(|w| w.start < address);
        self.lines.split_off(&address);
    }

    /// Name of the word whose body contains `address`. Newer definitions
    /// win when ranges overlap.
    pub fn lookup_word(&self, address: i32) -> Option<&str> {
        self.words
            .iter()
            .rev()
            .find(|w| (w.start..w.end).contains(&address))
            .map(|w| w.name.as_str())
    }

    /// The file label and line that emitted the cell at `address`.
    pub fn lookup_line(&self, address: i32) -> Option<(&str, u32)> {
        self.lines
            .get(&address)
            .map(|info| (self.file_name(info.file), info.line))
    }

    pub fn frame(&self, address: i32) -> Frame {
        let (file, line) = match self.lookup_line(address) {
            Some((file, line)) => (Some(file.to_owned()), Some(line)),
            None => (None, None),
        };
        Frame {
            word: self.lookup_word(address).map(str::to_owned),
            address: Some(address),
            file,
            line,
        }
    }

    /// A frame for the outer interpreter, standing at `line` of `file`.
    pub fn source_frame(&self, file: usize, line: u32) -> Frame {
        Frame {
            word: None,
            address: None,
            file: Some(self.file_name(file).to_owned()),
            line: Some(line),
        }
    }
}

/// One guest call frame of a [`StackCrawl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub word: Option<String>,
    /// Address of the cell that was executing in this frame. `None` for
    /// the outer interpreter, which runs source text rather than cells.
    pub address: Option<i32>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = "unknown";
        let word = match (&self.word, self.address) {
            (Some(word), _) => word.as_str(),
            (None, Some(_)) => unknown,
            (None, None) => "<interpret>",
        };
        write!(f, "{word} ({}:", self.file.as_deref().unwrap_or(unknown))?;
        match self.line {
            Some(line) => write!(f, "{line}")?,
            None => f.write_str(unknown)?,
        }
        f.write_str(")")?;
        match self.address {
            Some(address) => write!(f, " @{address}"),
            None => Ok(()),
        }
    }
}

/// The guest call chain at the point a runtime error was raised, most
/// recent call first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackCrawl {
    frames: Vec<Frame>,
}

impl StackCrawl {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Renders nothing for an empty crawl, so an error message can always be
/// followed by its crawl.
impl fmt::Display for StackCrawl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return Ok(());
        }
        f.write_str("\n(most recent call first)")?;
        for frame in &self.frames {
            write!(f, "\n{frame}")?;
        }
        Ok(())
    }
}
