//! An embeddable forth-dialect engine.
//!
//! Guest programs are compiled into a single fixed-size arena of 32-bit
//! cells and executed by a bounded threaded interpreter. Control flow
//! words (`if`, `begin`, `do`, `case`, ...) are not built in: they are
//! ordinary `immediate` words from the self-hosted prelude that emit and
//! backpatch branches while the enclosing definition is being compiled.
//!
//! The host reaches guest code through [`Engine::interpret_source`] and
//! [`Engine::call_word`], and the guest reaches the host only through
//! native words registered with [`Engine::register_native`].
//!
//! ```rust
//! use cartforth::Engine;
//!
//! let mut engine = Engine::new(Vec::<i32>::new()).unwrap();
//! engine.register_native(".", 1, |vm, args| {
//!     vm.host_ctxt.push(args[0]);
//!     Ok(vec![])
//! });
//! engine.interpret_source(": square dup * ; 7 square .", "demo").unwrap();
//! assert_eq!(engine.release(), vec![49]);
//! ```

pub mod debug;
pub mod dictionary;
pub mod input;
pub mod memory;
pub mod name;
pub mod params;
pub mod stack;
pub mod vm;
pub mod word;

#[cfg(any(test, feature = "_force_test_utils"))]
pub mod testutil;

pub use crate::{
    debug::{Frame, StackCrawl},
    params::{Params, StackLeakPolicy},
    vm::{Engine, HostFunc},
    word::{Cell, NativeId},
};

/// Whether the outer interpreter executes or compiles the next token.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Interpret,
    Compile,
}

/// Errors raised while tokenizing or compiling source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("unknown word {0}")]
    UnknownWord(String),
    #[error("missing word name")]
    MissingWordName,
    #[error("nested colon def")]
    NestedColon,
    #[error("create inside colon def")]
    CreateInsideColon,
    #[error("constant inside colon def")]
    ConstantInsideColon,
    #[error("unmatched ;")]
    UnmatchedSemicolon,
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("invalid numeric base {0}")]
    InvalidBase(i32),
    #[error("{0} can only be used in compiled code")]
    CompileOnly(&'static str),
}

/// Errors raised while executing compiled or native code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("return stack underflow")]
    ReturnStackUnderflow,
    #[error("Memory fetch out of range: {0}")]
    FetchOutOfRange(i32),
    #[error("Memory store out of range: {0}")]
    StoreOutOfRange(i32),
    #[error("PC out of range: {0}")]
    PcOutOfRange(i32),
    #[error("invalid branch to zero")]
    InvalidBranchToZero,
    #[error("Exceeded maximum cycles")]
    ExceededMaxCycles,
    #[error("out of memory")]
    OutOfMemory,
    #[error("divide by zero")]
    DivideByZero,
    #[error("native word reference used as a number")]
    NotANumber,
    #[error("host calls nested more than {0} deep")]
    NestingTooDeep(usize),
    #[error("stack leaked {0} cells")]
    StackLeak(usize),
    #[error("{0}")]
    Host(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A compile error, tagged with the source label and line at the point
    /// of failure.
    #[error("{file}:{line}: {kind}")]
    Compile {
        file: String,
        line: u32,
        kind: CompileError,
    },
    /// A runtime error, with the guest call chain at the point of failure.
    ///
    /// Errors raised while interpreting source text outside compiled code
    /// carry a single `<interpret>` frame at the offending line. Only
    /// errors from the host-side accessors (`pop`, `fetch_cell`, ...)
    /// have an empty crawl.
    #[error("{kind}{crawl}")]
    Runtime {
        kind: RuntimeError,
        crawl: StackCrawl,
    },
    #[error("invalid engine parameters: {0}")]
    InvalidParams(&'static str),
}

impl From<RuntimeError> for Error {
    fn from(kind: RuntimeError) -> Self {
        Error::Runtime {
            kind,
            crawl: StackCrawl::default(),
        }
    }
}

impl Error {
    pub fn runtime_kind(&self) -> Option<&RuntimeError> {
        match self {
            Error::Runtime { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn compile_kind(&self) -> Option<&CompileError> {
        match self {
            Error::Compile { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// The stack crawl of a runtime error. Empty when the fault happened
    /// outside compiled code.
    pub fn crawl(&self) -> Option<&StackCrawl> {
        match self {
            Error::Runtime { crawl, .. } => Some(crawl),
            _ => None,
        }
    }
}

/// `WordFunc` is the signature of a built-in native word.
///
/// Builtins get the whole engine: the threading ops move the program
/// counter, and the compiler words read ahead in the source.
pub type WordFunc<T> = fn(&mut Engine<T>) -> Result<(), Error>;

#[cfg(test)]
pub mod test {
    use crate::{testutil::recording_engine, Engine, Error, RuntimeError};

    #[test]
    fn forth() {
        let mut engine = recording_engine();
        let lines: &[(&str, &[i32])] = &[
            ("2 3 + .", &[5]),
            (": yay 2 3 + . ;", &[]),
            ("yay yay yay", &[5, 5, 5]),
            (": boop yay yay ;", &[]),
            ("boop", &[5, 5]),
            (": err if boop boop boop else yay yay then ;", &[]),
            (": erf if boop boop boop then yay yay ;", &[]),
            ("0 err", &[5, 5]),
            ("1 err", &[5, 5, 5, 5, 5, 5]),
            ("0 erf", &[5, 5]),
            ("1 erf", &[5, 5, 5, 5, 5, 5, 5, 5]),
            (": one 1 . ;", &[]),
            (": two 2 . ;", &[]),
            (": six 6 . ;", &[]),
            (": nif if one if two two else six then one then ;", &[]),
            ("  0 nif", &[]),
            ("0 1 nif", &[1, 6, 1]),
            ("1 1 nif", &[1, 2, 2, 1]),
            (": sloop one 5 0 do 42 . loop six ;", &[]),
            ("sloop", &[1, 42, 42, 42, 42, 42, 6]),
            (": count 10 0 do i . loop ;", &[]),
            ("count", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]),
            (": smod 10 0 do i 3 mod 0= if i . then loop ;", &[]),
            ("smod", &[0, 3, 6, 9]),
            ("123 constant x", &[]),
            ("x .", &[123]),
            ("4 x + .", &[127]),
            ("variable y", &[]),
            ("y @ .", &[0]),
            ("10 y !", &[]),
            ("y @ .", &[10]),
            ("create z 4 cells allot drop", &[]),
            ("10 z ! 20 z 4 + ! 30 z 8 + ! 40 z 12 + !", &[]),
            ("z @ . z 4 + @ . z 8 + @ . z 12 + @ .", &[10, 20, 30, 40]),
        ];

        for (line, out) in lines {
            println!("> {line}");
            engine.interpret_source(line, "test").unwrap();
            assert_eq!(engine.host_ctxt.as_slice(), *out, "{line}");
            engine.host_ctxt.clear();
        }

        assert!(engine.interpret_source(": derp boop yay", "test").is_ok());
        let err = engine.interpret_source("yaay ;", "test").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));

        // A failed line leaves the engine usable.
        engine.host_ctxt.clear();
        engine.interpret_source("boop yay", "test").unwrap();
        assert_eq!(engine.host_ctxt, vec![5, 5, 5]);
        assert_eq!(engine.depth(), 0);
    }

    #[test]
    fn errors_render_with_location() {
        let mut engine = Engine::new(()).unwrap();
        let err = engine
            .interpret_source("\n\n: foo\n: bar\n", "game.fth")
            .unwrap_err();
        assert_eq!(err.to_string(), "game.fth:4: nested colon def");

        let err = engine.interpret_source("2 -1 !", "game.fth").unwrap_err();
        assert_eq!(err.runtime_kind(), Some(&RuntimeError::StoreOutOfRange(-1)));
        assert_eq!(
            err.to_string(),
            "Memory store out of range: -1\n(most recent call first)\n<interpret> (game.fth:1)"
        );
    }
}
