use core::mem;

use portable_atomic::{AtomicUsize, Ordering};

use crate::{
    debug::{DebugInfo, StackCrawl},
    dictionary::{Behavior, Dictionary, Entry},
    input::SourceBuf,
    memory::{Memory, CELL_SIZE},
    params::{Params, StackLeakPolicy},
    stack::Stack,
    word::Cell,
    CompileError, Error, Mode, RuntimeError,
};

mod builtins;
mod inner;
mod native;

pub use self::native::HostFunc;
use self::native::Native;

/// The self-hosted part of the standard word library.
const PRELUDE: &str = include_str!("prelude.fth");

static NEXT_ENGINE_ID: AtomicUsize = AtomicUsize::new(0);

/// How deep host natives may nest calls back into the engine.
pub const MAX_NESTING: usize = 64;

/// One isolated virtual machine: an arena, its two stacks, a dictionary
/// and the host context `T` that native words may reach.
pub struct Engine<T: 'static> {
    id: usize,
    params: Params,
    pub(crate) memory: Memory,
    pub(crate) return_stack: Stack<Cell>,
    pub(crate) dict: Dictionary,
    natives: Vec<Native<T>>,
    pub(crate) input: SourceBuf,
    /// Index of the current source label in `debug`.
    file: usize,
    pub(crate) debug: DebugInfo,
    pub(crate) pc: i32,
    /// Set while the inner interpreter runs, cleared by a top-level `exit`.
    pub(crate) running: bool,
    /// Return stack depth at entry to the innermost inner interpreter run.
    frame_base: usize,
    /// Number of host entry points currently on the native call stack.
    nesting: usize,
    /// Set by `:` and cleared by `;`.
    pub(crate) open_def: Option<OpenDefinition>,
    pub host_ctxt: T,
}

/// Where the `:` definition being compiled started, so a failed
/// compilation can be undone.
#[derive(Copy, Clone)]
pub(crate) struct OpenDefinition {
    pub(crate) here: i32,
    pub(crate) dict_len: usize,
}

/// Program counter bookkeeping saved around nested runs of the inner
/// interpreter.
#[derive(Copy, Clone)]
struct ExecState {
    pc: i32,
    running: bool,
    frame_base: usize,
}

impl<T: 'static> Engine<T> {
    /// Creates an engine with default [`Params`].
    pub fn new(host_ctxt: T) -> Result<Self, Error> {
        Self::from_params(Params::default(), host_ctxt)
    }

    /// Creates an engine, installs the built-in words and loads the
    /// prelude.
    pub fn from_params(params: Params, host_ctxt: T) -> Result<Self, Error> {
        params.validate()?;
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let mut engine = Self {
            id,
            params,
            memory: Memory::new(params.memory_size),
            return_stack: Stack::new(),
            dict: Dictionary::new(),
            natives: Vec::new(),
            input: SourceBuf::default(),
            file: 0,
            debug: DebugInfo::new(),
            pc: 0,
            running: false,
            frame_base: 0,
            nesting: 0,
            open_def: None,
            host_ctxt,
        };
        engine.install_builtins();
        engine.interpret_source(PRELUDE, "stdlib")?;
        tracing::debug!(
            engine = id,
            memory_size = params.memory_size,
            here = engine.memory.here(),
            words = engine.dict.len(),
            "engine ready"
        );
        Ok(engine)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Compiles and executes a fragment of source text. `label` names the
    /// fragment in compile errors and stack crawls.
    ///
    /// A `:` definition left open at the end of `text` stays open, so a
    /// definition may span several fragments.
    pub fn interpret_source(&mut self, text: &str, label: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("interpret_source", engine = self.id, label);
        let _enter = span.enter();
        self.enter()?;

        let file = self.debug.start_file(label);
        let saved_file = mem::replace(&mut self.file, file);
        let saved_input = mem::replace(&mut self.input, SourceBuf::new(text));
        // Outer interpreter code runs outside of any compiled frame.
        let saved_exec = self.exec_state();
        self.running = false;

        let res = self.interpret_tokens();

        self.input = saved_input;
        self.file = saved_file;
        self.restore_exec_state(saved_exec);
        self.finish(res)
    }

    /// Runs the compiled code at `address` until it returns.
    ///
    /// A top-level call starts with an empty operand stack. Cells left on
    /// the stack afterwards are handled according to
    /// [`Params::stack_leak`].
    pub fn call_word(&mut self, address: i32) -> Result<(), Error> {
        let span = tracing::debug_span!("call_word", engine = self.id, address);
        let _enter = span.enter();

        if self.nesting == 0 {
            self.memory.clear_stack();
        }
        let entry_depth = self.memory.depth();
        self.enter()?;

        let res = self
            .exec(address)
            .and_then(|()| self.check_stack_leak(entry_depth));
        self.finish(res)
    }

    /// The address of a compiled word, or the value of a constant or data
    /// word. Native words have no address.
    pub fn lookup_word(&self, name: &str) -> Option<i32> {
        match self.dict.lookup(name)?.behavior {
            Behavior::Compiled(addr) | Behavior::Literal(addr) => Some(addr),
            Behavior::Native(_) => None,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.dict.lookup(name)
    }

    pub fn fetch_byte(&self, address: i32) -> Result<u8, Error> {
        Ok(self.memory.fetch_byte(address)?)
    }

    pub fn store_byte(&mut self, address: i32, value: i32) -> Result<(), Error> {
        Ok(self.memory.store_byte(address, value)?)
    }

    pub fn fetch_cell(&self, address: i32) -> Result<Cell, Error> {
        Ok(self.memory.fetch_cell(address)?)
    }

    pub fn store_cell(&mut self, address: i32, value: i32) -> Result<(), Error> {
        Ok(self.memory.store_cell(address, Cell::Data(value))?)
    }

    /// Reads `len` packed bytes, such as a string made by `s"`.
    pub fn read_bytes(&self, address: i32, len: i32) -> Result<Vec<u8>, Error> {
        (0..len.max(0))
            .map(|i| {
                let addr = address
                    .checked_add(i)
                    .ok_or(RuntimeError::FetchOutOfRange(i32::MAX))?;
                Ok(self.memory.fetch_byte(addr)?)
            })
            .collect()
    }

    /// Number of cells on the operand stack.
    pub fn depth(&self) -> usize {
        self.memory.depth()
    }

    pub fn push(&mut self, value: i32) -> Result<(), Error> {
        Ok(self.memory.push(Cell::Data(value))?)
    }

    pub fn pop(&mut self) -> Result<i32, Error> {
        Ok(self.memory.pop_i32()?)
    }

    pub fn here(&self) -> i32 {
        self.memory.here()
    }

    pub fn mode(&self) -> Mode {
        if self.memory.state() == 0 {
            Mode::Interpret
        } else {
            Mode::Compile
        }
    }

    /// Consumes the engine and returns the host context.
    pub fn release(self) -> T {
        self.host_ctxt
    }

    // -- outer interpreter --

    fn interpret_tokens(&mut self) -> Result<(), Error> {
        while let Some(token) = self.input.next_token() {
            self.interpret_token(&token)
                .map_err(|err| self.with_source_frame(err))?;
        }
        Ok(())
    }

    /// Gives a runtime error raised outside compiled code a crawl that
    /// points at the token being interpreted.
    fn with_source_frame(&self, err: Error) -> Error {
        match err {
            Error::Runtime { kind, crawl } if crawl.is_empty() => Error::Runtime {
                kind,
                crawl: StackCrawl::new(vec![self
                    .debug
                    .source_frame(self.file, self.input.line())]),
            },
            other => other,
        }
    }

    fn interpret_token(&mut self, token: &str) -> Result<(), Error> {
        let mode = self.mode();
        tracing::trace!(token, ?mode, line = self.input.line(), "interpret");

        let Some(entry) = self.dict.lookup(token) else {
            let value = self.parse_number(token)?;
            return match mode {
                Mode::Compile => self.emit_literal(Cell::Data(value)),
                Mode::Interpret => Ok(self.memory.push(Cell::Data(value))?),
            };
        };

        let (behavior, immediate) = (entry.behavior, entry.immediate);
        if mode == Mode::Compile && !immediate {
            return self.compile_behavior(behavior);
        }
        match behavior {
            Behavior::Native(id) => self.invoke_native(id),
            Behavior::Literal(value) => Ok(self.memory.push(Cell::Data(value))?),
            Behavior::Compiled(addr) => self.exec(addr),
        }
    }

    fn compile_behavior(&mut self, behavior: Behavior) -> Result<(), Error> {
        match behavior {
            Behavior::Native(id) => self.emit_code(Cell::Native(id)),
            Behavior::Literal(value) => self.emit_literal(Cell::Data(value)),
            Behavior::Compiled(addr) => self.emit_code(Cell::Call(addr)),
        }
    }

    /// Parses a token as a signed integer in the current `base`.
    fn parse_number(&self, token: &str) -> Result<i32, Error> {
        let base = self.memory.base();
        if !(2..=36).contains(&base) {
            return Err(self.compile_error(CompileError::InvalidBase(base)));
        }

        let (negative, digits) = match token.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, token),
        };
        let mut value: i32 = 0;
        for ch in digits.chars() {
            let digit = ch
                .to_digit(base as u32)
                .ok_or_else(|| self.compile_error(CompileError::UnknownWord(token.into())))?;
            value = value.wrapping_mul(base).wrapping_add(digit as i32);
        }
        Ok(if negative { value.wrapping_neg() } else { value })
    }

    // -- code emission --

    /// Writes one cell at `here` and advances it, recording the source
    /// line the cell came from.
    pub(crate) fn emit_code(&mut self, cell: Cell) -> Result<(), Error> {
        let here = self.memory.here();
        self.debug
            .add_line_mapping(here, self.file, self.input.line());
        match here.checked_add(CELL_SIZE) {
            Some(next) if here >= 0 && next <= self.memory.sp() => {
                self.memory.store_cell(here, cell)?;
                self.memory.set_here(next);
                Ok(())
            }
            _ => Err(RuntimeError::OutOfMemory.into()),
        }
    }

    pub(crate) fn emit_literal(&mut self, value: Cell) -> Result<(), Error> {
        self.emit_code(Cell::Native(builtins::LIT))?;
        self.emit_code(value)
    }

    // -- errors and bookkeeping --

    /// Tags a compile error with the current source label and line.
    pub(crate) fn compile_error(&self, kind: CompileError) -> Error {
        self.compile_error_at(kind, self.input.line())
    }

    pub(crate) fn compile_error_at(&self, kind: CompileError, line: u32) -> Error {
        Error::Compile {
            file: self.debug.file_name(self.file).to_owned(),
            line,
            kind,
        }
    }

    fn exec_state(&self) -> ExecState {
        ExecState {
            pc: self.pc,
            running: self.running,
            frame_base: self.frame_base,
        }
    }

    fn restore_exec_state(&mut self, state: ExecState) {
        self.pc = state.pc;
        self.running = state.running;
        self.frame_base = state.frame_base;
    }

    fn check_stack_leak(&mut self, entry_depth: usize) -> Result<(), Error> {
        let leaked = self.memory.depth().saturating_sub(entry_depth);
        if leaked == 0 {
            return Ok(());
        }
        match self.params.stack_leak {
            StackLeakPolicy::Ignore => Ok(()),
            StackLeakPolicy::Warn => {
                tracing::warn!(engine = self.id, cells = leaked, "stack leaked");
                Ok(())
            }
            StackLeakPolicy::Error => Err(RuntimeError::StackLeak(leaked).into()),
        }
    }

    fn enter(&mut self) -> Result<(), Error> {
        if self.nesting >= MAX_NESTING {
            return Err(RuntimeError::NestingTooDeep(MAX_NESTING).into());
        }
        self.nesting += 1;
        Ok(())
    }

    /// Leaves a host entry point. When the outermost one fails, the engine
    /// is reset to a usable state: both stacks are emptied and any open
    /// definition is abandoned. Finished words and data are kept.
    fn finish(&mut self, res: Result<(), Error>) -> Result<(), Error> {
        self.nesting -= 1;
        if res.is_err() && self.nesting == 0 {
            self.return_stack.clear();
            self.memory.clear_stack();
            self.abandon_definition();
            self.restore_exec_state(ExecState {
                pc: 0,
                running: false,
                frame_base: 0,
            });
        }
        res
    }

    /// Leaves compile mode. A half-compiled word is forgotten and its code
    /// space reclaimed, so its name goes back to any earlier binding.
    fn abandon_definition(&mut self) {
        self.memory.set_state(0);
        let Some(def) = self.open_def.take() else {
            return;
        };
        self.memory.set_here(def.here);
        self.dict.forget_from(def.dict_len);
        self.debug.forget_from(def.here);
        tracing::debug!(engine = self.id, address = def.here, "abandoned definition");
    }
}
