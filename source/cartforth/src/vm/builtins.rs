use std::time::{SystemTime, UNIX_EPOCH};

use super::{Engine, OpenDefinition};
use crate::{
    dictionary::Behavior,
    memory::CELL_SIZE,
    word::{Cell, NativeId},
    CompileError, Error, Mode, RuntimeError, WordFunc,
};

pub(super) struct Builtin<T: 'static> {
    name: &'static str,
    func: WordFunc<T>,
    immediate: bool,
}

// NOTE: This macro exists because we can't have const constructors that include
// "mut" items, which unfortunately covers things like `fn(&mut T)`. Use a macro
// until this is resolved.
macro_rules! builtin {
    ($name:literal, $func:expr) => {
        Builtin {
            name: $name,
            func: $func,
            immediate: false,
        }
    };
    ($name:literal, $func:expr, immediate) => {
        Builtin {
            name: $name,
            func: $func,
            immediate: true,
        }
    };
}

// The compiler emits these directly, so they take the first ids.
pub(super) const LIT: NativeId = NativeId(0);
pub(super) const BRANCH: NativeId = NativeId(1);
pub(super) const EXIT: NativeId = NativeId(3);

impl<T: 'static> Engine<T> {
    pub(super) const BUILTINS: &'static [Builtin<T>] = &[
        // Threading ops. Order matters, see `LIT` and friends.
        builtin!("lit", Self::lit),
        builtin!("branch", Self::branch),
        builtin!("0branch", Self::zero_branch),
        builtin!("exit", Self::exit),
        // Dictionary and compiler
        builtin!("create", Self::create),
        builtin!("constant", Self::constant, immediate),
        builtin!(":", Self::colon, immediate),
        builtin!(";", Self::semicolon, immediate),
        builtin!("immediate", Self::immediate, immediate),
        builtin!(",", Self::comma),
        builtin!("'", Self::tick),
        builtin!("key", Self::key),
        builtin!("s\"", Self::string_literal, immediate),
        builtin!("char", Self::char_literal, immediate),
        // Stack
        builtin!("dup", Self::dup),
        builtin!("drop", Self::drop),
        builtin!("swap", Self::swap),
        builtin!("over", Self::over),
        builtin!("rot", Self::rot),
        builtin!("-rot", Self::reverse_rot),
        builtin!(">r", Self::data_to_return_stack),
        builtin!("r>", Self::return_to_data_stack),
        builtin!("dsp@", Self::dsp),
        // Arithmetic and logic
        builtin!("+", Self::add),
        builtin!("-", Self::sub),
        builtin!("*", Self::mul),
        builtin!("/", Self::div),
        builtin!("mod", Self::modu),
        builtin!("or", Self::or),
        builtin!("and", Self::and),
        builtin!("xor", Self::xor),
        builtin!("lshift", Self::lshift),
        builtin!("rshift", Self::rshift),
        builtin!("=", Self::equal),
        builtin!("<", Self::less),
        builtin!("abs", Self::abs),
        // Memory
        builtin!("@", Self::fetch),
        builtin!("!", Self::store),
        builtin!("c@", Self::fetch_char),
        builtin!("c!", Self::store_char),
        // Host
        builtin!("_get_time", Self::get_time),
    ];

    pub(super) fn install_builtins(&mut self) {
        for bi in Self::BUILTINS {
            self.add_builtin(bi.name, bi.func, bi.immediate);
        }
    }

    /// Fails unless the inner interpreter is running, for the words that
    /// read their operand from the compiled code stream.
    fn compiled_only(&self, name: &'static str) -> Result<(), Error> {
        if self.running {
            Ok(())
        } else {
            Err(self.compile_error(CompileError::CompileOnly(name)))
        }
    }

    fn read_word_name(&mut self) -> Result<String, Error> {
        match self.input.next_token() {
            Some(name) => Ok(name),
            None => Err(self.compile_error(CompileError::MissingWordName)),
        }
    }

    fn push_data(&mut self, value: i32) -> Result<(), Error> {
        Ok(self.memory.push(Cell::Data(value))?)
    }

    /// Pops `b`, then `a`, and pushes `f(a, b)`.
    fn binary_op(
        &mut self,
        f: impl FnOnce(i32, i32) -> Result<i32, RuntimeError>,
    ) -> Result<(), Error> {
        let b = self.memory.pop_i32()?;
        let a = self.memory.pop_i32()?;
        self.push_data(f(a, b)?)
    }

    // -- threading --

    fn lit(&mut self) -> Result<(), Error> {
        self.compiled_only("lit")?;
        let value = self.take_operand()?;
        Ok(self.memory.push(value)?)
    }

    fn branch(&mut self) -> Result<(), Error> {
        self.compiled_only("branch")?;
        let target = self.memory.fetch_cell(self.pc)?.to_i32()?;
        self.jump(target)
    }

    fn zero_branch(&mut self) -> Result<(), Error> {
        self.compiled_only("0branch")?;
        let take_branch = match self.memory.pop()? {
            Cell::Native(_) => false,
            cell => cell.bits() == 0,
        };
        if take_branch {
            let target = self.memory.fetch_cell(self.pc)?.to_i32()?;
            self.jump(target)
        } else {
            self.pc += CELL_SIZE;
            Ok(())
        }
    }

    fn exit(&mut self) -> Result<(), Error> {
        self.compiled_only("exit")?;
        self.exit_word()
    }

    // -- dictionary and compiler --

    /// Defines the next token as a data word pushing the current `here`.
    fn create(&mut self) -> Result<(), Error> {
        if self.mode() == Mode::Compile {
            return Err(self.compile_error(CompileError::CreateInsideColon));
        }
        let name = self.read_word_name()?;
        let here = self.memory.here();
        self.dict.start_word(&name, Behavior::Literal(here));
        self.debug.start_word(&name, here);
        tracing::debug!(%name, address = here, "create");
        Ok(())
    }

    fn constant(&mut self) -> Result<(), Error> {
        if self.mode() == Mode::Compile {
            return Err(self.compile_error(CompileError::ConstantInsideColon));
        }
        let name = self.read_word_name()?;
        let value = self.memory.pop_i32()?;
        self.dict.define(&name, Behavior::Literal(value), false);
        tracing::debug!(%name, value, "constant");
        Ok(())
    }

    fn colon(&mut self) -> Result<(), Error> {
        if self.mode() == Mode::Compile {
            return Err(self.compile_error(CompileError::NestedColon));
        }
        let name = self.read_word_name()?;
        let here = self.memory.here();
        self.open_def = Some(OpenDefinition {
            here,
            dict_len: self.dict.len(),
        });
        self.dict.start_word(&name, Behavior::Compiled(here));
        self.debug.start_word(&name, here);
        self.memory.set_state(1);
        tracing::debug!(%name, address = here, "define");
        Ok(())
    }

    fn semicolon(&mut self) -> Result<(), Error> {
        if self.mode() != Mode::Compile {
            return Err(self.compile_error(CompileError::UnmatchedSemicolon));
        }
        self.emit_code(Cell::Native(EXIT))?;
        self.memory.set_state(0);
        self.open_def = None;
        self.debug.end_word(self.memory.here());
        Ok(())
    }

    fn immediate(&mut self) -> Result<(), Error> {
        self.dict.mark_immediate_on_last_defined();
        Ok(())
    }

    fn comma(&mut self) -> Result<(), Error> {
        let value = self.memory.pop()?;
        self.emit_code(value)
    }

    /// Pushes the cell following the tick in compiled code, which is how
    /// immediate words get hold of `0branch` and friends.
    fn tick(&mut self) -> Result<(), Error> {
        self.compiled_only("'")?;
        let value = self.take_operand()?;
        Ok(self.memory.push(value)?)
    }

    /// Pushes the next source character, or -1 at the end of input.
    fn key(&mut self) -> Result<(), Error> {
        let ch = self.input.read_char().map_or(-1, |ch| ch as i32);
        self.push_data(ch)
    }

    /// `s" text"`: stores the text inline, behind a branch that skips it,
    /// and pushes (or compiles) its address and byte length.
    fn string_literal(&mut self) -> Result<(), Error> {
        let start_line = self.input.line();
        let start = self.memory.here();
        let data = start
            .checked_add(2 * CELL_SIZE)
            .filter(|&data| start >= 0 && data <= self.memory.sp())
            .ok_or(RuntimeError::OutOfMemory)?;

        // The tokenizer left the delimiter after `s"` in the input.
        self.input.read_char();

        let mut end = data;
        loop {
            let ch = match self.input.read_char() {
                Some('"') => break,
                Some(ch) => ch,
                None => {
                    return Err(self.compile_error_at(CompileError::UnterminatedQuote, start_line))
                }
            };
            let mut buf = [0; 4];
            for &byte in ch.encode_utf8(&mut buf).as_bytes() {
                if end >= self.memory.sp() {
                    return Err(RuntimeError::OutOfMemory.into());
                }
                self.memory.store_byte(end, byte.into())?;
                end += 1;
            }
        }

        let len = end - data;
        let aligned = (end + CELL_SIZE - 1) & !(CELL_SIZE - 1);
        self.memory.store_cell(start, Cell::Native(BRANCH))?;
        self.memory.store_cell(start + CELL_SIZE, Cell::Data(aligned))?;
        self.memory.set_here(aligned);

        match self.mode() {
            Mode::Compile => {
                self.emit_literal(Cell::Data(data))?;
                self.emit_literal(Cell::Data(len))
            }
            Mode::Interpret => {
                self.push_data(data)?;
                self.push_data(len)
            }
        }
    }

    /// `char x`: the code of the first character of the next token.
    fn char_literal(&mut self) -> Result<(), Error> {
        let token = self.read_word_name()?;
        let code = token.chars().next().map_or(0, |ch| ch as i32);
        match self.mode() {
            Mode::Compile => self.emit_literal(Cell::Data(code)),
            Mode::Interpret => self.push_data(code),
        }
    }

    // -- stack --

    fn dup(&mut self) -> Result<(), Error> {
        let value = self.memory.peek_back_n(0)?;
        Ok(self.memory.push(value)?)
    }

    fn drop(&mut self) -> Result<(), Error> {
        self.memory.pop()?;
        Ok(())
    }

    fn swap(&mut self) -> Result<(), Error> {
        let a = self.memory.pop()?;
        let b = self.memory.pop()?;
        self.memory.push(a)?;
        Ok(self.memory.push(b)?)
    }

    fn over(&mut self) -> Result<(), Error> {
        let value = self.memory.peek_back_n(1)?;
        Ok(self.memory.push(value)?)
    }

    /// ( a b c -- b c a )
    fn rot(&mut self) -> Result<(), Error> {
        let c = self.memory.pop()?;
        let b = self.memory.pop()?;
        let a = self.memory.pop()?;
        self.memory.push(b)?;
        self.memory.push(c)?;
        Ok(self.memory.push(a)?)
    }

    /// ( a b c -- c a b )
    fn reverse_rot(&mut self) -> Result<(), Error> {
        let c = self.memory.pop()?;
        let b = self.memory.pop()?;
        let a = self.memory.pop()?;
        self.memory.push(c)?;
        self.memory.push(a)?;
        Ok(self.memory.push(b)?)
    }

    fn data_to_return_stack(&mut self) -> Result<(), Error> {
        let value = self.memory.pop()?;
        self.return_stack.push(value);
        Ok(())
    }

    fn return_to_data_stack(&mut self) -> Result<(), Error> {
        let value = self.return_stack.try_pop().map_err(RuntimeError::from)?;
        Ok(self.memory.push(value)?)
    }

    /// Pushes the address of the top of the stack, before the push.
    fn dsp(&mut self) -> Result<(), Error> {
        let sp = self.memory.sp();
        self.push_data(sp)
    }

    // -- arithmetic --

    fn add(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_add(b)))
    }

    fn sub(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_sub(b)))
    }

    fn mul(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_mul(b)))
    }

    /// Truncates toward zero.
    fn div(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| match b {
            0 => Err(RuntimeError::DivideByZero),
            b => Ok(a.wrapping_div(b)),
        })
    }

    /// Takes the sign of the dividend.
    fn modu(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| match b {
            0 => Err(RuntimeError::DivideByZero),
            b => Ok(a.wrapping_rem(b)),
        })
    }

    fn or(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a | b))
    }

    fn and(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a & b))
    }

    fn xor(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a ^ b))
    }

    fn lshift(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_shl(b as u32)))
    }

    /// Arithmetic shift.
    fn rshift(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_shr(b as u32)))
    }

    fn equal(&mut self) -> Result<(), Error> {
        let b = self.memory.pop()?;
        let a = self.memory.pop()?;
        let eq = match (a, b) {
            (Cell::Native(a), Cell::Native(b)) => a == b,
            (Cell::Native(_), _) | (_, Cell::Native(_)) => false,
            (a, b) => a.bits() == b.bits(),
        };
        Ok(self.memory.push(Cell::flag(eq))?)
    }

    fn less(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(if a < b { -1 } else { 0 }))
    }

    fn abs(&mut self) -> Result<(), Error> {
        let value = self.memory.pop_i32()?;
        self.push_data(value.wrapping_abs())
    }

    // -- memory --

    fn fetch(&mut self) -> Result<(), Error> {
        let addr = self.memory.pop_i32()?;
        let value = self.memory.fetch_cell(addr)?;
        Ok(self.memory.push(value)?)
    }

    fn store(&mut self) -> Result<(), Error> {
        let addr = self.memory.pop_i32()?;
        let value = self.memory.pop()?;
        Ok(self.memory.store_cell(addr, value)?)
    }

    fn fetch_char(&mut self) -> Result<(), Error> {
        let addr = self.memory.pop_i32()?;
        let value = self.memory.fetch_byte(addr)?;
        self.push_data(value.into())
    }

    fn store_char(&mut self) -> Result<(), Error> {
        let addr = self.memory.pop_i32()?;
        let value = self.memory.pop_i32()?;
        Ok(self.memory.store_byte(addr, value)?)
    }

    // -- host --

    /// Milliseconds since the Unix epoch, truncated to a cell.
    fn get_time(&mut self) -> Result<(), Error> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i32);
        self.push_data(millis)
    }
}
