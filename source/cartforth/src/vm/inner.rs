//! The inner interpreter.
//!
//! Compiled code is a run of cells. Each dispatch reads the cell at the
//! program counter and advances past it: a native reference is invoked in
//! place, any other non-zero cell is a call into another compiled body.
//! The threading ops that read inline operands (`lit`, `branch`, `0branch`,
//! `'`) move the program counter themselves.

use super::{Engine, ExecState};
use crate::{
    debug::StackCrawl,
    memory::CELL_SIZE,
    word::Cell,
    Error, RuntimeError,
};

impl<T: 'static> Engine<T> {
    /// Runs the compiled code at `start` until its outermost `exit`.
    ///
    /// The program counter bookkeeping of any run this one is nested in
    /// (a compiled immediate word, or a host native calling back into the
    /// engine) is restored afterwards, whether or not the run succeeds.
    pub(crate) fn exec(&mut self, start: i32) -> Result<(), Error> {
        let saved = self.exec_state();
        self.restore_exec_state(ExecState {
            pc: start,
            running: true,
            frame_base: self.return_stack.depth(),
        });

        let res = self.run();

        self.restore_exec_state(saved);
        res
    }

    fn run(&mut self) -> Result<(), Error> {
        let mut cycles: u32 = 0;
        while self.running {
            if cycles >= self.params.max_cycles {
                return Err(self.with_crawl(RuntimeError::ExceededMaxCycles.into()));
            }
            cycles += 1;

            if let Err(err) = self.step() {
                return Err(self.with_crawl(err));
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), Error> {
        let pc = self.pc;
        if !(0..self.memory.size()).contains(&pc) {
            return Err(RuntimeError::PcOutOfRange(pc).into());
        }
        let op = self.memory.fetch_cell(pc)?;
        self.pc = pc + CELL_SIZE;

        match op {
            Cell::Native(id) => self.invoke_native(id),
            // Never-written memory or an unpatched branch placeholder.
            Cell::Data(0) | Cell::Call(0) => Err(RuntimeError::InvalidBranchToZero.into()),
            Cell::Data(addr) | Cell::Call(addr) => {
                self.return_stack.push(Cell::Call(self.pc));
                self.pc = addr;
                Ok(())
            }
        }
    }

    /// Reads the inline operand following the current op and skips it.
    pub(crate) fn take_operand(&mut self) -> Result<Cell, Error> {
        let operand = self.memory.fetch_cell(self.pc)?;
        self.pc += CELL_SIZE;
        Ok(operand)
    }

    pub(crate) fn jump(&mut self, target: i32) -> Result<(), Error> {
        if target == 0 {
            return Err(RuntimeError::InvalidBranchToZero.into());
        }
        self.pc = target;
        Ok(())
    }

    /// Returns from the current compiled word, or halts the run when the
    /// word was the one the run started with.
    pub(crate) fn exit_word(&mut self) -> Result<(), Error> {
        if self.return_stack.depth() > self.frame_base {
            let ret = self.return_stack.try_pop().map_err(RuntimeError::from)?;
            self.pc = ret.to_i32()?;
        } else {
            self.running = false;
        }
        Ok(())
    }

    /// Attaches the current call chain to a runtime error that doesn't
    /// carry one yet. Errors from nested runs keep their own crawl.
    fn with_crawl(&self, err: Error) -> Error {
        match err {
            Error::Runtime { kind, crawl } if crawl.is_empty() => Error::Runtime {
                kind,
                crawl: self.stack_crawl(),
            },
            other => other,
        }
    }

    /// Walks from the executing cell out through the return stack.
    pub(crate) fn stack_crawl(&self) -> StackCrawl {
        // Return addresses point just past the call that pushed them.
        let current = core::iter::once(self.pc.wrapping_sub(CELL_SIZE));
        let callers = self
            .return_stack
            .iter_from_top()
            .map(|cell| cell.bits().wrapping_sub(CELL_SIZE));
        StackCrawl::new(
            current
                .chain(callers)
                .map(|addr| self.debug.frame(addr))
                .collect(),
        )
    }
}
