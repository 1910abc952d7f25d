//! The flat cell arena and the operand stack carved out of its top.
//!
//! Addresses are byte offsets. Cell accesses silently align down to a
//! cell boundary; byte accesses pick one byte out of the containing cell
//! (little-endian order) and never sign extend. Every access outside
//! `[0, size)` is an error, never undefined behavior.
//!
//! The three lowest cells hold engine state that guest code may read and
//! write like any other variable: `here`, `base` and `state`.

use crate::{word::Cell, RuntimeError};

/// Number of bytes in a cell.
pub const CELL_SIZE: i32 = 4;

/// Address of the next free compile address.
pub const HERE_PTR: i32 = 0;
/// Address of the current numeric radix.
pub const BASE_PTR: i32 = 4;
/// Address of the interpret (0) / compile (1) flag.
pub const STATE_PTR: i32 = 8;

/// First address available to compiled code.
pub const FIRST_FREE: i32 = 3 * CELL_SIZE;

pub struct Memory {
    cells: Vec<Cell>,
    size: i32,
    /// Address of the top operand stack item. Equal to `size` when the
    /// stack is empty.
    sp: i32,
}

impl Memory {
    /// Allocates a zeroed arena of `size` bytes. `size` must be a positive
    /// multiple of [`CELL_SIZE`].
    pub fn new(size: i32) -> Self {
        debug_assert!(size > FIRST_FREE && size % CELL_SIZE == 0);
        let mut mem = Self {
            cells: vec![Cell::ZERO; (size / CELL_SIZE) as usize],
            size,
            sp: size,
        };
        mem.cells[(HERE_PTR / CELL_SIZE) as usize] = Cell::Data(FIRST_FREE);
        mem.cells[(BASE_PTR / CELL_SIZE) as usize] = Cell::Data(10);
        mem
    }

    #[inline]
    pub fn size(&self) -> i32 {
        self.size
    }

    #[inline]
    fn index(&self, addr: i32) -> Option<usize> {
        if (0..self.size).contains(&addr) {
            Some((addr / CELL_SIZE) as usize)
        } else {
            None
        }
    }

    pub fn fetch_cell(&self, addr: i32) -> Result<Cell, RuntimeError> {
        let idx = self
            .index(addr)
            .ok_or(RuntimeError::FetchOutOfRange(addr))?;
        Ok(self.cells[idx])
    }

    pub fn store_cell(&mut self, addr: i32, value: Cell) -> Result<(), RuntimeError> {
        let idx = self
            .index(addr)
            .ok_or(RuntimeError::StoreOutOfRange(addr))?;
        self.cells[idx] = value;
        Ok(())
    }

    pub fn fetch_byte(&self, addr: i32) -> Result<u8, RuntimeError> {
        let cell = self.fetch_cell(addr)?;
        let shift = (addr % CELL_SIZE) * 8;
        Ok(((cell.bits() >> shift) & 0xff) as u8)
    }

    /// Stores the low 8 bits of `value`.
    pub fn store_byte(&mut self, addr: i32, value: i32) -> Result<(), RuntimeError> {
        let idx = self
            .index(addr)
            .ok_or(RuntimeError::StoreOutOfRange(addr))?;
        let shift = (addr % CELL_SIZE) * 8;
        let mut bits = self.cells[idx].bits();
        bits &= !(0xff << shift);
        bits |= (value & 0xff) << shift;
        self.cells[idx] = Cell::Data(bits);
        Ok(())
    }

    /// Reads a state cell that the engine itself maintains.
    #[inline]
    fn state_cell(&self, addr: i32) -> i32 {
        self.cells[(addr / CELL_SIZE) as usize].bits()
    }

    #[inline]
    pub fn here(&self) -> i32 {
        self.state_cell(HERE_PTR)
    }

    #[inline]
    pub fn set_here(&mut self, here: i32) {
        self.cells[(HERE_PTR / CELL_SIZE) as usize] = Cell::Data(here);
    }

    #[inline]
    pub fn base(&self) -> i32 {
        self.state_cell(BASE_PTR)
    }

    #[inline]
    pub fn state(&self) -> i32 {
        self.state_cell(STATE_PTR)
    }

    #[inline]
    pub fn set_state(&mut self, state: i32) {
        self.cells[(STATE_PTR / CELL_SIZE) as usize] = Cell::Data(state);
    }

    // -- operand stack --

    #[inline]
    pub fn sp(&self) -> i32 {
        self.sp
    }

    /// Number of cells on the operand stack.
    #[inline]
    pub fn depth(&self) -> usize {
        ((self.size - self.sp) / CELL_SIZE) as usize
    }

    pub fn push(&mut self, value: Cell) -> Result<(), RuntimeError> {
        let next_sp = self.sp - CELL_SIZE;
        if next_sp < self.here() {
            return Err(RuntimeError::StackOverflow);
        }
        self.store_cell(next_sp, value)?;
        self.sp = next_sp;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Cell, RuntimeError> {
        if self.sp >= self.size {
            return Err(RuntimeError::StackUnderflow);
        }
        let value = self.fetch_cell(self.sp)?;
        self.sp += CELL_SIZE;
        Ok(value)
    }

    #[inline]
    pub fn pop_i32(&mut self) -> Result<i32, RuntimeError> {
        self.pop()?.to_i32()
    }

    /// Reads the `n`th item below the top of the stack without popping.
    pub fn peek_back_n(&self, n: usize) -> Result<Cell, RuntimeError> {
        if n >= self.depth() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.fetch_cell(self.sp + (n as i32) * CELL_SIZE)
    }

    /// Discards `n` cells from the top of the stack.
    pub fn drop_n(&mut self, n: usize) -> Result<(), RuntimeError> {
        if n > self.depth() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.sp += (n as i32) * CELL_SIZE;
        Ok(())
    }

    #[inline]
    pub fn clear_stack(&mut self) {
        self.sp = self.size;
    }
}
