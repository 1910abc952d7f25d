use core::fmt;

use crate::RuntimeError;

/// Index of a native word in the engine's native table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NativeId(pub(crate) u32);

/// A single cell of the arena or of the return stack.
///
/// Plain numbers, call targets and native references share the same
/// storage, so the tag travels with the value: `' 0branch ,` copies a
/// native reference through the operand stack into compiled code without
/// it ever being mistaken for an integer.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Cell {
    /// A plain signed integer.
    Data(i32),
    /// The start address of a compiled word body.
    Call(i32),
    /// A native word, invoked in place by the inner interpreter.
    Native(NativeId),
}

impl Cell {
    /// A cell that has never been written. Also used as the placeholder
    /// for branch targets that have not been patched yet.
    pub const ZERO: Cell = Cell::Data(0);

    /// Boolean truth as the language represents it.
    #[inline]
    pub fn flag(b: bool) -> Self {
        Cell::Data(if b { -1 } else { 0 })
    }

    /// Returns the numeric value of this cell.
    ///
    /// Call targets are plain addresses and convert; native references
    /// have no numeric value.
    #[inline]
    pub fn to_i32(self) -> Result<i32, RuntimeError> {
        match self {
            Cell::Data(v) | Cell::Call(v) => Ok(v),
            Cell::Native(_) => Err(RuntimeError::NotANumber),
        }
    }

    /// The raw bits used for byte-granular access. Native references read
    /// as zero.
    #[inline]
    pub(crate) fn bits(self) -> i32 {
        match self {
            Cell::Data(v) | Cell::Call(v) => v,
            Cell::Native(_) => 0,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::ZERO
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Data(v)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Data(v) => write!(f, "{v}"),
            Cell::Call(a) => write!(f, "call@{a}"),
            Cell::Native(NativeId(id)) => write!(f, "native#{id}"),
        }
    }
}
