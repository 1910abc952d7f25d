use serde::{Deserialize, Serialize};

use crate::{memory::CELL_SIZE, Error};

/// Configuration of one [`Engine`](crate::Engine).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Params {
    /// Size of the arena in bytes. The operand stack lives at its top.
    #[serde(default = "Params::default_memory_size")]
    pub memory_size: i32,
    /// Dispatch budget of a single top-level invocation of the inner
    /// interpreter.
    #[serde(default = "Params::default_max_cycles")]
    pub max_cycles: u32,
    /// What `call_word` does when a word leaves cells on the stack.
    #[serde(default)]
    pub stack_leak: StackLeakPolicy,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackLeakPolicy {
    Ignore,
    #[default]
    Warn,
    Error,
}

impl Params {
    pub const DEFAULT_MEMORY_SIZE: i32 = 16384;
    pub const MIN_MEMORY_SIZE: i32 = 4096;
    pub const DEFAULT_MAX_CYCLES: u32 = 100_000;

    const fn default_memory_size() -> i32 {
        Self::DEFAULT_MEMORY_SIZE
    }
    const fn default_max_cycles() -> u32 {
        Self::DEFAULT_MAX_CYCLES
    }

    pub const fn new() -> Self {
        Self {
            memory_size: Self::DEFAULT_MEMORY_SIZE,
            max_cycles: Self::DEFAULT_MAX_CYCLES,
            stack_leak: StackLeakPolicy::Warn,
        }
    }

    pub const fn with_memory_size(self, memory_size: i32) -> Self {
        Self {
            memory_size,
            ..self
        }
    }

    pub const fn with_max_cycles(self, max_cycles: u32) -> Self {
        Self { max_cycles, ..self }
    }

    pub const fn with_stack_leak(self, stack_leak: StackLeakPolicy) -> Self {
        Self { stack_leak, ..self }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.memory_size < Self::MIN_MEMORY_SIZE {
            return Err(Error::InvalidParams("memory_size must be at least 4096"));
        }
        if self.memory_size % CELL_SIZE != 0 {
            return Err(Error::InvalidParams(
                "memory_size must be a multiple of the cell size",
            ));
        }
        if self.max_cycles == 0 {
            return Err(Error::InvalidParams("max_cycles must be non-zero"));
        }
        Ok(())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}
