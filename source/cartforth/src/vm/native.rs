//! Native words: the built-in ones, and the fixed-arity callbacks a host
//! registers to give guest code access to drawing, sound and input.

use std::rc::Rc;

use super::Engine;
use crate::{
    dictionary::Behavior,
    word::{Cell, NativeId},
    Error, RuntimeError, WordFunc,
};

/// A host callback.
///
/// It receives the engine (so it can reach `host_ctxt`, read guest memory
/// or call back into guest code) and its arguments in the order they were
/// pushed. The returned values are pushed in order.
///
/// A callback may be running several times at once when guest code it
/// calls back into uses the same word again, so it only gets shared
/// access to itself. Its state belongs in `host_ctxt`, or behind a
/// `Cell`/`RefCell`.
pub type HostFunc<T> = Rc<dyn Fn(&mut Engine<T>, &[i32]) -> Result<Vec<i32>, Error>>;

pub(crate) struct Native<T: 'static> {
    name: String,
    func: NativeFunc<T>,
}

enum NativeFunc<T: 'static> {
    Builtin(WordFunc<T>),
    Host { arity: usize, func: HostFunc<T> },
}

impl<T: 'static> Engine<T> {
    pub(crate) fn add_builtin(
        &mut self,
        name: &'static str,
        func: WordFunc<T>,
        immediate: bool,
    ) -> NativeId {
        let id = self.push_native(name, NativeFunc::Builtin(func));
        self.dict.define(name, Behavior::Native(id), immediate);
        id
    }

    /// Makes `func` callable from guest code as `name`.
    ///
    /// When the word runs, `arity` cells are popped and passed to `func`
    /// in push order, so for `17 42 foo` the callback sees `[17, 42]`.
    /// A later registration of the same name shadows this one.
    pub fn register_native<F>(&mut self, name: &str, arity: usize, func: F) -> NativeId
    where
        F: Fn(&mut Engine<T>, &[i32]) -> Result<Vec<i32>, Error> + 'static,
    {
        let id = self.push_native(
            name,
            NativeFunc::Host {
                arity,
                func: Rc::new(func),
            },
        );
        self.dict.define(name, Behavior::Native(id), false);
        tracing::trace!(engine = self.id, name, arity, id = id.0, "registered native");
        id
    }

    fn push_native(&mut self, name: &str, func: NativeFunc<T>) -> NativeId {
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(Native {
            name: name.to_owned(),
            func,
        });
        id
    }

    pub(crate) fn invoke_native(&mut self, id: NativeId) -> Result<(), Error> {
        let Some(native) = self.natives.get(id.0 as usize) else {
            return Err(RuntimeError::Host(format!("no native word #{}", id.0)).into());
        };
        match &native.func {
            NativeFunc::Builtin(func) => {
                let func = *func;
                func(self)
            }
            NativeFunc::Host { arity, func } => {
                tracing::trace!(engine = self.id, native = %native.name, arity, "host call");
                let (arity, func) = (*arity, func.clone());
                self.call_host(arity, &func)
            }
        }
    }

    fn call_host(&mut self, arity: usize, func: &HostFunc<T>) -> Result<(), Error> {
        if self.memory.depth() < arity {
            return Err(RuntimeError::StackUnderflow.into());
        }
        // The deepest argument was pushed first.
        let args = (0..arity)
            .rev()
            .map(|n| self.memory.peek_back_n(n)?.to_i32())
            .collect::<Result<Vec<i32>, RuntimeError>>()?;
        self.memory.drop_n(arity)?;

        for value in func(self, &args)? {
            self.memory.push(Cell::Data(value))?;
        }
        Ok(())
    }
}
