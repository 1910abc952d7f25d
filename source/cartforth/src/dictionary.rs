use crate::{
    name::{LenHash, Name},
    word::NativeId,
};

/// What a dictionary word does when it is interpreted or compiled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// A native word. Compiles to a reference the inner interpreter calls
    /// in place.
    Native(NativeId),
    /// A compiled body starting at this address. Compiles to a call.
    Compiled(i32),
    /// An inline value (constants, and the data addresses of `create`d
    /// words). Compiles to `lit <value>`.
    Literal(i32),
}

#[derive(Clone, Debug)]
pub struct Entry {
    pub name: Name,
    pub behavior: Behavior,
    /// Run at compile time instead of being compiled.
    pub immediate: bool,
}

/// Index of an entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct EntryId(usize);

/// The name to behavior bindings of one engine.
///
/// Like a classic linked forth dictionary, lookups walk from the newest
/// entry to the oldest, so a redefinition shadows every earlier binding
/// of the same name without removing it.
#[derive(Default)]
pub struct Dictionary {
    entries: Vec<Entry>,
    /// The entry `immediate` applies to: the newest word started with
    /// `create` or `:`.
    latest: Option<EntryId>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, shadowing any earlier binding of `name`.
    pub fn define(&mut self, name: &str, behavior: Behavior, immediate: bool) {
        self.entries.push(Entry {
            name: Name::new(name),
            behavior,
            immediate,
        });
    }

    /// Like [`Dictionary::define`], and makes the new entry the target of
    /// [`Dictionary::mark_immediate_on_last_defined`].
    pub fn start_word(&mut self, name: &str, behavior: Behavior) {
        self.latest = Some(EntryId(self.entries.len()));
        self.define(name, behavior, false);
    }

    /// Flags the newest word started with `create` or `:` as immediate.
    /// Returns `false` if no such word exists yet.
    pub fn mark_immediate_on_last_defined(&mut self) -> bool {
        match self.latest {
            Some(EntryId(idx)) => {
                self.entries[idx].immediate = true;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        let hash = LenHash::from_str(name);
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.name.matches(name, hash))
    }

    /// Number of entries, shadowed ones included. A mark for
    /// [`Dictionary::forget_from`].
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry added since the dictionary had `len` entries,
    /// uncovering whatever they shadowed.
    pub fn forget_from(&mut self, len: usize) {
        self.entries.truncate(len);
        if matches!(self.latest, Some(EntryId(idx)) if idx >= len) {
            self.latest = None;
        }
    }
}
