//! Contexts: a directory plus the spells declared there.
//!
//! The engine keeps a single "current" context. Pushing a context saves the
//! previous one together with the process working directory and chdirs into
//! the context's directory; popping restores both. The pair brackets exactly
//! two operations, loading a description file and invoking a spell, and the
//! pop runs on every exit path including errors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::spell::SpellId;

/// Index of a context in the engine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A directory and its local spell namespace.
#[derive(Debug, Default)]
pub struct Context {
    dir: PathBuf,
    spells_by_name: HashMap<String, Vec<SpellId>>,
    default_spells: Vec<SpellId>,
}

impl Context {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Context {
            dir,
            spells_by_name: HashMap::new(),
            default_spells: Vec::new(),
        }
    }

    /// The absolute directory this context describes.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Spells registered under `name`, in insertion order.
    pub fn spells_named(&self, name: &str) -> &[SpellId] {
        self.spells_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The unnamed spells, in insertion order.
    pub fn default_spells(&self) -> &[SpellId] {
        &self.default_spells
    }

    pub(crate) fn add_named(&mut self, name: String, spell: SpellId) {
        self.spells_by_name.entry(name).or_default().push(spell);
    }

    pub(crate) fn add_default(&mut self, spell: SpellId) {
        self.default_spells.push(spell);
    }
}

/// Saved state for one push; handed back to `pop_context`.
#[derive(Debug)]
pub(crate) struct ContextFrame {
    pub(crate) prev: Option<ContextId>,
    pub(crate) prev_cwd: PathBuf,
    pub(crate) switched: bool,
}

impl ContextFrame {
    pub(crate) fn noop() -> Self {
        ContextFrame {
            prev: None,
            prev_cwd: PathBuf::new(),
            switched: false,
        }
    }
}
