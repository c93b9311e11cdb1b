//! Deferral: a spell whose work is to invoke named spells from other
//! directories' contexts.

use std::env;
use std::path::PathBuf;

use crate::engine::Engine;
use crate::error::{EngineError, LoadError};
use crate::paths::absolutize;
use crate::spell::{Factor, SpellId, SpellSpec};

/// Arguments for [`Engine::defer`].
#[derive(Debug, Default)]
pub struct DeferSpec {
    /// Directories whose contexts supply the deferred spells.
    pub directories: Vec<PathBuf>,
    /// Names to fetch from each directory's context; empty means the
    /// context's default spells.
    pub targets: Vec<String>,
    /// Downgrade missing directories from fatal to warn-and-skip.
    pub if_present: bool,
    /// Optional name for the deferral spell itself.
    pub name: Option<String>,
    /// Whether the deferral joins its context's default list.
    pub default: bool,
}

impl Engine {
    /// Build a spell that defers to the named (or default) spells of one or
    /// more sibling directories.
    ///
    /// Each directory is canonicalized against the current working
    /// directory; a directory with no registered context gets one
    /// constructed, which loads its description.
    pub fn defer(&mut self, spec: DeferSpec) -> Result<SpellId, EngineError> {
        let cwd = env::current_dir()?;
        let mut factors = Vec::new();

        for dir in &spec.directories {
            let dir = absolutize(dir, &cwd);
            if !dir.is_dir() {
                if spec.if_present {
                    self.cast_warning(&format!("skipping missing directory {}", dir.display()));
                    continue;
                }
                return Err(LoadError::MissingDirectory { dir }.into());
            }

            let ctx = self.ensure_context(&dir)?;
            if spec.targets.is_empty() {
                factors.extend(
                    self.fetch_spells(ctx, None)
                        .into_iter()
                        .map(Factor::Spell),
                );
            } else {
                for target in &spec.targets {
                    let resolved = self.fetch_spells(ctx, Some(target));
                    if resolved.is_empty() {
                        return Err(EngineError::NoTarget(target.clone()));
                    }
                    factors.extend(resolved.into_iter().map(Factor::Spell));
                }
            }
        }

        let mut cast = SpellSpec::new();
        cast.factors = factors;
        cast.name = spec.name;
        cast.default = spec.default;
        self.cast_spell(cast)
    }
}
