//! The top-level entry point for one run.

use std::env;
use std::path::Path;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::paths::absolutize;

/// Bootstrap the root context at `top_dir`, then resolve and invoke
/// `targets` against the context registered for `current_dir`.
///
/// With no targets named, the current context's default spells are invoked
/// in insertion order. Returns the process exit code (0 on success); any
/// error propagating out of here terminates the run.
pub fn execute(
    engine: &mut Engine,
    top_dir: &Path,
    current_dir: &Path,
    targets: &[String],
) -> Result<i32, EngineError> {
    if engine.current_context().is_some() {
        return Err(EngineError::Usage(
            "execute requires no current context".to_string(),
        ));
    }

    let cwd = env::current_dir()?;
    let top_dir = absolutize(top_dir, &cwd);
    let current_dir = absolutize(current_dir, &cwd);

    engine.create_context(Some(&top_dir))?;

    let ctx = engine
        .context_for(&current_dir)
        .ok_or(EngineError::NoContext(current_dir))?;

    let mut spells = Vec::new();
    if targets.is_empty() {
        spells.extend(engine.fetch_spells(ctx, None));
    } else {
        for target in targets {
            let resolved = engine.fetch_spells(ctx, Some(target));
            if resolved.is_empty() {
                return Err(EngineError::NoTarget(target.clone()));
            }
            spells.extend(resolved);
        }
    }

    for spell in spells {
        engine.invoke(spell)?;
    }
    Ok(0)
}
