//! The description-loader seam.
//!
//! The engine does not know how description files are written; it only
//! requires that a loader can turn a directory into spell and stage
//! registrations against the currently pushed context. Loading a directory
//! may construct further contexts (deferral does exactly that), which
//! re-enters the loader while the outer load is still on the stack, so the
//! trait takes `&self` and the engine holds the loader behind an `Rc`.

use std::path::Path;

use crate::engine::Engine;
use crate::error::EngineError;

/// Evaluates the description for a directory, registering spells and stages
/// in the currently pushed context.
pub trait Loader {
    fn load(&self, engine: &mut Engine, dir: &Path) -> Result<(), EngineError>;
}

impl<F> Loader for F
where
    F: Fn(&mut Engine, &Path) -> Result<(), EngineError>,
{
    fn load(&self, engine: &mut Engine, dir: &Path) -> Result<(), EngineError> {
        self(engine, dir)
    }
}
