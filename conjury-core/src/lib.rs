//! Conjury build engine.
//!
//! A hierarchical, signature-driven software construction engine. Build
//! descriptions scattered across a source tree register *spells*: tasks
//! with an action, an ordered list of *factors* (dependencies), and the
//! *products* they claim. Invoking a spell recursively invokes its factors,
//! folds their signatures (or source-file mtimes) into the spell's
//! *profile*, hashes the profile into a *signature*, and runs the action
//! only when the persisted *journal* or the filesystem disagrees.
//!
//! # Architecture
//!
//! ```text
//! driver::execute
//!   └─ Engine (arenas + registries + options)
//!        ├─ Context  (directory + name tables, push/pop discipline)
//!        ├─ Stage    (directory + Journal)
//!        ├─ Spell    (factors, products, profile, action)
//!        └─ Journal  (append-only product→signature log)
//! ```
//!
//! The engine is single-threaded and synchronous; the only blocking points
//! are filesystem syscalls, the external [`Executor`], and the external
//! [`Loader`]. Both collaborators are trait objects owned by the [`Engine`],
//! so a test can drive whole runs with closures and a temp directory.

pub mod context;
pub mod copy;
pub mod defer;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod journal;
pub mod loader;
pub mod paths;
pub mod platform;
pub mod signature;
pub mod spell;
pub mod stage;

pub use context::{Context, ContextId};
pub use copy::CopySpec;
pub use defer::DeferSpec;
pub use driver::execute;
pub use engine::{Engine, Options};
pub use error::{CopyError, EngineError, JournalError, LoadError, SpellError};
pub use executor::{Executor, SystemExecutor};
pub use journal::Journal;
pub use loader::Loader;
pub use signature::signature_of;
pub use spell::{Action, Factor, Profile, Spell, SpellId, SpellSpec};
pub use stage::{Stage, StageId};
