//! Error types for the engine.
//!
//! Each concern gets its own focused enum; `EngineError` aggregates them via
//! `#[from]` alongside the engine-level registry and usage variants. An
//! `Err` propagating out of the driver is the fatal `cast_error` path: the
//! run terminates with a non-zero exit.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Journal persistence failures.
///
/// Read-side corruption is not represented here; a journal that cannot be
/// read degrades to a warning and an empty map at open time. Write-side
/// failures are always fatal.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("cannot write journal {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot remove journal {}: {}", .path.display(), .source)]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("journal entry name must be non-empty")]
    EmptyName,

    #[error("journal signature must be non-empty and whitespace-free")]
    BadSignature,
}

/// Spell construction and invocation failures.
#[derive(Error, Debug)]
pub enum SpellError {
    /// Argument-shape violation: products were declared without an action.
    #[error("a spell with products requires an action")]
    ProductsRequireAction,

    /// Argument-shape violation: a closure action has no textual form to
    /// default the profile from.
    #[error("a closure action requires an explicit profile")]
    ClosureRequiresProfile,

    /// A product path is already claimed in the product index.
    #[error("product {} is already claimed by another spell", .0.display())]
    DuplicateProduct(PathBuf),

    /// A string factor named no spells and no stat-able source file.
    #[error("no spells for '{0}' -- is it a missing source file?")]
    Unresolved(String),

    /// An action returned a non-zero result code.
    #[error("action failed with result {0}")]
    ActionFailed(i32),
}

/// Description-loading failures.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{}: no description file (conjury.pl)", .dir.display())]
    NoDescription { dir: PathBuf },

    /// The description exists but could not be read or evaluated.
    #[error("{}: {}", .dir.display(), .message)]
    Description { dir: PathBuf, message: String },

    /// A deferral named a directory that does not exist.
    #[error("{}: missing directory", .dir.display())]
    MissingDirectory { dir: PathBuf },
}

/// File-copy construction failures.
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("filecopy requires at least one source file")]
    NoSources,

    #[error("filecopy owner is only supported on unix")]
    OwnerUnsupported,

    #[error("filecopy permission is only supported on unix")]
    PermissionUnsupported,
}

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Argument-shape violation against the engine itself.
    #[error("usage: {0}")]
    Usage(String),

    #[error("duplicate context registration for {}", .0.display())]
    DuplicateContext(PathBuf),

    #[error("duplicate stage registration for {}", .0.display())]
    DuplicateStage(PathBuf),

    #[error("no context registered for {}", .0.display())]
    NoContext(PathBuf),

    #[error("no spells for target '{0}'")]
    NoTarget(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Spell(#[from] SpellError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
