//! The engine value.
//!
//! All run-wide state lives here: the spell/context/stage arenas, the three
//! registries (directory→context, directory→stage, product→spell), the
//! current-context pointer, and the option set. Nothing is process-global;
//! the driver owns the engine for exactly one run.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::{Context, ContextFrame, ContextId};
use crate::error::EngineError;
use crate::executor::Executor;
use crate::journal::Journal;
use crate::loader::Loader;
use crate::paths::absolutize;
use crate::platform;
use crate::spell::{Spell, SpellId};
use crate::stage::{Stage, StageId};

/// Run options, as parsed from the command line.
///
/// `--verbose` is absent here: it selects the subscriber level at the CLI
/// boundary and never reaches the engine.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Treat every spell as out-of-date.
    pub force: bool,
    /// Compute decisions but perform no side effects.
    pub preview: bool,
    /// Replace product-creating actions with unlink actions.
    pub undo: bool,
    /// User-visible `NAME=VALUE` definitions, opaque to the engine.
    pub defines: BTreeMap<String, String>,
}

/// One run's worth of build state.
pub struct Engine {
    pub(crate) options: Options,
    loader: Rc<dyn Loader>,
    pub(crate) executor: Box<dyn Executor>,

    pub(crate) spells: Vec<Spell>,
    pub(crate) contexts: Vec<Context>,
    pub(crate) stages: Vec<Stage>,

    contexts_by_dir: HashMap<PathBuf, ContextId>,
    stages_by_dir: HashMap<PathBuf, StageId>,
    pub(crate) products: HashMap<PathBuf, SpellId>,

    current: Option<ContextId>,
    root: Option<ContextId>,

    /// Default profile for spells with no action. Unique per process and
    /// intentionally unstable across runs; an action-less spell has no
    /// products of its own, and anything depending on one is forced anyway.
    pub(crate) unstable_profile: String,
}

impl Engine {
    pub fn new(options: Options, loader: Rc<dyn Loader>, executor: Box<dyn Executor>) -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Engine {
            options,
            loader,
            executor,
            spells: Vec::new(),
            contexts: Vec::new(),
            stages: Vec::new(),
            contexts_by_dir: HashMap::new(),
            stages_by_dir: HashMap::new(),
            products: HashMap::new(),
            current: None,
            root: None,
            unstable_profile: format!("conjury {} {start}", std::process::id()),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The user-visible definition map populated by `--define`.
    pub fn definitions(&self) -> &BTreeMap<String, String> {
        &self.options.defines
    }

    pub fn spell(&self, id: SpellId) -> &Spell {
        &self.spells[id.index()]
    }

    pub fn context(&self, id: ContextId) -> &Context {
        &self.contexts[id.index()]
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.index()]
    }

    /// The currently pushed context, if any.
    pub fn current_context(&self) -> Option<ContextId> {
        self.current
    }

    /// The first context constructed in this run.
    pub fn root_context(&self) -> Option<ContextId> {
        self.root
    }

    pub(crate) fn require_current(&self) -> Result<ContextId, EngineError> {
        self.current
            .ok_or_else(|| EngineError::Usage("no current context".to_string()))
    }

    /// Emit a warning prefixed with the current context directory.
    pub fn cast_warning(&self, message: &str) {
        match self.current {
            Some(ctx) => {
                tracing::warn!("{}: {message}", self.contexts[ctx.index()].dir().display());
            }
            None => tracing::warn!("{message}"),
        }
    }

    // ------------------------------------------------------------------
    // Context registry and the push/pop discipline

    /// Construct a context for `dir` (defaults to the process working
    /// directory), register it, and load its description.
    ///
    /// The first context constructed in a run becomes the root. The loader
    /// runs with the new context pushed; the pop happens on every exit path.
    pub fn create_context(&mut self, dir: Option<&Path>) -> Result<ContextId, EngineError> {
        let cwd = env::current_dir()?;
        let dir = match dir {
            Some(d) => absolutize(d, &cwd),
            None => cwd,
        };
        if self.contexts_by_dir.contains_key(&dir) {
            return Err(EngineError::DuplicateContext(dir));
        }

        let id = ContextId(self.contexts.len() as u32);
        self.contexts.push(Context::new(dir.clone()));
        self.contexts_by_dir.insert(dir.clone(), id);
        if self.root.is_none() {
            self.root = Some(id);
        }

        let frame = self.push_context(id)?;
        let loader = Rc::clone(&self.loader);
        let result = loader.load(self, &dir);
        self.finish(frame, result)?;
        Ok(id)
    }

    /// The registered context for `dir`, if any.
    pub fn context_for(&self, dir: &Path) -> Option<ContextId> {
        self.contexts_by_dir.get(dir).copied()
    }

    /// The registered context for `dir`, constructing (and loading) one if
    /// necessary.
    pub fn ensure_context(&mut self, dir: &Path) -> Result<ContextId, EngineError> {
        match self.context_for(dir) {
            Some(id) => Ok(id),
            None => self.create_context(Some(dir)),
        }
    }

    /// Save the current context and working directory, then switch to `id`.
    /// Pushing the already-current context is a no-op.
    pub(crate) fn push_context(&mut self, id: ContextId) -> Result<ContextFrame, EngineError> {
        if self.current == Some(id) {
            return Ok(ContextFrame::noop());
        }
        let prev_cwd = env::current_dir()?;
        env::set_current_dir(self.contexts[id.index()].dir())?;
        let prev = self.current.replace(id);
        Ok(ContextFrame {
            prev,
            prev_cwd,
            switched: true,
        })
    }

    /// Restore the context and working directory saved by `push_context`.
    pub(crate) fn pop_context(&mut self, frame: ContextFrame) -> Result<(), EngineError> {
        if !frame.switched {
            return Ok(());
        }
        self.current = frame.prev;
        env::set_current_dir(&frame.prev_cwd)?;
        Ok(())
    }

    /// Pop `frame` and merge any restoration failure into `result`,
    /// restoring before propagating as the discipline requires.
    pub(crate) fn finish<T>(
        &mut self,
        frame: ContextFrame,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match (result, self.pop_context(frame)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(pop_err)) => Err(pop_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(pop_err)) => {
                tracing::warn!("while unwinding: {pop_err}");
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage registry

    /// Construct a stage at `dir` (defaults to the current context's
    /// directory), creating the directory and opening its journal.
    ///
    /// Supplying `journal` skips the default platform-named journal file.
    /// Registering a directory twice is a consistency error.
    pub fn create_stage(
        &mut self,
        dir: Option<&Path>,
        journal: Option<Journal>,
    ) -> Result<StageId, EngineError> {
        let dir = match dir {
            Some(d) => absolutize(d, &env::current_dir()?),
            None => {
                let ctx = self.require_current()?;
                self.contexts[ctx.index()].dir().to_path_buf()
            }
        };
        if self.stages_by_dir.contains_key(&dir) {
            return Err(EngineError::DuplicateStage(dir));
        }
        fs::create_dir_all(&dir)?;

        let journal = match journal {
            Some(j) => j,
            None => Journal::open(dir.join(platform::journal_basename()))?,
        };

        let id = StageId(self.stages.len() as u32);
        self.stages.push(Stage::new(dir.clone(), journal));
        self.stages_by_dir.insert(dir, id);
        Ok(id)
    }

    /// The stage registered exactly at `dir`, if any.
    pub fn stage_for(&self, dir: &Path) -> Option<StageId> {
        self.stages_by_dir.get(dir).copied()
    }

    /// The nearest stage on `dir`'s path: `dir` itself, then each parent.
    pub fn nearest_stage(&self, dir: &Path) -> Option<StageId> {
        let mut probe = Some(dir);
        while let Some(dir) = probe {
            if let Some(id) = self.stages_by_dir.get(dir) {
                return Some(*id);
            }
            probe = dir.parent();
        }
        None
    }

    // ------------------------------------------------------------------
    // Name resolution

    /// Spells registered in `ctx` under `name`, or the context's default
    /// spells when no name is given. Order is insertion order; the list may
    /// be empty.
    pub fn fetch_spells(&self, ctx: ContextId, name: Option<&str>) -> Vec<SpellId> {
        let context = &self.contexts[ctx.index()];
        match name {
            Some(name) => context.spells_named(name).to_vec(),
            None => context.default_spells().to_vec(),
        }
    }

    /// The spell that claims `product` (an absolute, normalized path).
    pub fn product_spell(&self, product: &Path) -> Option<SpellId> {
        self.products.get(product).copied()
    }
}
