//! Spells: the nodes of the dependency graph, and the invoke algorithm that
//! walks it.
//!
//! A spell is a possibly-empty action plus the metadata that decides when it
//! must run: its factors (dependencies), its products (the files it claims),
//! and its profile (the textual pre-image of its signature). Invoking a
//! spell recursively invokes its factors, folds their contributions into the
//! profile, hashes the profile, and runs the action only when the journal or
//! the filesystem disagrees with the computed signature.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::context::ContextId;
use crate::engine::Engine;
use crate::error::{EngineError, SpellError};
use crate::signature::{push_source_factor, push_spell_factor, signature_of};
use crate::stage::StageId;

/// Index of a spell in the engine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpellId(pub(crate) u32);

impl SpellId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A dependency of a spell.
///
/// `Name` factors are resolved at invoke time: first against the owning
/// context's name table, then as a source-file path whose mtime enters the
/// profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Factor {
    Spell(SpellId),
    Name(String),
}

/// What a spell does when it must run.
pub enum Action {
    /// A command line for the platform shell.
    Shell(String),
    /// A program and its arguments, spawned directly.
    Argv(Vec<String>),
    /// A caller-supplied thunk returning a result code; zero is success.
    Closure(Box<dyn FnMut() -> i32>),
}

/// The textual pre-image of a spell's signature.
///
/// Computed profiles exist so a profile can include data only known after
/// construction, e.g. derived names.
pub enum Profile {
    Static(String),
    Computed(Box<dyn Fn() -> String>),
}

/// A node in the dependency graph.
pub struct Spell {
    pub(crate) context: ContextId,
    pub(crate) stage: Option<StageId>,
    pub(crate) factors: Vec<Factor>,
    pub(crate) products: Vec<PathBuf>,
    pub(crate) profile: Profile,
    pub(crate) action: Option<Action>,
    /// Line echoed to stdout when the action runs (the command text for
    /// shell/argv actions, the unlink line for the undo rewrite).
    pub(crate) describe: Option<String>,
    /// Whether the spell was constructed without an action. The runnable
    /// action is cleared once it executes, so force propagation cannot read
    /// `action` for this.
    pub(crate) actionless: bool,
    pub(crate) signature: Option<String>,
}

impl Spell {
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn products(&self) -> &[PathBuf] {
        &self.products
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// The signature, once invoke has computed it.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Whether the spell was constructed without an action.
    pub fn is_actionless(&self) -> bool {
        self.actionless
    }
}

/// Everything needed to cast (construct and register) a spell.
#[derive(Default)]
pub struct SpellSpec {
    pub(crate) name: Option<String>,
    pub(crate) default: bool,
    pub(crate) factors: Vec<Factor>,
    pub(crate) products: Vec<PathBuf>,
    pub(crate) action: Option<Action>,
    pub(crate) profile: Option<Profile>,
    pub(crate) stage: Option<StageId>,
}

impl SpellSpec {
    pub fn new() -> Self {
        SpellSpec::default()
    }

    /// Register the spell under `name` in its context.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Also append the spell to its context's default list.
    pub fn default_spell(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn factor(mut self, factor: Factor) -> Self {
        self.factors.push(factor);
        self
    }

    /// Add a name factor for each of `names`.
    pub fn factors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.factors
            .extend(names.into_iter().map(|n| Factor::Name(n.into())));
        self
    }

    pub fn product(mut self, product: impl Into<PathBuf>) -> Self {
        self.products.push(product.into());
        self
    }

    pub fn shell(mut self, command: impl Into<String>) -> Self {
        self.action = Some(Action::Shell(command.into()));
        self
    }

    pub fn argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action = Some(Action::Argv(argv.into_iter().map(Into::into).collect()));
        self
    }

    pub fn closure(mut self, action: impl FnMut() -> i32 + 'static) -> Self {
        self.action = Some(Action::Closure(Box::new(action)));
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(Profile::Static(profile.into()));
        self
    }

    pub fn computed_profile(mut self, profile: impl Fn() -> String + 'static) -> Self {
        self.profile = Some(Profile::Computed(Box::new(profile)));
        self
    }

    /// Attach the spell to an explicit stage instead of the nearest one.
    pub fn stage(mut self, stage: StageId) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl Engine {
    /// Cast a spell into the current context.
    ///
    /// Validates the spec, canonicalizes and registers product paths,
    /// applies the undo-mode rewrite, and fills in the default profile.
    pub fn cast_spell(&mut self, spec: SpellSpec) -> Result<SpellId, EngineError> {
        let ctx = self.require_current()?;
        let ctx_dir = self.contexts[ctx.index()].dir().to_path_buf();

        let mut products = Vec::with_capacity(spec.products.len());
        for product in &spec.products {
            let abs = crate::paths::absolutize(product, &ctx_dir);
            if self.products.contains_key(&abs) || products.contains(&abs) {
                return Err(SpellError::DuplicateProduct(abs).into());
            }
            products.push(abs);
        }

        if !products.is_empty() && spec.action.is_none() {
            return Err(SpellError::ProductsRequireAction.into());
        }

        let actionless = spec.action.is_none();
        let (action, profile, describe) = if self.options.undo && !products.is_empty() {
            let joined = join_paths(&products);
            (
                Some(unlink_action(products.clone())),
                Profile::Static(format!("undo {joined}")),
                Some(format!("unlink {joined}")),
            )
        } else {
            match spec.action {
                Some(Action::Shell(command)) => {
                    let profile = spec
                        .profile
                        .unwrap_or_else(|| Profile::Static(command.clone()));
                    let describe = Some(command.clone());
                    (Some(Action::Shell(command)), profile, describe)
                }
                Some(Action::Argv(argv)) => {
                    let text = argv.join(" ");
                    let profile = spec
                        .profile
                        .unwrap_or_else(|| Profile::Static(text.clone()));
                    (Some(Action::Argv(argv)), profile, Some(text))
                }
                Some(Action::Closure(thunk)) => {
                    let Some(profile) = spec.profile else {
                        return Err(SpellError::ClosureRequiresProfile.into());
                    };
                    (Some(Action::Closure(thunk)), profile, None)
                }
                None => {
                    let profile = spec
                        .profile
                        .unwrap_or_else(|| Profile::Static(self.unstable_profile.clone()));
                    (None, profile, None)
                }
            }
        };

        let id = SpellId(self.spells.len() as u32);
        for product in &products {
            self.products.insert(product.clone(), id);
        }
        self.spells.push(Spell {
            context: ctx,
            stage: spec.stage,
            factors: spec.factors,
            products,
            profile,
            action,
            describe,
            actionless,
            signature: None,
        });

        if let Some(name) = spec.name {
            self.contexts[ctx.index()].add_named(name, id);
        }
        if spec.default {
            self.contexts[ctx.index()].add_default(id);
        }
        Ok(id)
    }

    /// Invoke a spell, returning its signature.
    ///
    /// Memoized: the second invocation in a run returns the cached signature
    /// without touching factors, the journal, or the action.
    pub fn invoke(&mut self, id: SpellId) -> Result<String, EngineError> {
        if let Some(sig) = &self.spells[id.index()].signature {
            return Ok(sig.clone());
        }

        let profile = match &self.spells[id.index()].profile {
            Profile::Static(text) => text.clone(),
            Profile::Computed(thunk) => thunk(),
        };

        let ctx = self.spells[id.index()].context;
        let frame = self.push_context(ctx)?;
        let result = self.invoke_in_context(id, profile);
        let signature = self.finish(frame, result)?;

        // The signature is frozen and the action dropped: a later
        // invocation is a no-op returning the cached value.
        let spell = &mut self.spells[id.index()];
        spell.signature = Some(signature.clone());
        spell.action = None;
        Ok(signature)
    }

    /// The body of invoke, run with the spell's context pushed.
    fn invoke_in_context(
        &mut self,
        id: SpellId,
        mut profile: String,
    ) -> Result<String, EngineError> {
        let mut force = self.options.force;

        let factors = self.spells[id.index()].factors.clone();
        for factor in factors {
            match factor {
                Factor::Spell(fid) => {
                    // Self-references are silently skipped.
                    if fid == id {
                        continue;
                    }
                    self.fold_factor(fid, &mut profile, &mut force)?;
                }
                Factor::Name(name) => {
                    let ctx = self.require_current()?;
                    let resolved = self.fetch_spells(ctx, Some(&name));
                    if resolved.is_empty() {
                        let mtime = source_mtime(Path::new(&name))
                            .map_err(|_| SpellError::Unresolved(name.clone()))?;
                        push_source_factor(&mut profile, &name, mtime);
                    } else {
                        for fid in resolved {
                            if fid == id {
                                continue;
                            }
                            self.fold_factor(fid, &mut profile, &mut force)?;
                        }
                    }
                }
            }
        }

        let signature = signature_of(&profile);
        let products = self.spells[id.index()].products.clone();
        let stage = self.resolve_stage(id);

        let must_run = if self.options.undo {
            force || products.iter().any(|p| p.exists())
        } else {
            force || self.out_of_date(stage, &products, &signature)
        };
        tracing::debug!(
            "spell {}: signature {signature:?}, run={must_run}",
            id.0
        );

        if self.options.undo && must_run && !self.options.preview {
            if let Some(sid) = stage {
                for product in &products {
                    self.stages[sid.index()]
                        .journal_mut()
                        .delete(&journal_key(product))?;
                }
            }
        }

        if must_run && self.spells[id.index()].action.is_some() {
            self.run_action(id)?;
            if !self.options.preview && !self.options.undo && !signature.is_empty() {
                if let Some(sid) = stage {
                    for product in &products {
                        self.stages[sid.index()]
                            .journal_mut()
                            .put(&journal_key(product), &signature)?;
                    }
                }
            }
        }

        Ok(signature)
    }

    /// Invoke factor `fid` and fold its contribution into the profile.
    fn fold_factor(
        &mut self,
        fid: SpellId,
        profile: &mut String,
        force: &mut bool,
    ) -> Result<(), EngineError> {
        let sig = self.invoke(fid)?;
        push_spell_factor(profile, &sig);
        if self.spells[fid.index()].actionless {
            *force = true;
        }
        Ok(())
    }

    /// Decide whether a spell's recorded state disagrees with `signature`.
    ///
    /// An empty signature is never journaled, so only the on-disk presence
    /// of the products matters for it.
    fn out_of_date(&self, stage: Option<StageId>, products: &[PathBuf], signature: &str) -> bool {
        for product in products {
            if !product.exists() {
                return true;
            }
            if signature.is_empty() {
                continue;
            }
            let recorded = stage.and_then(|sid| {
                self.stages[sid.index()].journal().get(&journal_key(product))
            });
            match recorded {
                Some(recorded) if recorded == signature => {}
                _ => return true,
            }
        }
        false
    }

    /// The journal this spell records into: its explicit stage, or the
    /// nearest stage on its context directory's path.
    fn resolve_stage(&self, id: SpellId) -> Option<StageId> {
        if let Some(stage) = self.spells[id.index()].stage {
            return Some(stage);
        }
        let dir = self.contexts[self.spells[id.index()].context.index()].dir();
        self.nearest_stage(dir)
    }

    /// Echo the spell's description line and execute its action.
    ///
    /// Preview mode prints the line and stops short of the executor.
    fn run_action(&mut self, id: SpellId) -> Result<(), EngineError> {
        if let Some(line) = self.spells[id.index()].describe.clone() {
            println!("{line}");
        }
        if self.options.preview {
            return Ok(());
        }

        let Some(action) = self.spells[id.index()].action.take() else {
            return Ok(());
        };
        let code = match action {
            Action::Shell(command) => self.executor.spawn_shell(&command)?,
            Action::Argv(argv) => self.executor.spawn_argv(&argv)?,
            Action::Closure(mut thunk) => thunk(),
        };
        if code != 0 {
            return Err(SpellError::ActionFailed(code).into());
        }
        Ok(())
    }
}

/// Journal keys are the textual form of the absolute product path.
pub(crate) fn journal_key(product: &Path) -> String {
    product.display().to_string()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Modification time of `path` in whole seconds since the epoch.
fn source_mtime(path: &Path) -> io::Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}

/// The undo-mode replacement action: unlink every product, tolerate the
/// already-gone ones, and report the last OS error code otherwise.
fn unlink_action(products: Vec<PathBuf>) -> Action {
    Action::Closure(Box::new(move || {
        let mut code = 0;
        for product in &products {
            match fs::remove_file(product) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => code = err.raw_os_error().unwrap_or(1),
            }
        }
        code
    }))
}
