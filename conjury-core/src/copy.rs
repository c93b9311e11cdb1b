//! File copy: a spell that installs files into a destination directory,
//! optionally fixing permissions and ownership.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::engine::Engine;
use crate::error::{CopyError, EngineError};
use crate::paths::{absolutize, basename};
use crate::spell::{Action, Factor, Profile, SpellId, SpellSpec};

/// Arguments for [`Engine::filecopy`].
#[derive(Debug, Default)]
pub struct CopySpec {
    /// Destination directory.
    pub directory: PathBuf,
    /// Source files; each produces `directory/basename(source)`.
    pub files: Vec<PathBuf>,
    /// Permission bits applied to every product after copying.
    pub permission: Option<u32>,
    /// `user` or `user:group`, resolved to numeric ids at action time.
    pub owner: Option<String>,
    /// Optional name for the copy spell.
    pub name: Option<String>,
    /// Whether the copy spell joins its context's default list.
    pub default: bool,
}

impl Engine {
    /// Build a spell that copies `files` into `directory`.
    ///
    /// The sources are factors, so their mtimes enter the profile; the
    /// profile itself is a deterministic encoding of the destination and
    /// options. The action copies every file, then chmods, then chowns; a
    /// failing post-copy step unlinks the produced files and returns the
    /// error code.
    pub fn filecopy(&mut self, spec: CopySpec) -> Result<SpellId, EngineError> {
        if spec.files.is_empty() {
            return Err(CopyError::NoSources.into());
        }
        if spec.owner.is_some() && cfg!(not(unix)) {
            return Err(CopyError::OwnerUnsupported.into());
        }
        if spec.permission.is_some() && cfg!(not(unix)) {
            return Err(CopyError::PermissionUnsupported.into());
        }

        let cwd = env::current_dir()?;
        let dest = absolutize(&spec.directory, &cwd);

        let mut profile = format!("filecopy {}", dest.display());
        if let Some(mode) = spec.permission {
            profile.push_str(&format!(" permission={mode:o}"));
        }
        if let Some(owner) = &spec.owner {
            profile.push_str(&format!(" owner={owner}"));
        }

        let sources: Vec<PathBuf> = spec.files.iter().map(|f| absolutize(f, &cwd)).collect();
        let products: Vec<PathBuf> = sources.iter().map(|s| dest.join(basename(s))).collect();

        let mut cast = SpellSpec::new();
        cast.factors = spec
            .files
            .iter()
            .map(|f| Factor::Name(f.display().to_string()))
            .collect();
        cast.products = products.clone();
        cast.profile = Some(Profile::Static(profile));
        cast.action = Some(copy_action(sources, products, spec.permission, spec.owner));
        cast.name = spec.name;
        cast.default = spec.default;
        self.cast_spell(cast)
    }
}

fn copy_action(
    sources: Vec<PathBuf>,
    products: Vec<PathBuf>,
    permission: Option<u32>,
    owner: Option<String>,
) -> Action {
    Action::Closure(Box::new(move || {
        let mut made: Vec<PathBuf> = Vec::new();

        for (source, product) in sources.iter().zip(&products) {
            if let Err(err) = fs::copy(source, product) {
                unwind(&made);
                return error_code(&err);
            }
            made.push(product.clone());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = permission {
                for product in &products {
                    if let Err(err) =
                        fs::set_permissions(product, fs::Permissions::from_mode(mode))
                    {
                        unwind(&made);
                        return error_code(&err);
                    }
                }
            }

            if let Some(owner) = &owner {
                let (uid, gid) = match resolve_owner(owner) {
                    Ok(ids) => ids,
                    Err(code) => {
                        unwind(&made);
                        return code;
                    }
                };
                for product in &products {
                    if let Err(err) = nix::unistd::chown(product.as_path(), Some(uid), gid) {
                        unwind(&made);
                        return err as i32;
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (permission, &owner);
        }

        0
    }))
}

fn unwind(made: &[PathBuf]) {
    for product in made {
        if let Err(err) = fs::remove_file(product) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!("cannot unlink {}: {err}", product.display());
            }
        }
    }
}

fn error_code(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(1)
}

/// Resolve `user` or `user:group` to numeric ids, or an error code.
#[cfg(unix)]
fn resolve_owner(owner: &str) -> Result<(nix::unistd::Uid, Option<nix::unistd::Gid>), i32> {
    let (user, group) = match owner.split_once(':') {
        Some((user, group)) => (user, Some(group)),
        None => (owner, None),
    };

    let uid = match nix::unistd::User::from_name(user) {
        Ok(Some(entry)) => entry.uid,
        _ => return Err(1),
    };
    let gid = match group {
        Some(name) => match nix::unistd::Group::from_name(name) {
            Ok(Some(entry)) => Some(entry.gid),
            _ => return Err(1),
        },
        None => None,
    };
    Ok((uid, gid))
}
