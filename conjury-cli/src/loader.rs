//! YAML description loader.
//!
//! A description file registers the spells and stages of one directory. The
//! schema is a `stage` entry plus a list of `spells`, where each spell is a
//! task (shell or argv action), a deferral to other directories, or a file
//! copy:
//!
//! ```yaml
//! stage:
//!   directory: "."
//! spells:
//!   - name: hello
//!     default: true
//!     products: ["hello"]
//!     shell: "cc -o hello hello.c"
//!     factors: ["hello.c"]
//!     stage: "."          # optional: journal into this registered stage
//!   - defer:
//!       directories: [sub]
//!       targets: [all]
//!       if_present: true
//!   - copy:
//!       directory: dist
//!       files: [README]
//!       permission: "0644"
//! ```
//!
//! Relative paths resolve against the context directory (the engine keeps
//! the working directory there while loading). A description that declares
//! products with no stage reachable on the directory's path gets a stage
//! created for the context directory itself.

use conjury_core::{CopySpec, DeferSpec, Engine, EngineError, LoadError, Loader, SpellSpec};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads `conjury.pl` description files written in the YAML schema above.
#[derive(Debug, Default)]
pub struct YamlLoader;

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    stage: Option<StageEntry>,
    #[serde(default)]
    spells: Vec<SpellEntry>,
}

#[derive(Debug, Deserialize)]
struct StageEntry {
    #[serde(default)]
    directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpellEntry {
    Defer { defer: DeferEntry },
    Copy { copy: CopyEntry },
    Task(TaskEntry),
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    default: Option<bool>,
    #[serde(default)]
    products: Vec<PathBuf>,
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    argv: Option<Vec<String>>,
    #[serde(default)]
    factors: Vec<String>,
    #[serde(default)]
    profile: Option<String>,
    /// Journal into the stage registered at this directory instead of the
    /// nearest one.
    #[serde(default)]
    stage: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct DeferEntry {
    directories: Vec<PathBuf>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    if_present: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    default: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CopyEntry {
    directory: PathBuf,
    files: Vec<PathBuf>,
    #[serde(default)]
    permission: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    default: Option<bool>,
}

impl Loader for YamlLoader {
    fn load(&self, engine: &mut Engine, dir: &Path) -> Result<(), EngineError> {
        let Some(file) = conjury_core::platform::find_description(dir) else {
            return Err(LoadError::NoDescription {
                dir: dir.to_path_buf(),
            }
            .into());
        };

        let text = fs::read_to_string(&file).map_err(|err| LoadError::Description {
            dir: dir.to_path_buf(),
            message: format!("cannot read {}: {err}", file.display()),
        })?;
        let description: Description =
            serde_yaml::from_str(&text).map_err(|err| LoadError::Description {
                dir: dir.to_path_buf(),
                message: format!("cannot parse {}: {err}", file.display()),
            })?;

        if let Some(stage) = &description.stage {
            engine.create_stage(stage.directory.as_deref(), None)?;
        }

        let declares_products = description.spells.iter().any(|entry| match entry {
            SpellEntry::Task(task) => !task.products.is_empty(),
            SpellEntry::Copy { .. } => true,
            SpellEntry::Defer { .. } => false,
        });
        if declares_products && engine.nearest_stage(dir).is_none() {
            engine.create_stage(Some(dir), None)?;
        }

        for entry in description.spells {
            match entry {
                SpellEntry::Task(task) => cast_task(engine, dir, task)?,
                SpellEntry::Defer { defer } => {
                    engine.defer(DeferSpec {
                        directories: defer.directories,
                        targets: defer.targets,
                        if_present: defer.if_present,
                        default: defer.default.unwrap_or(defer.name.is_none()),
                        name: defer.name,
                    })?;
                }
                SpellEntry::Copy { copy } => {
                    let permission = copy
                        .permission
                        .as_deref()
                        .map(|text| parse_permission(dir, text))
                        .transpose()?;
                    engine.filecopy(CopySpec {
                        directory: copy.directory,
                        files: copy.files,
                        permission,
                        owner: copy.owner,
                        default: copy.default.unwrap_or(copy.name.is_none()),
                        name: copy.name,
                    })?;
                }
            }
        }
        Ok(())
    }
}

fn cast_task(engine: &mut Engine, dir: &Path, task: TaskEntry) -> Result<(), EngineError> {
    if task.shell.is_some() && task.argv.is_some() {
        return Err(LoadError::Description {
            dir: dir.to_path_buf(),
            message: "a spell takes either 'shell' or 'argv', not both".to_string(),
        }
        .into());
    }

    let mut spec = SpellSpec::new().factors(task.factors);
    if let Some(stage_dir) = &task.stage {
        let stage_dir = conjury_core::paths::absolutize(stage_dir, dir);
        let Some(stage) = engine.stage_for(&stage_dir) else {
            return Err(LoadError::Description {
                dir: dir.to_path_buf(),
                message: format!("no stage registered at {}", stage_dir.display()),
            }
            .into());
        };
        spec = spec.stage(stage);
    }
    for product in task.products {
        spec = spec.product(product);
    }
    if let Some(command) = task.shell {
        spec = spec.shell(command);
    }
    if let Some(argv) = task.argv {
        spec = spec.argv(argv);
    }
    if let Some(profile) = task.profile {
        spec = spec.profile(profile);
    }
    if task.default.unwrap_or(task.name.is_none()) {
        spec = spec.default_spell();
    }
    if let Some(name) = task.name {
        spec = spec.name(name);
    }

    engine.cast_spell(spec)?;
    Ok(())
}

/// Permissions are written as octal strings ("0644") to keep YAML honest.
fn parse_permission(dir: &Path, text: &str) -> Result<u32, EngineError> {
    u32::from_str_radix(text.trim_start_matches("0o"), 8).map_err(|_| {
        LoadError::Description {
            dir: dir.to_path_buf(),
            message: format!("invalid permission '{text}': expected octal digits"),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_parses_all_entry_kinds() {
        let text = r#"
stage:
  directory: build
spells:
  - name: prog
    products: [prog]
    shell: "cc -o prog main.c"
    factors: [main.c]
  - defer:
      directories: [lib, doc]
      targets: [all]
      if_present: true
  - copy:
      directory: dist
      files: [README]
      permission: "0644"
"#;
        let description: Description = serde_yaml::from_str(text).unwrap();
        assert!(description.stage.is_some());
        assert_eq!(description.spells.len(), 3);
        assert!(matches!(description.spells[0], SpellEntry::Task(_)));
        assert!(matches!(description.spells[1], SpellEntry::Defer { .. }));
        assert!(matches!(description.spells[2], SpellEntry::Copy { .. }));
    }

    #[test]
    fn permission_strings_are_octal() {
        let dir = Path::new("/x");
        assert_eq!(parse_permission(dir, "0644").unwrap(), 0o644);
        assert_eq!(parse_permission(dir, "0o755").unwrap(), 0o755);
        assert!(parse_permission(dir, "rw-").is_err());
    }
}
