//! # conjure
//!
//! Command-line front end for the conjury build engine.

mod loader;

use anyhow::Context as _;
use clap::Parser;
use conjury_core::{driver, platform, Engine, Options, SystemExecutor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "conjure")]
#[command(author, version, about = "Signature-driven build engine", long_about = None)]
struct Cli {
    /// Emit progress and diagnostic lines
    #[arg(long)]
    verbose: bool,

    /// Treat every spell as out-of-date
    #[arg(long)]
    force: bool,

    /// Compute decisions but perform no side effects
    #[arg(long)]
    preview: bool,

    /// Replace product-creating actions with unlink actions
    #[arg(long)]
    undo: bool,

    /// Populate the user-visible variable map
    #[arg(long = "define", value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Target names to invoke (defaults to the current directory's default
    /// spells)
    targets: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) if code == 0 => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code.clamp(1, 255) as u8),
        Err(err) => {
            eprintln!("conjure: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::WARN.into()
                },
            ),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = Options {
        force: cli.force,
        preview: cli.preview,
        undo: cli.undo,
        defines: parse_defines(&cli.define)?,
    };

    let current_dir = std::env::current_dir().context("cannot determine working directory")?;
    let top_dir = find_top(&current_dir)
        .context("no description file (conjury.pl) found here or in a parent directory")?;
    tracing::debug!("top {} current {}", top_dir.display(), current_dir.display());

    let mut engine = Engine::new(
        options,
        Rc::new(loader::YamlLoader),
        Box::new(SystemExecutor::new()),
    );
    let code = driver::execute(&mut engine, &top_dir, &current_dir, &cli.targets)?;
    Ok(code)
}

/// Parse repeated `--define NAME=VALUE` arguments into the variable map.
fn parse_defines(defines: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for item in defines {
        let (name, value) = item
            .split_once('=')
            .with_context(|| format!("--define expects NAME=VALUE, got '{item}'"))?;
        if name.is_empty() {
            anyhow::bail!("--define expects a non-empty NAME, got '{item}'");
        }
        map.insert(name.to_string(), value.to_string());
    }
    Ok(map)
}

/// Climb from `start` to the top-most contiguous ancestor that carries a
/// description file. `start` itself must carry one.
fn find_top(start: &Path) -> Option<PathBuf> {
    platform::find_description(start)?;
    let mut top = start.to_path_buf();
    loop {
        let Some(parent) = top.parent().map(Path::to_path_buf) else {
            break;
        };
        if platform::find_description(&parent).is_some() {
            top = parent;
        } else {
            break;
        }
    }
    Some(top)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_parse_into_map() {
        let map = parse_defines(&["A=1".to_string(), "B=two=three".to_string()]).unwrap();
        assert_eq!(map.get("A").map(String::as_str), Some("1"));
        assert_eq!(map.get("B").map(String::as_str), Some("two=three"));
    }

    #[test]
    fn defines_reject_missing_equals() {
        assert!(parse_defines(&["NOPE".to_string()]).is_err());
        assert!(parse_defines(&["=value".to_string()]).is_err());
    }

    #[test]
    fn find_top_climbs_contiguous_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let sub = root.join("sub");
        let subsub = sub.join("subsub");
        std::fs::create_dir_all(&subsub).unwrap();

        let name = platform::description_candidates()[0];
        std::fs::write(root.join(name), "spells: []\n").unwrap();
        std::fs::write(sub.join(name), "spells: []\n").unwrap();

        assert_eq!(find_top(&sub), Some(root.to_path_buf()));
        // The gap at subsub stops the climb before it starts.
        assert_eq!(find_top(&subsub), None);
    }
}
