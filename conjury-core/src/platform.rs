//! Platform-dependent names: journal basenames and description-file
//! candidates.

use std::path::{Path, PathBuf};

/// Default basename for a stage's journal file.
///
/// Windows-family filesystems get the uppercase 8.3-safe name; everything
/// POSIX-like gets a dotfile.
pub fn journal_basename() -> &'static str {
    if cfg!(windows) {
        "CONJURY.JNL"
    } else {
        ".conjury-journal"
    }
}

/// Description-file candidates for a context directory, in probe order.
///
/// Case-sensitive filesystems accept either spelling; when both exist the
/// last match in this order wins (the caller warns). Case-preserving
/// filesystems only ever see the canonical capitalized name.
pub fn description_candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["Conjury.pl"]
    } else {
        &["conjury.pl", "Conjury.pl"]
    }
}

/// Locate the description file for `dir`, if any.
///
/// Returns the full path of the winning candidate. When more than one
/// candidate exists a warning is emitted and the last match wins.
pub fn find_description(dir: &Path) -> Option<PathBuf> {
    let mut found: Option<PathBuf> = None;
    for name in description_candidates() {
        let candidate = dir.join(name);
        if candidate.is_file() {
            if let Some(prev) = &found {
                tracing::warn!(
                    "{}: both {} and {} exist; using {}",
                    dir.display(),
                    prev.display(),
                    candidate.display(),
                    candidate.display()
                );
            }
            found = Some(candidate);
        }
    }
    found
}
