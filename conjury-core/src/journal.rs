//! The persisted product→signature store.
//!
//! On disk a journal is an append-only, line-oriented UTF-8 log. Each record
//! is `<op> <sig> <name>\n`: `+` asserts that `name` was last built with
//! `sig`, `-` retracts any prior assertion (its signature field is written
//! as `-` and ignored on read). Fields are separated by runs of whitespace
//! and the name absorbs the remainder of the line, so names may contain
//! spaces. Unknown ops are ignored.
//!
//! Opening folds the log left-to-right into a map and then rewrites the file
//! as a compacted set of `+` records so it does not grow without bound.
//! Every mutation appends exactly one record inside its own
//! open/write/close cycle: after `put` or `delete` returns, a reopen
//! reconstructs the in-memory state, or the call failed loudly.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::JournalError;

/// An open journal: the compacted file plus its in-memory view.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Journal {
    /// Open the journal at `path`, folding any existing log and rewriting it
    /// compacted.
    ///
    /// A log that cannot be read degrades to a warning and an empty map. A
    /// compaction rewrite that cannot create the file is fatal; a failed
    /// unlink before the rewrite only warns.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(text) => fold_log(&text, &mut entries),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    "cannot read journal {}: {err}; starting empty",
                    path.display()
                );
            }
        }

        let journal = Journal { path, entries };
        journal.rewrite_compacted()?;
        Ok(journal)
    }

    /// The file this journal is attached to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the recorded signature for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Whether `name` has a live record.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate the live `(name, signature)` records.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal holds no live records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that `name` was built with `signature`.
    pub fn put(&mut self, name: &str, signature: &str) -> Result<(), JournalError> {
        if name.is_empty() {
            return Err(JournalError::EmptyName);
        }
        if signature.is_empty() || signature.contains(char::is_whitespace) {
            return Err(JournalError::BadSignature);
        }
        self.append_record('+', signature, name)?;
        self.entries.insert(name.to_string(), signature.to_string());
        Ok(())
    }

    /// Retract the record for `name`, returning the prior signature if any.
    pub fn delete(&mut self, name: &str) -> Result<Option<String>, JournalError> {
        if name.is_empty() {
            return Err(JournalError::EmptyName);
        }
        let prior = self.entries.remove(name);
        self.append_record('-', "-", name)?;
        Ok(prior)
    }

    /// Unlink the file and drop every record.
    pub fn clear(&mut self) -> Result<(), JournalError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(JournalError::Remove {
                    path: self.path.clone(),
                    source: err,
                });
            }
        }
        self.entries.clear();
        Ok(())
    }

    fn append_record(&self, op: char, signature: &str, name: &str) -> Result<(), JournalError> {
        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)?;
            writeln!(file, "{op} {signature} {name}")
        };
        write().map_err(|source| JournalError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn rewrite_compacted(&self) -> Result<(), JournalError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!("cannot unlink journal {}: {err}", self.path.display());
            }
        }

        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?;
            for (name, signature) in &self.entries {
                writeln!(file, "+ {signature} {name}")?;
            }
            Ok(())
        };
        write().map_err(|source| JournalError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Fold a log's records into `entries`, left to right.
fn fold_log(text: &str, entries: &mut BTreeMap<String, String>) {
    for line in text.lines() {
        let Some((op, signature, name)) = split_record(line) else {
            continue;
        };
        match op {
            "+" => {
                entries.insert(name.to_string(), signature.to_string());
            }
            "-" => {
                entries.remove(name);
            }
            _ => {}
        }
    }
}

/// Split `<op> <sig> <name>` on runs of whitespace; the name keeps any
/// embedded spaces.
fn split_record(line: &str) -> Option<(&str, &str, &str)> {
    let rest = line.trim_start();
    let op_end = rest.find(char::is_whitespace)?;
    let (op, rest) = rest.split_at(op_end);
    let rest = rest.trim_start();
    let sig_end = rest.find(char::is_whitespace)?;
    let (signature, rest) = rest.split_at(sig_end);
    let name = rest.trim_start();
    if name.is_empty() {
        return None;
    }
    Some((op, signature, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal_in(dir: &Path) -> Journal {
        Journal::open(dir.join("journal")).unwrap()
    }

    #[test]
    fn open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal_in(dir.path());
        assert!(journal.is_empty());
        // Compaction created the file.
        assert!(journal.path().exists());
    }

    #[test]
    fn put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        journal.put("/a/out", "sig1").unwrap();
        assert_eq!(journal.get("/a/out"), Some("sig1"));
        assert!(journal.has("/a/out"));

        let reopened = journal_in(dir.path());
        assert_eq!(reopened.get("/a/out"), Some("sig1"));
    }

    #[test]
    fn later_records_win() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        journal.put("k", "old").unwrap();
        journal.put("k", "new").unwrap();

        let reopened = journal_in(dir.path());
        assert_eq!(reopened.get("k"), Some("new"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn delete_retracts_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        journal.put("k", "sig").unwrap();
        assert_eq!(journal.delete("k").unwrap(), Some("sig".to_string()));
        assert!(!journal.has("k"));

        let reopened = journal_in(dir.path());
        assert!(!reopened.has("k"));
    }

    #[test]
    fn names_may_contain_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        journal.put("/a/with space/out file", "sig").unwrap();

        let reopened = journal_in(dir.path());
        assert_eq!(reopened.get("/a/with space/out file"), Some("sig"));
    }

    #[test]
    fn unknown_ops_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        fs::write(&path, "+ sig1 /a\n? junk /b\n+ sig2 /c\nnot a record\n").unwrap();

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.get("/a"), Some("sig1"));
        assert_eq!(journal.get("/c"), Some("sig2"));
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn open_compacts_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        fs::write(&path, "+ a /k\n+ b /k\n- - /gone\n+ c /k\n").unwrap();

        let _journal = Journal::open(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "+ c /k\n");
    }

    #[test]
    fn rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        assert!(journal.put("", "sig").is_err());
        assert!(journal.put("k", "").is_err());
        assert!(journal.put("k", "has space").is_err());
    }

    #[test]
    fn clear_unlinks_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(dir.path());
        journal.put("k", "sig").unwrap();
        journal.clear().unwrap();
        assert!(journal.is_empty());
        assert!(!journal.path().exists());

        let reopened = journal_in(dir.path());
        assert!(reopened.is_empty());
    }

    #[test]
    fn unreadable_log_degrades_to_empty() {
        // A directory in place of the journal file forces a read error that
        // is not NotFound; open should warn and start empty, and the
        // compaction rewrite then fails fatally because the path is taken.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal");
        fs::create_dir(&path).unwrap();
        assert!(Journal::open(&path).is_err());
    }
}
