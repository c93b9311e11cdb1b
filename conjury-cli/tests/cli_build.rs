use assert_cmd::Command;
use conjury_core::platform;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_description(dir: &Path, text: &str) {
    fs::write(dir.join(platform::description_candidates()[0]), text).unwrap();
}

fn conjure(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("conjure").unwrap();
    cmd.current_dir(dir);
    cmd
}

const HELLO_DESCRIPTION: &str = r#"
spells:
  - name: out
    default: true
    products: [out.txt]
    shell: "printf hello > out.txt"
    factors: [in.txt]
"#;

#[test]
fn builds_then_skips_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_description(dir.path(), HELLO_DESCRIPTION);
    fs::write(dir.path().join("in.txt"), "x")?;

    let assert = conjure(dir.path()).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("printf hello"), "stdout was {stdout:?}");

    assert_eq!(fs::read_to_string(dir.path().join("out.txt"))?, "hello");
    assert!(dir.path().join(platform::journal_basename()).exists());

    // Second run: nothing to do, no command echoed.
    let assert = conjure(dir.path()).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.trim().is_empty(), "stdout was {stdout:?}");

    Ok(())
}

#[test]
fn preview_echoes_but_builds_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_description(dir.path(), HELLO_DESCRIPTION);
    fs::write(dir.path().join("in.txt"), "x")?;

    let assert = conjure(dir.path()).arg("--preview").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("printf hello"));
    assert!(!dir.path().join("out.txt").exists());

    // No entries made it into the journal.
    let journal = fs::read_to_string(dir.path().join(platform::journal_basename()))?;
    assert!(!journal.contains('+'), "journal was {journal:?}");

    Ok(())
}

#[test]
fn undo_unlinks_products_and_the_next_run_rebuilds() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_description(dir.path(), HELLO_DESCRIPTION);
    fs::write(dir.path().join("in.txt"), "x")?;

    conjure(dir.path()).assert().success();
    assert!(dir.path().join("out.txt").exists());

    conjure(dir.path()).arg("--undo").assert().success();
    assert!(!dir.path().join("out.txt").exists());

    let assert = conjure(dir.path()).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("printf hello"));
    assert!(dir.path().join("out.txt").exists());

    Ok(())
}

#[test]
fn named_targets_select_spells() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_description(
        dir.path(),
        r#"
spells:
  - name: alpha
    products: [alpha.txt]
    shell: "printf a > alpha.txt"
  - name: beta
    products: [beta.txt]
    shell: "printf b > beta.txt"
"#,
    );

    conjure(dir.path()).arg("beta").assert().success();
    assert!(!dir.path().join("alpha.txt").exists());
    assert!(dir.path().join("beta.txt").exists());

    conjure(dir.path()).arg("ghost").assert().failure();

    Ok(())
}

#[test]
fn per_spell_stage_selects_the_journal() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    write_description(
        dir.path(),
        r#"
stage:
  directory: vault
spells:
  - name: out
    default: true
    products: [out.txt]
    shell: "printf x > out.txt"
    stage: vault
"#,
    );

    conjure(dir.path()).assert().success();
    assert!(dir.path().join("out.txt").exists());

    // The record went to the named stage, not the implicit context one.
    let vault = fs::read_to_string(dir.path().join("vault").join(platform::journal_basename()))?;
    assert!(vault.contains("out.txt"), "vault journal was {vault:?}");
    let context = fs::read_to_string(dir.path().join(platform::journal_basename()))?;
    assert!(!context.contains("out.txt"), "context journal was {context:?}");

    Ok(())
}

#[test]
fn missing_description_is_an_error() {
    let dir = tempdir().unwrap();
    conjure(dir.path()).assert().failure();
}

#[test]
fn malformed_define_is_an_error() {
    let dir = tempdir().unwrap();
    write_description(dir.path(), "spells: []\n");
    conjure(dir.path())
        .args(["--define", "NOVALUE"])
        .assert()
        .failure();
}

#[test]
fn deferral_descends_into_subdirectories() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let sub = dir.path().join("sub");
    fs::create_dir(&sub)?;

    write_description(
        dir.path(),
        r#"
stage:
  directory: "."
spells:
  - defer:
      directories: [sub]
"#,
    );
    write_description(
        &sub,
        r#"
spells:
  - products: [out.txt]
    shell: "printf sub > out.txt"
"#,
    );

    // Run from the subdirectory: the climb finds the root description.
    conjure(&sub).assert().success();
    assert!(sub.join("out.txt").exists());

    // The sub-spell journals into the root stage.
    let journal = fs::read_to_string(dir.path().join(platform::journal_basename()))?;
    assert!(journal.contains("out.txt"), "journal was {journal:?}");

    Ok(())
}
