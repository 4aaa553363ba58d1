use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn cli_init_scaffolds_project() {
    let dir = tempdir().expect("create tempdir");

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    let config = std::fs::read_to_string(dir.path().join("hearc.toml")).unwrap();
    assert!(config.contains("[compilation]"));
    assert!(config.contains("sample_rate = 44100"));

    let source = std::fs::read_to_string(dir.path().join("src/user.h")).unwrap();
    assert!(source.contains("float nextSample()"));

    // a second run refuses to clobber the project
    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}
