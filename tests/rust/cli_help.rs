use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn cli_prints_help() {
    let mut cmd = Command::cargo_bin("hearc").expect("binary not found");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hearc"))
        .stdout(predicate::str::contains("play"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn cli_rejects_unknown_mode() {
    let mut cmd = Command::cargo_bin("hearc").expect("binary not found");
    cmd.args(["compile", "--mode", "emscripten"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown compile mode"));
}
