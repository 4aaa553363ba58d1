use assert_cmd::Command;
use tempfile::tempdir;

#[test]
fn cli_render_writes_wav_from_module() {
    let dir = tempdir().expect("create tempdir");
    let wasm = wat::parse_str(
        r#"(module
             (memory (export "memory") 1)
             (func (export "hear_c_next_sample") (result f32) (f32.const 0.25)))"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("tone.wasm"), &wasm).unwrap();
    std::fs::write(
        dir.path().join("hearc.toml"),
        "[audio]\nsample_rate = 8000\nchannels = 1\nbuffer_size = 32\n",
    )
    .unwrap();

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .args(["render", "--module", "tone.wasm", "--buffers", "3", "--out", "tone.wav"])
        .assert()
        .success();

    let reader = hound::WavReader::open(dir.path().join("tone.wav")).unwrap();
    assert_eq!(reader.spec().sample_rate, 8000);
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<f32> = reader.into_samples().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![0.25; 96]);
}

#[test]
fn cli_render_rejects_module_with_unknown_import() {
    let dir = tempdir().expect("create tempdir");
    let wasm = wat::parse_str(
        r#"(module (import "env" "missing" (func)) (memory (export "memory") 1))"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("bad.wasm"), &wasm).unwrap();

    Command::cargo_bin("hearc")
        .expect("binary not found")
        .current_dir(dir.path())
        .args(["render", "--module", "bad.wasm", "--buffers", "1"])
        .assert()
        .failure();
    assert!(!dir.path().join("render.wav").exists());
}
