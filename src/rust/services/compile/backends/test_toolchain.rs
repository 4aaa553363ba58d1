use std::io::Write;

use super::*;
use crate::services::compile::test_support::{EMPTY_MODULE, MockServer, Reply};

/// Stands in for clang: echoes its arguments, writes a header-only module
/// to the `-o` path and fails when the source contains `BROKEN`.
const FAKE_CLANG: &str = r#"#!/bin/sh
echo "$@"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
if grep -q BROKEN user.h; then
  echo "user.h:2:3: error: use of undeclared identifier 'BROKEN'" >&2
  exit 1
fi
echo "user.h:1:7: warning: unused variable 'x'" >&2
printf '\000asm\001\000\000\000' > "$out"
"#;

fn sysroot_tar() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let data = b"/* stub */\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "include/stdio.h", &data[..])
        .unwrap();
    builder.into_inner().unwrap()
}

fn cdn() -> MockServer {
    let tar = sysroot_tar();
    MockServer::start(move |hit| match hit.url.as_str() {
        "/clang" => Reply::bytes(FAKE_CLANG.as_bytes()),
        "/wasm-ld" => Reply::bytes(b"#!/bin/sh\nexit 0\n".to_vec()),
        "/sysroot.tar" => Reply::bytes(tar.clone()),
        "/sysroot.tar.gz" => {
            let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
            gz.write_all(&tar).unwrap();
            Reply::bytes(gz.finish().unwrap())
        }
        _ => Reply::text(404, "not found"),
    })
}

#[tokio::test]
async fn test_assets_are_fetched_once_into_the_cache() {
    let server = cdn();
    let cache = tempfile::tempdir().unwrap();
    let settings = ToolchainSettings::new(server.base_url(), cache.path());

    let backend = ToolchainBackend::new(settings.clone());
    backend.prepare().await.unwrap();
    let assets = backend.assets().unwrap().clone();
    assert!(assets.clang.is_file());
    assert!(assets.linker.is_file());
    assert!(assets.sysroot.join("include/stdio.h").is_file());
    let fetched = server.hits().len();
    assert_eq!(fetched, 3);

    // a second session finds everything cached
    let again = ToolchainBackend::new(settings);
    again.prepare().await.unwrap();
    assert_eq!(server.hits().len(), fetched);
}

#[tokio::test]
async fn test_gzipped_sysroot_is_unpacked() {
    let server = cdn();
    let cache = tempfile::tempdir().unwrap();
    let mut settings = ToolchainSettings::new(server.base_url(), cache.path());
    settings.sysroot = "sysroot.tar.gz".to_string();

    let backend = ToolchainBackend::new(settings);
    backend.prepare().await.unwrap();
    assert!(cache.path().join("sysroot/include/stdio.h").is_file());
}

#[tokio::test]
async fn test_missing_asset_is_an_asset_load_failure() {
    let server = MockServer::start(|_| Reply::text(404, "not found"));
    let cache = tempfile::tempdir().unwrap();
    let backend = ToolchainBackend::new(ToolchainSettings::new(server.base_url(), cache.path()));

    let failure = backend.prepare().await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::AssetLoad);
    assert!(failure.error.contains("404"));
    assert!(!cache.path().join("clang").exists());

    let result = backend.compile(&CompileRequest::new("x")).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::AssetLoad));
}

#[tokio::test]
async fn test_unconfigured_cdn_is_an_asset_load_failure() {
    let cache = tempfile::tempdir().unwrap();
    let backend = ToolchainBackend::new(ToolchainSettings::new("", cache.path()));
    let failure = backend.prepare().await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::AssetLoad);
    assert!(failure.error.contains("not configured"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_compile_runs_clang_for_wasm32_wasi() {
    let server = cdn();
    let cache = tempfile::tempdir().unwrap();
    let backend = ToolchainBackend::new(ToolchainSettings::new(server.base_url(), cache.path()));

    let result = backend
        .compile(&CompileRequest::new("float nextSample() { return 0.f; }"))
        .await;
    match result {
        CompileResult::Success(ok) => {
            assert_eq!(ok.artifact.as_bytes(), EMPTY_MODULE);
            assert!(ok.output.contains("--target=wasm32-wasi"));
            assert!(ok.output.contains("-Wl,--export=hear_c_next_sample"));
            assert!(ok.output.contains("-O2"));
            assert_eq!(
                ok.warnings,
                vec!["user.h:1:7: warning: unused variable 'x'".to_string()]
            );
        }
        CompileResult::Failure(f) => panic!("unexpected failure {f:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_compile_errors_become_details() {
    let server = cdn();
    let cache = tempfile::tempdir().unwrap();
    let backend = ToolchainBackend::new(ToolchainSettings::new(server.base_url(), cache.path()));

    let result = backend.compile(&CompileRequest::new("BROKEN;")).await;
    match result {
        CompileResult::Failure(f) => {
            assert_eq!(f.kind, FailureKind::Compile);
            assert_eq!(
                f.error_details,
                vec!["user.h:2:3: error: use of undeclared identifier 'BROKEN'".to_string()]
            );
            assert!(f.stderr.unwrap().contains("BROKEN"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_harness_exports_the_module_abi() {
    assert!(HARNESS_SOURCE.contains("#include \"user.h\""));
    assert!(HARNESS_SOURCE.contains("export_name(\"hear_c_init\")"));
    assert!(HARNESS_SOURCE.contains("export_name(\"hear_c_next_sample\")"));
}
