use super::*;

#[test]
fn test_explicit_mode_wins() {
    assert_eq!(
        BackendKind::select(CompileMode::Local, true, true),
        BackendKind::Local
    );
    assert_eq!(
        BackendKind::select(CompileMode::Remote, true, false),
        BackendKind::Remote
    );
    assert_eq!(
        BackendKind::select(CompileMode::Toolchain, false, false),
        BackendKind::Toolchain
    );
}

#[test]
fn test_auto_mode_precedence() {
    assert_eq!(
        BackendKind::select(CompileMode::Auto, true, true),
        BackendKind::Toolchain
    );
    assert_eq!(
        BackendKind::select(CompileMode::Auto, false, true),
        BackendKind::Remote
    );
    assert_eq!(
        BackendKind::select(CompileMode::Auto, false, false),
        BackendKind::Local
    );
}

#[test]
fn test_toolchain_fallback_order() {
    assert_eq!(
        BackendKind::toolchain_fallback(true, true),
        Some(BackendKind::Remote)
    );
    assert_eq!(
        BackendKind::toolchain_fallback(false, true),
        Some(BackendKind::Local)
    );
    assert_eq!(BackendKind::toolchain_fallback(false, false), None);
}

#[test]
fn test_deadlines() {
    assert_eq!(BackendKind::Local.deadline(), Duration::from_secs(60));
    assert_eq!(BackendKind::Remote.deadline(), Duration::from_secs(60));
    assert_eq!(BackendKind::Toolchain.deadline(), Duration::from_secs(300));
}

#[test]
fn test_mode_names_and_legacy_aliases() {
    assert_eq!(CompileMode::parse("wasm-clang"), Some(CompileMode::Toolchain));
    assert_eq!(CompileMode::parse(" Serverless "), Some(CompileMode::Remote));
    assert_eq!(CompileMode::parse("local-server"), Some(CompileMode::Local));
    assert_eq!(CompileMode::parse("emcc"), None);

    let mode: CompileMode = serde_json::from_str("\"local-server\"").unwrap();
    assert_eq!(mode, CompileMode::Local);
    assert_eq!(serde_json::to_string(&CompileMode::Toolchain).unwrap(), "\"toolchain\"");
}
