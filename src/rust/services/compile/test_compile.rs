use serde_json::json;

use super::*;
use crate::services::compile::test_support::EMPTY_MODULE;

#[test]
fn test_default_options_export_the_module_abi() {
    let options = CompileOptions::default();
    assert_eq!(options.optimization_level, 2);
    assert!(!options.sdl_enabled);
    assert_eq!(
        options.exported_functions,
        vec!["hear_c_init".to_string(), "hear_c_next_sample".to_string()]
    );
    assert_eq!(
        serde_json::to_value(&options).unwrap(),
        json!({
            "optimizationLevel": 2,
            "sdlEnabled": false,
            "exportedFunctions": ["hear_c_init", "hear_c_next_sample"],
            "additionalFlags": []
        })
    );
}

#[test]
fn test_wire_response_accepts_string_or_list() {
    let wire: WireResponse = serde_json::from_value(json!({
        "success": false,
        "error": "Compilation failed",
        "errorDetails": "user.h:1:1: error: nope",
        "stderr": "boom"
    }))
    .unwrap();
    assert_eq!(wire.error_details, vec!["user.h:1:1: error: nope".to_string()]);
    assert!(wire.warnings.is_empty());

    let wire: WireResponse = serde_json::from_value(json!({
        "success": true,
        "output": "ok",
        "warnings": ["a", "b"],
        "errorDetails": null
    }))
    .unwrap();
    assert_eq!(wire.warnings, vec!["a".to_string(), "b".to_string()]);
    assert!(wire.error_details.is_empty());
}

#[test]
fn test_wire_module_accepts_base64_or_bytes() {
    let wire: WireResponse =
        serde_json::from_value(json!({"success": true, "wasm": "AGFzbQEAAAA="})).unwrap();
    assert_eq!(wire.wasm.as_deref(), Some(EMPTY_MODULE));

    let wire: WireResponse =
        serde_json::from_value(json!({"success": true, "wasm": EMPTY_MODULE})).unwrap();
    assert_eq!(wire.wasm.as_deref(), Some(EMPTY_MODULE));

    let wire: WireResponse =
        serde_json::from_value(json!({"success": true, "wasm": null})).unwrap();
    assert!(wire.wasm.is_none());

    assert!(serde_json::from_value::<WireResponse>(json!({"success": true, "wasm": [300]})).is_err());
    assert!(serde_json::from_value::<WireResponse>(json!({"success": true, "wasm": "%%"})).is_err());
}

#[test]
fn test_failure_serializes_to_wire_shape() {
    let result = CompileResult::Failure(
        CompileFailure::new(FailureKind::Compile, "Compilation failed")
            .with_details(vec!["user.h:2:1: error: x".to_string()]),
    );
    assert_eq!(
        serde_json::to_value(result.to_wire()).unwrap(),
        json!({
            "success": false,
            "error": "Compilation failed",
            "errorDetails": ["user.h:2:1: error: x"]
        })
    );
}

#[test]
fn test_success_serializes_without_binary() {
    let result = CompileResult::Success(CompileSuccess {
        artifact: CompiledModule::from_bytes(EMPTY_MODULE.to_vec()).unwrap(),
        output: "ok".to_string(),
        warnings: vec![],
    });
    assert!(result.is_success());
    assert_eq!(result.failure_kind(), None);
    assert_eq!(
        serde_json::to_value(result.to_wire()).unwrap(),
        json!({"success": true, "output": "ok"})
    );
}

#[test]
fn test_timeout_message() {
    let failure = CompileFailure::timeout(std::time::Duration::from_secs(30));
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.to_string(), "timeout: Compilation timeout after 30000 ms");
}
