use super::*;

#[test]
fn test_compiled_module_accepts_minimal_binary() {
    let bytes = wat::parse_str("(module)").unwrap();
    let module = CompiledModule::from_bytes(bytes.clone()).unwrap();
    assert_eq!(module.len(), bytes.len());
    assert_eq!(module.as_bytes(), bytes.as_slice());
}

#[test]
fn test_compiled_module_rejects_bad_headers() {
    assert_eq!(
        CompiledModule::from_bytes(Vec::new()).unwrap_err(),
        ModuleError::Empty
    );
    assert_eq!(
        CompiledModule::from_bytes(vec![0, 0x61, 0x73]).unwrap_err(),
        ModuleError::Truncated(3)
    );
    assert_eq!(
        CompiledModule::from_bytes(b"MZ\0\0\x01\0\0\0".to_vec()).unwrap_err(),
        ModuleError::BadMagic
    );
    assert_eq!(
        CompiledModule::from_bytes(b"\0asm\x02\0\0\0".to_vec()).unwrap_err(),
        ModuleError::BadVersion
    );
}
