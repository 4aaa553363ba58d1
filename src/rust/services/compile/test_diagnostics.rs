use super::*;

const CLANG_OUTPUT: &str = "\
user.h:12:5: error: use of undeclared identifier 'foo'
    foo();
    ^
user.h:20:11: warning: unused variable 'gain' [-Wunused-variable]
  float gain = 0.5f;
          ^
harness.cpp:3:10: note: in file included from here
In file included from harness.cpp:3:
user.h:1:10: fatal error: 'gimmel.hpp' file not found
1 warning and 2 errors generated.
";

#[test]
fn test_parse_extracts_diagnostic_lines_in_order() {
    let parsed = parse(CLANG_OUTPUT);
    assert_eq!(parsed.len(), 4);

    assert_eq!(
        parsed[0],
        Diagnostic {
            file: "user.h".to_string(),
            line: 12,
            column: 5,
            severity: Severity::Error,
            message: "use of undeclared identifier 'foo'".to_string(),
        }
    );
    assert_eq!(parsed[1].severity, Severity::Warning);
    assert_eq!(parsed[2].severity, Severity::Note);
    assert_eq!(parsed[3].severity, Severity::Error);
    assert_eq!(parsed[3].message, "'gimmel.hpp' file not found");
}

#[test]
fn test_errors_and_warnings_are_formatted_back() {
    let parsed = parse(CLANG_OUTPUT);
    assert_eq!(
        errors(&parsed),
        vec![
            "user.h:12:5: error: use of undeclared identifier 'foo'".to_string(),
            "user.h:1:10: error: 'gimmel.hpp' file not found".to_string(),
        ]
    );
    assert_eq!(
        warnings(&parsed),
        vec!["user.h:20:11: warning: unused variable 'gain' [-Wunused-variable]".to_string()]
    );
}

#[test]
fn test_windows_line_endings_and_noise() {
    let parsed = parse("C:\\x\\user.h is not a diagnostic\r\nuser.h:2:1: warning: odd\r\n");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].message, "odd");
    assert!(parse("").is_empty());
}
