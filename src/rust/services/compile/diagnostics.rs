use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static DIAGNOSTIC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?P<file>[^:\r\n]+):(?P<line>\d+):(?P<col>\d+): (?P<severity>fatal error|error|warning|note): (?P<message>.*?)\r?$",
    )
    .expect("diagnostic regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn parse(raw: &str) -> Self {
        match raw {
            "warning" => Severity::Warning,
            "note" => Severity::Note,
            _ => Severity::Error,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

/// One `file:line:col: severity: message` line from clang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file,
            self.line,
            self.column,
            self.severity.as_str(),
            self.message
        )
    }
}

/// Extracts every diagnostic line from compiler output, in order. Source
/// excerpts and caret lines are skipped.
pub fn parse(output: &str) -> Vec<Diagnostic> {
    DIAGNOSTIC_LINE
        .captures_iter(output)
        .filter_map(|caps| {
            Some(Diagnostic {
                file: caps.name("file")?.as_str().trim().to_string(),
                line: caps.name("line")?.as_str().parse().ok()?,
                column: caps.name("col")?.as_str().parse().ok()?,
                severity: Severity::parse(caps.name("severity")?.as_str()),
                message: caps.name("message")?.as_str().to_string(),
            })
        })
        .collect()
}

pub fn errors(diagnostics: &[Diagnostic]) -> Vec<String> {
    by_severity(diagnostics, Severity::Error)
}

pub fn warnings(diagnostics: &[Diagnostic]) -> Vec<String> {
    by_severity(diagnostics, Severity::Warning)
}

fn by_severity(diagnostics: &[Diagnostic], severity: Severity) -> Vec<String> {
    diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[path = "test_diagnostics.rs"]
mod tests;
