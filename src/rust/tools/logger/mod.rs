#[cfg(feature = "cli")]
use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use std::fmt::Write;

use crate::engine::bridge::ProcessorEvent;
use crate::services::compile::{CompileFailure, CompileResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Success,
    Error,
    Info,
    Warning,
    Watch,
    Debug,
    Print,
    Action,
}

#[derive(Debug, Clone, Default)]
pub struct Logger {
    verbose: bool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug lines (perf reports, compiler status) are only printed when
    /// verbose.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if level == LogLevel::Debug && !self.verbose {
            return;
        }
        self.print_line(level, message.as_ref());
    }

    pub fn log_with_details<I, S>(&self, level: LogLevel, message: impl AsRef<str>, details: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.log(level, message);
        for detail in details {
            self.print_detail(detail.as_ref());
        }
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Success, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    pub fn watch(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Watch, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn action(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Action, message);
    }

    /// Output written by the running module. Rendered as [PRINT].
    pub fn print(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Print, message);
    }

    /// Forwards one processor event to the matching level.
    pub fn log_event(&self, event: &ProcessorEvent) {
        for (level, line) in event_lines(event) {
            self.log(level, line);
        }
    }

    pub fn log_compile_failure(&self, failure: &CompileFailure) {
        self.log_with_details(
            LogLevel::Error,
            format!("Compilation failed ({}): {}", failure.kind, failure.error),
            &failure.error_details,
        );
        if self.verbose {
            if let Some(stderr) = failure.stderr.as_deref().filter(|s| !s.trim().is_empty()) {
                self.log_with_details(LogLevel::Debug, "compiler stderr", stderr.lines());
            }
        }
    }

    /// Logs warnings of a successful compile, or the whole failure.
    pub fn log_compile_result(&self, result: &CompileResult) {
        match result {
            CompileResult::Success(ok) => {
                for warning in &ok.warnings {
                    self.warn(warning);
                }
                self.success(format!("Compiled module ({} bytes)", ok.artifact.len()));
            }
            CompileResult::Failure(failure) => self.log_compile_failure(failure),
        }
    }

    fn print_detail(&self, detail: &str) {
        #[cfg(feature = "cli")]
        {
            println!("   ↳ {}", detail);
        }
        #[cfg(not(feature = "cli"))]
        {
            println!("   -> {}", detail);
        }
    }

    fn print_line(&self, level: LogLevel, message: &str) {
        #[cfg(feature = "cli")]
        {
            println!("{}", self.render_colored_line(level, message));
        }
        #[cfg(not(feature = "cli"))]
        {
            println!("{}", render_plain_line(level, message));
        }
    }

    #[cfg(feature = "cli")]
    fn render_colored_line(&self, level: LogLevel, message: &str) -> String {
        let mut out = String::new();
        let (emoji, color) = level.visuals();

        out.push_str(emoji);
        out.push(' ');
        out.push_str(&self.render_signature());
        out.push(' ');
        out.push_str(&self.render_status(level, color));
        out.push(' ');
        out.push_str(message);
        out
    }

    #[cfg(feature = "cli")]
    fn render_signature(&self) -> String {
        let mut s = String::new();
        let _ = write!(&mut s, "{}", SetForegroundColor(Color::Grey));
        s.push('[');
        let _ = write!(
            &mut s,
            "{}",
            SetForegroundColor(Color::Rgb {
                r: 255,
                g: 112,
                b: 67,
            })
        );
        let _ = write!(&mut s, "{}", SetAttribute(Attribute::Bold));
        s.push_str("Hear-C");
        let _ = write!(&mut s, "{}", SetAttribute(Attribute::Reset));
        let _ = write!(&mut s, "{}", SetForegroundColor(Color::Grey));
        s.push(']');
        let _ = write!(&mut s, "{}", ResetColor);
        s
    }

    #[cfg(feature = "cli")]
    fn render_status(&self, level: LogLevel, color: Color) -> String {
        let mut s = String::new();
        let _ = write!(&mut s, "{}", SetForegroundColor(color));
        let _ = write!(&mut s, "{}", SetAttribute(Attribute::Bold));
        s.push('[');
        s.push_str(level.as_label());
        s.push(']');
        let _ = write!(&mut s, "{}", SetAttribute(Attribute::Reset));
        let _ = write!(&mut s, "{}", ResetColor);
        s
    }
}

/// `[Hear-C] [LEVEL] message` without colors.
pub fn render_plain_line(level: LogLevel, message: &str) -> String {
    let mut out = String::new();
    let _ = write!(&mut out, "[Hear-C] [{}] {}", level.as_label(), message);
    out
}

/// Log lines for a processor event. Module output is split per line and
/// the trailing newline dropped; empty output yields nothing.
pub fn event_lines(event: &ProcessorEvent) -> Vec<(LogLevel, String)> {
    match event {
        ProcessorEvent::Ready => vec![(LogLevel::Success, "Module ready".to_string())],
        ProcessorEvent::Error { message } => vec![(LogLevel::Error, message.clone())],
        ProcessorEvent::Log { text } => text
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                let level = if line.starts_with("Warning:") {
                    LogLevel::Warning
                } else {
                    LogLevel::Print
                };
                (level, line.to_string())
            })
            .collect(),
        ProcessorEvent::Perf {
            avg_ms,
            max_ms,
            buffer_size,
            sample_rate,
        } => {
            let budget_ms = *buffer_size as f64 * 1000.0 / f64::from((*sample_rate).max(1));
            vec![(
                LogLevel::Debug,
                format!(
                    "perf: avg {avg_ms:.3} ms, max {max_ms:.3} ms ({buffer_size} frames @ {sample_rate} Hz, budget {budget_ms:.2} ms)"
                ),
            )]
        }
    }
}

impl LogLevel {
    fn as_label(self) -> &'static str {
        match self {
            LogLevel::Success => "SUCCESS",
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Watch => "WATCH",
            LogLevel::Debug => "DEBUG",
            LogLevel::Action => "ACTION",
            LogLevel::Print => "PRINT",
        }
    }

    #[cfg(feature = "cli")]
    fn visuals(self) -> (&'static str, Color) {
        match self {
            LogLevel::Success => (
                "✅",
                Color::Rgb {
                    r: 76,
                    g: 175,
                    b: 80,
                },
            ),
            LogLevel::Error => (
                "❌",
                Color::Rgb {
                    r: 244,
                    g: 67,
                    b: 54,
                },
            ),
            LogLevel::Info => (
                "ℹ️ ",
                Color::Rgb {
                    r: 33,
                    g: 150,
                    b: 243,
                },
            ),
            LogLevel::Warning => (
                "⚠️",
                Color::Rgb {
                    r: 255,
                    g: 152,
                    b: 0,
                },
            ),
            LogLevel::Watch => (
                "👀",
                Color::Rgb {
                    r: 171,
                    g: 71,
                    b: 188,
                },
            ),
            LogLevel::Debug => (
                "🛠️",
                Color::Rgb {
                    r: 121,
                    g: 134,
                    b: 203,
                },
            ),
            LogLevel::Action => (
                "🔊",
                Color::Rgb {
                    r: 0,
                    g: 188,
                    b: 212,
                },
            ),
            LogLevel::Print => ("", Color::White),
        }
    }
}

#[cfg(test)]
#[path = "test_logger.rs"]
mod tests;
