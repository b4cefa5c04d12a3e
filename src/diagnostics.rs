use once_cell::sync::Lazy;
use regex::Regex;

static EXCEPTION_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_]\w*\.)*\w*(?i:error|exception|interrupt)(?::|$)")
        .expect("valid exception line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// Classifies one stderr line from the worker. `None` means plain chatter.
pub fn detect_diagnostic_line(line: &str) -> Option<(DiagnosticLevel, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("traceback (most recent call last)")
        || EXCEPTION_LINE_RE.is_match(trimmed)
        || lower.starts_with("error:")
        || lower.starts_with("fatal:")
        || lower.contains(" error")
    {
        return Some((DiagnosticLevel::Error, trimmed.to_string()));
    }
    if lower.contains("warning") || lower.starts_with("warn:") {
        return Some((DiagnosticLevel::Warning, trimmed.to_string()));
    }

    None
}
