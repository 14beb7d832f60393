//! Blocking I/O prohibition
//!
//! Async functions in production code must not block the runtime thread.
//! Use `tokio::fs`, `tokio::net`, `tokio::io` and async `reqwest` instead.
//!
//! Blocking calls in plain `fn`s are allowed: config loading runs before the
//! first await and logging setup writes to stderr.

use architectural_enforcement::{assert_no_violations, production_lines, SourceLine};

fn blocking_call(line: &SourceLine) -> Option<&'static str> {
    let code = line.code.as_str();

    // Never acceptable, sync or not
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if !line.in_async_fn() {
        return None;
    }

    if code.contains("std::fs::") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        Some("Blocking stdin/stdout in async")
    } else {
        None
    }
}

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations: Vec<String> = production_lines()
        .iter()
        .filter_map(|line| blocking_call(line).map(|label| line.report(label)))
        .collect();

    assert_no_violations("Blocking I/O in async code", &violations);
}

#[test]
fn test_scanner_sees_production_code() {
    let lines = production_lines();
    assert!(lines.iter().any(SourceLine::in_async_fn));
    assert!(lines.iter().any(|l| l.code.contains("std::fs::read_to_string")));
}
