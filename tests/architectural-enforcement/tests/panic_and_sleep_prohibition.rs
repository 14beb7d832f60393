//! Panic and sleep prohibition
//!
//! Production code propagates errors with `?` and waits on I/O or
//! cancellation, never on a timer. Test modules are exempt.

use architectural_enforcement::{assert_no_violations, production_lines};

const PANICKING: [&str; 5] = [".unwrap()", ".expect(", "panic!(", "todo!(", "unimplemented!("];

const SLEEPING: [&str; 2] = ["thread::sleep(", "time::sleep("];

#[test]
fn test_no_panicking_shortcuts_in_production_code() {
    let violations: Vec<String> = production_lines()
        .iter()
        .filter(|line| PANICKING.iter().any(|p| line.code.contains(p)))
        .map(|line| line.report("Panicking call"))
        .collect();

    assert_no_violations("Panicking calls in production code", &violations);
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = production_lines()
        .iter()
        .filter(|line| SLEEPING.iter().any(|s| line.code.contains(s)))
        .map(|line| line.report("Sleep call"))
        .collect();

    assert_no_violations("Sleep in production code", &violations);
}
