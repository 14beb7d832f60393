//! Architectural enforcement helpers
//!
//! Source scanning shared by the integration tests in `tests/`. The tests
//! hold the workspace's production code to a few rules:
//! - No blocking I/O inside async functions
//! - No sleeping or panicking shortcuts in production paths
//!
//! Scanning is line-based. Everything after a file's first `#[cfg(test)]`
//! is treated as test code and ignored.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_ROOTS: [&str; 2] = ["chat/core/src", "chat/cli/src"];

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
    /// Signature line of the enclosing function, if any
    pub enclosing_fn: Option<String>,
}

impl SourceLine {
    /// Whether the enclosing function is `async`
    pub fn in_async_fn(&self) -> bool {
        self.enclosing_fn
            .as_deref()
            .is_some_and(|sig| sig.contains("async fn"))
    }

    /// `path:line - label: code` for failure reports
    pub fn report(&self, label: &str) -> String {
        format!(
            "{}:{} - {label}: {}",
            self.path.display(),
            self.number,
            self.code.trim()
        )
    }
}

/// Workspace root, two levels above this crate
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under the production roots
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files: Vec<PathBuf> = PRODUCTION_ROOTS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.exists())
        .flat_map(|dir| {
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
                .map(walkdir::DirEntry::into_path)
        })
        .collect();
    files.sort();
    files
}

/// Production lines of every production file
pub fn production_lines() -> Vec<SourceLine> {
    production_files()
        .iter()
        .filter_map(|path| {
            let content = fs::read_to_string(path).ok()?;
            Some(scan(path, &content))
        })
        .flatten()
        .collect()
}

/// Split `content` into production lines, stopping at `#[cfg(test)]`
pub fn scan(path: &Path, content: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut enclosing_fn: Option<String> = None;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        if is_fn_signature(trimmed) {
            enclosing_fn = Some(trimmed.to_string());
        }

        let code = line.split("//").next().unwrap_or(line);
        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: code.to_string(),
            enclosing_fn: enclosing_fn.clone(),
        });
    }

    lines
}

fn is_fn_signature(trimmed: &str) -> bool {
    trimmed.starts_with("fn ") || trimmed.contains(" fn ")
}

/// Panic with every violation listed
pub fn assert_no_violations(rule: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n{rule}: {} violation(s)\n", violations.len());
    for violation in violations {
        eprintln!("  {violation}");
    }
    panic!("\n{rule}: found {} violation(s)", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_stops_at_test_module() {
        let src = "fn a() {}\n#[cfg(test)]\nmod tests { fn b() { x.unwrap(); } }\n";
        let lines = scan(Path::new("x.rs"), src);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_scan_tracks_enclosing_fn() {
        let src = "pub async fn go() {\n    work().await;\n}\nfn sync() {\n    std::fs::read(p);\n}\n";
        let lines = scan(Path::new("x.rs"), src);
        assert!(lines[1].in_async_fn());
        assert!(!lines[4].in_async_fn());
    }

    #[test]
    fn test_scan_strips_comments() {
        let src = "// std::fs::read\nlet a = 1; // .unwrap()\n";
        let lines = scan(Path::new("x.rs"), src);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].code.trim(), "let a = 1;");
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("orchestrator.rs")));
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
    }
}
