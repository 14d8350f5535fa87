//! Utility functions shared by the pipeline stages.
//!
//! - String truncation for logging
//! - HTTP client construction
//! - Output path resolution and writability checks
//! - Worker count detection

use reqwest::Client;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Filename used when the output path is absent or a directory.
pub const DEFAULT_OUTPUT_FILE: &str = "articles.csv";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` bytes (backing off to a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Build the HTTP client shared by one cooperative scope.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Number of harvest workers to run: one per available CPU.
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve where the Sink appends its rows.
///
/// - no path: `articles.csv` in the working directory
/// - an existing directory: `articles.csv` inside it
/// - anything else: the path itself
pub fn resolve_output_path(path: Option<&Path>) -> PathBuf {
    match path {
        None => PathBuf::from(DEFAULT_OUTPUT_FILE),
        Some(p) if p.is_dir() => p.join(DEFAULT_OUTPUT_FILE),
        Some(p) => p.to_path_buf(),
    }
}

/// Ensure the output file's directory exists and the file can be opened for append.
///
/// Runs before any stage starts so a bad path is reported before harvesting.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn ensure_appendable(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
        debug!(parent = %parent.display(), "Output directory ready");
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    info!("Output file is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_char_boundary() {
        let s = "éééé";
        assert_eq!(truncate_for_log(s, 3), "é…(+6 bytes)");
    }

    #[test]
    fn test_resolve_output_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_output_path(None), PathBuf::from("articles.csv"));
        assert_eq!(
            resolve_output_path(Some(dir.path())),
            dir.path().join("articles.csv")
        );
        let file = dir.path().join("out.csv");
        assert_eq!(resolve_output_path(Some(&file)), file);
    }

    #[test]
    fn test_ensure_appendable_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/articles.csv");
        ensure_appendable(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_available_workers_nonzero() {
        assert!(available_workers() >= 1);
    }
}
