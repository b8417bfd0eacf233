//! Code search tools: glob and regex grep.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use super::fs::display_relative;
use super::{truncate_chars, ToolError, ToolResult};
use crate::config::ToolLimits;
use crate::sandbox::{Sandbox, SandboxError};

/// Directories never descended into by grep.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".next",
];

pub async fn glob_files(sandbox: &Sandbox, pattern: &str, max_results: usize) -> ToolResult<String> {
    let pattern_path = Path::new(pattern);
    if pattern_path.is_absolute()
        || pattern_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(SandboxError::PathEscape(pattern.to_string()).into());
    }

    let sandbox = sandbox.clone();
    let pattern = pattern.to_string();
    tokio::task::spawn_blocking(move || glob_blocking(&sandbox, &pattern, max_results))
        .await
        .map_err(|e| ToolError::Failed(format!("glob task failed: {}", e)))?
}

fn glob_blocking(sandbox: &Sandbox, pattern: &str, max_results: usize) -> ToolResult<String> {
    let root = glob::Pattern::escape(&sandbox.root().to_string_lossy());
    let full_pattern = Path::new(&root).join(pattern);
    let paths = glob::glob(&full_pattern.to_string_lossy())
        .map_err(|e| ToolError::InvalidGlob(e.to_string()))?;

    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .filter(|p| inside(sandbox, p))
        .map(|p| display_relative(sandbox, &p))
        .collect();

    if matches.is_empty() {
        return Ok(format!("No files found matching pattern: {}", pattern));
    }
    matches.sort();

    let total = matches.len();
    matches.truncate(max_results);
    let mut out = matches.join("\n");
    if total > max_results {
        out.push_str(&format!("\n... ({} more files)", total - max_results));
    }
    Ok(out)
}

/// Symlinks may point out of the sandbox even when the name matches.
fn inside(sandbox: &Sandbox, path: &Path) -> bool {
    path.canonicalize()
        .map(|c| c.starts_with(sandbox.root()))
        .unwrap_or(false)
}

pub async fn grep(
    sandbox: &Sandbox,
    pattern: &str,
    path: &str,
    limits: &ToolLimits,
) -> ToolResult<String> {
    let regex = Regex::new(pattern).map_err(|e| ToolError::InvalidRegex(e.to_string()))?;
    let target = sandbox.resolve(path)?;
    if !target.exists() {
        return Err(ToolError::NotFound(path.to_string()));
    }

    let sandbox = sandbox.clone();
    let limits = limits.clone();
    let (matches, capped) =
        tokio::task::spawn_blocking(move || grep_blocking(&sandbox, &regex, &target, &limits))
            .await
            .map_err(|e| ToolError::Failed(format!("grep task failed: {}", e)))?;

    if matches.is_empty() {
        return Ok(format!("No matches found for pattern: {}", pattern));
    }
    let shown = matches.len();
    let mut out = matches.join("\n");
    if capped {
        out.push_str(&format!("\n\n... (showing first {} matches)", shown));
    }
    Ok(out)
}

/// Scan files in walk order. The flag is set only when a match beyond the cap was seen.
fn grep_blocking(
    sandbox: &Sandbox,
    regex: &Regex,
    target: &Path,
    limits: &ToolLimits,
) -> (Vec<String>, bool) {
    let mut results = Vec::new();
    for file in candidate_files(sandbox, target) {
        if std::fs::metadata(&file).map_or(true, |m| m.len() > limits.grep_max_file_bytes) {
            tracing::debug!("grep skipping {}", file.display());
            continue;
        }
        // Unreadable or non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = display_relative(sandbox, &file);
        for (idx, line) in content.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if results.len() == limits.grep_max_results {
                return (results, true);
            }
            results.push(format!(
                "{}:{}: {}",
                rel,
                idx + 1,
                truncate_chars(line.trim_end(), limits.grep_line_max_chars, "...")
            ));
        }
    }
    (results, false)
}

fn candidate_files<'a>(
    sandbox: &'a Sandbox,
    target: &Path,
) -> Box<dyn Iterator<Item = PathBuf> + 'a> {
    if target.is_file() {
        return Box::new(std::iter::once(target.to_path_buf()));
    }
    let walk = WalkDir::new(target)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && e.file_name()
                        .to_str()
                        .is_some_and(|name| SKIP_DIRS.contains(&name)))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(move |p| p.starts_with(sandbox.root()));
    Box::new(walk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Sandbox) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::write(dir.path().join("src/nested/mod.rs"), "fn alpha_two() {}\n").unwrap();
        std::fs::write(dir.path().join(".git/config"), "alpha in git\n").unwrap();
        std::fs::write(dir.path().join("target/out.rs"), "fn alpha_built() {}\n").unwrap();
        std::fs::write(dir.path().join("blob.bin"), [b'a', 0xff, 0xfe, b'\n']).unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[tokio::test]
    async fn glob_returns_sorted_relative_paths() {
        let (_dir, sb) = setup();
        let out = glob_files(&sb, "src/**/*.rs", 100).await.unwrap();
        assert_eq!(out, "src/lib.rs\nsrc/nested/mod.rs");
    }

    #[tokio::test]
    async fn glob_no_match_is_informational() {
        let (_dir, sb) = setup();
        let out = glob_files(&sb, "**/*.py", 100).await.unwrap();
        assert_eq!(out, "No files found matching pattern: **/*.py");
    }

    #[tokio::test]
    async fn glob_is_capped() {
        let (_dir, sb) = setup();
        let out = glob_files(&sb, "src/**/*.rs", 1).await.unwrap();
        assert_eq!(out, "src/lib.rs\n... (1 more files)");
    }

    #[tokio::test]
    async fn glob_rejects_escaping_patterns() {
        let (_dir, sb) = setup();
        assert!(matches!(
            glob_files(&sb, "../**", 10).await,
            Err(ToolError::Sandbox(SandboxError::PathEscape(_)))
        ));
        assert!(matches!(
            glob_files(&sb, "/etc/*", 10).await,
            Err(ToolError::Sandbox(SandboxError::PathEscape(_)))
        ));
    }

    #[tokio::test]
    async fn grep_skips_noise_dirs_and_binary_files() {
        let (_dir, sb) = setup();
        let out = grep(&sb, "alpha", ".", &ToolLimits::default()).await.unwrap();
        assert_eq!(
            out,
            "src/lib.rs:1: pub fn alpha() {}\nsrc/nested/mod.rs:1: fn alpha_two() {}"
        );
    }

    #[tokio::test]
    async fn grep_single_file_and_no_match() {
        let (_dir, sb) = setup();
        let out = grep(&sb, "beta", "src/lib.rs", &ToolLimits::default())
            .await
            .unwrap();
        assert_eq!(out, "src/lib.rs:2: fn beta() {}");

        let out = grep(&sb, "gamma", "src", &ToolLimits::default()).await.unwrap();
        assert_eq!(out, "No matches found for pattern: gamma");
    }

    #[tokio::test]
    async fn grep_invalid_regex() {
        let (_dir, sb) = setup();
        let err = grep(&sb, "fn (", ".", &ToolLimits::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid regex"));
    }

    #[tokio::test]
    async fn grep_stops_at_result_cap() {
        let (_dir, sb) = setup();
        let limits = ToolLimits {
            grep_max_results: 1,
            ..ToolLimits::default()
        };
        let out = grep(&sb, "fn", ".", &limits).await.unwrap();
        assert_eq!(
            out,
            "src/lib.rs:1: pub fn alpha() {}\n\n... (showing first 1 matches)"
        );
    }

    #[tokio::test]
    async fn grep_exactly_at_cap_has_no_note() {
        let (_dir, sb) = setup();
        let limits = ToolLimits {
            grep_max_results: 2,
            ..ToolLimits::default()
        };
        let out = grep(&sb, "alpha", ".", &limits).await.unwrap();
        assert_eq!(
            out,
            "src/lib.rs:1: pub fn alpha() {}\nsrc/nested/mod.rs:1: fn alpha_two() {}"
        );
    }

    #[tokio::test]
    async fn grep_skips_oversized_files() {
        let (dir, sb) = setup();
        std::fs::write(dir.path().join("huge.log"), format!("alpha\n{}", "x".repeat(4096))).unwrap();
        let limits = ToolLimits {
            grep_max_file_bytes: 1024,
            ..ToolLimits::default()
        };
        let out = grep(&sb, "alpha", ".", &limits).await.unwrap();
        assert!(!out.contains("huge.log"));
        assert!(out.starts_with("src/lib.rs:1:"));
    }

    #[tokio::test]
    async fn glob_works_under_root_with_metacharacters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj[1]");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "").unwrap();
        let sb = Sandbox::new(&root).unwrap();
        let out = glob_files(&sb, "src/*.rs", 10).await.unwrap();
        assert_eq!(out, "src/lib.rs");
    }

    #[tokio::test]
    async fn grep_truncates_long_lines() {
        let (dir, sb) = setup();
        std::fs::write(dir.path().join("long.txt"), format!("needle{}", "x".repeat(500))).unwrap();
        let limits = ToolLimits {
            grep_line_max_chars: 10,
            ..ToolLimits::default()
        };
        let out = grep(&sb, "needle", "long.txt", &limits).await.unwrap();
        assert_eq!(out, "long.txt:1: needlexxxx...");
    }
}
