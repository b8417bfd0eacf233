//! Path sandbox guard.
//!
//! Every filesystem-touching tool resolves its target through [`Sandbox::resolve`]
//! before doing any I/O. The guard canonicalizes both the base directory and
//! the target (following symlinks for every component that exists) and then
//! requires a component-wise prefix match, so `/base2` never satisfies a
//! `/base` boundary and a symlink pointing outside the base is rejected.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path escapes the working directory: {0}")]
    PathEscape(String),

    #[error("Working directory is not accessible: {0}: {1}")]
    InvalidBase(String, io::Error),

    #[error("Failed to resolve {0}: {1}")]
    Resolve(String, io::Error),
}

/// A fixed, canonicalized sandbox root.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalize `base` and use it as the boundary.
    pub fn new(base: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let base = base.as_ref();
        let root = base
            .canonicalize()
            .map_err(|e| SandboxError::InvalidBase(base.display().to_string(), e))?;
        if !root.is_dir() {
            return Err(SandboxError::InvalidBase(
                base.display().to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        Ok(Self { root })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative or absolute path against the root.
    ///
    /// The target does not need to exist (writes create it), but every
    /// existing ancestor is canonicalized so symlinks cannot be used to leave
    /// the root.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, SandboxError> {
        let candidate = self.root.join(input);
        let resolved = canonicalize_lenient(&candidate)
            .map_err(|e| SandboxError::Resolve(input.to_string(), e))?;

        match resolved {
            Some(path) if path.starts_with(&self.root) => Ok(path),
            _ => Err(SandboxError::PathEscape(input.to_string())),
        }
    }

    /// Express an absolute path under the root relative to it, for display.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Resolve `input` against `base` in one call.
pub fn resolve(base: impl AsRef<Path>, input: &str) -> Result<PathBuf, SandboxError> {
    Sandbox::new(base)?.resolve(input)
}

/// Canonicalize the longest existing prefix of `path`, then append the
/// remaining components lexically.
///
/// Returns `Ok(None)` if the lexical tail climbs above the filesystem root.
fn canonicalize_lenient(path: &Path) -> io::Result<Option<PathBuf>> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    let mut base = loop {
        match existing.canonicalize() {
            Ok(canon) => break canon,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = match existing.components().next_back() {
                    Some(Component::Normal(name)) => name.to_os_string(),
                    Some(Component::ParentDir) => "..".into(),
                    Some(Component::CurDir) => ".".into(),
                    _ => return Err(e),
                };
                tail.push(name);
                if !existing.pop() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    };

    for name in tail.into_iter().rev() {
        match name.to_str() {
            Some(".") => {}
            Some("..") => {
                if !base.pop() {
                    return Ok(None);
                }
            }
            _ => base.push(name),
        }
    }
    Ok(Some(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, Sandbox) {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn resolves_plain_relative_path() {
        let (_dir, sb) = sandbox();
        let path = sb.resolve("src/main.rs").unwrap();
        assert_eq!(path, sb.root().join("src").join("main.rs"));
    }

    #[test]
    fn dot_resolves_to_root() {
        let (_dir, sb) = sandbox();
        assert_eq!(sb.resolve(".").unwrap(), sb.root());
    }

    #[test]
    fn inner_parent_segments_are_allowed() {
        let (dir, sb) = sandbox();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        assert_eq!(sb.resolve("a/../b.txt").unwrap(), sb.root().join("b.txt"));
        assert_eq!(sb.resolve("new/../b.txt").unwrap(), sb.root().join("b.txt"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let (_dir, sb) = sandbox();
        for input in ["..", "../etc/passwd", "a/../../x", "missing/../../x"] {
            assert!(
                matches!(sb.resolve(input), Err(SandboxError::PathEscape(ref p)) if p == input),
                "{input} should escape"
            );
        }
    }

    #[test]
    fn absolute_path_outside_is_rejected() {
        let (_dir, sb) = sandbox();
        assert!(matches!(
            sb.resolve("/etc/passwd"),
            Err(SandboxError::PathEscape(_))
        ));
    }

    #[test]
    fn absolute_path_inside_is_allowed() {
        let (_dir, sb) = sandbox();
        let inside = sb.root().join("file.txt");
        let resolved = sb.resolve(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[test]
    fn sibling_with_common_prefix_is_rejected() {
        let parent = TempDir::new().unwrap();
        let base = parent.path().join("base");
        let sibling = parent.path().join("base2");
        std::fs::create_dir(&base).unwrap();
        std::fs::create_dir(&sibling).unwrap();

        let sb = Sandbox::new(&base).unwrap();
        assert!(matches!(
            sb.resolve("../base2/file"),
            Err(SandboxError::PathEscape(_))
        ));
        let absolute = sibling.canonicalize().unwrap().join("file");
        assert!(matches!(
            sb.resolve(absolute.to_str().unwrap()),
            Err(SandboxError::PathEscape(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (dir, sb) = sandbox();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        assert!(matches!(
            sb.resolve("link/secret"),
            Err(SandboxError::PathEscape(_))
        ));
        assert!(matches!(
            sb.resolve("link/not-yet-created"),
            Err(SandboxError::PathEscape(_))
        ));
    }

    #[test]
    fn missing_base_is_invalid() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            Sandbox::new(&missing),
            Err(SandboxError::InvalidBase(_, _))
        ));
    }

    #[test]
    fn free_function_matches_method() {
        let (dir, sb) = sandbox();
        assert_eq!(resolve(dir.path(), "x").unwrap(), sb.resolve("x").unwrap());
        assert!(resolve(dir.path(), "../x").is_err());
    }
}
