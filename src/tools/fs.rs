//! File tools: read, write, edit, list.

use std::io::ErrorKind;
use std::path::Path;

use super::{ToolError, ToolResult};
use crate::sandbox::Sandbox;

pub async fn read_file(sandbox: &Sandbox, path: &str) -> ToolResult<String> {
    let full = sandbox.resolve(path)?;
    let meta = match tokio::fs::metadata(&full).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ToolError::NotFound(path.to_string())),
        Err(e) => return Err(ToolError::io(format!("Failed to read {}", path), e)),
    };
    if !meta.is_file() {
        return Err(ToolError::NotAFile(path.to_string()));
    }

    let bytes = tokio::fs::read(&full)
        .await
        .map_err(|e| ToolError::io(format!("Failed to read {}", path), e))?;
    String::from_utf8(bytes)
        .map_err(|_| ToolError::Failed(format!("File is not valid UTF-8 text: {}", path)))
}

/// Write through a sibling temp file and rename it into place.
pub async fn write_file(sandbox: &Sandbox, path: &str, content: &str) -> ToolResult<String> {
    let full = sandbox.resolve(path)?;
    if full.is_dir() {
        return Err(ToolError::NotAFile(path.to_string()));
    }
    let parent = full
        .parent()
        .ok_or_else(|| ToolError::Failed(format!("Invalid file path: {}", path)))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ToolError::io(format!("Failed to create directories for {}", path), e))?;

    let file_name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ToolError::io(format!("Failed to write {}", path), e));
    }
    // The replacement keeps the mode of the file it replaces.
    if let Ok(existing) = tokio::fs::metadata(&full).await {
        if let Err(e) = tokio::fs::set_permissions(&tmp, existing.permissions()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ToolError::io(format!("Failed to write {}", path), e));
        }
    }
    if let Err(e) = tokio::fs::rename(&tmp, &full).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ToolError::io(format!("Failed to write {}", path), e));
    }

    tracing::info!("Wrote {} bytes to {}", content.len(), full.display());
    Ok(format!("Successfully wrote {} bytes to {}", content.len(), path))
}

/// Replace the first occurrence of `old` with `new`.
pub async fn edit_file(sandbox: &Sandbox, path: &str, old: &str, new: &str) -> ToolResult<String> {
    if old.is_empty() {
        return Err(ToolError::Failed("old_string must not be empty".to_string()));
    }
    let content = read_file(sandbox, path).await?;
    if !content.contains(old) {
        return Err(ToolError::OldStringNotFound);
    }

    let updated = content.replacen(old, new, 1);
    write_file(sandbox, path, &updated).await?;
    Ok(format!("Successfully edited {}", path))
}

pub async fn list_dir(sandbox: &Sandbox, path: &str, max_entries: usize) -> ToolResult<String> {
    let full = sandbox.resolve(path)?;
    if !full.exists() {
        return Err(ToolError::NotFound(path.to_string()));
    }
    if !full.is_dir() {
        return Err(ToolError::NotADirectory(path.to_string()));
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut reader = tokio::fs::read_dir(&full)
        .await
        .map_err(|e| ToolError::io(format!("Failed to list {}", path), e))?;
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ToolError::io(format!("Failed to list {}", path), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = match entry.file_type().await {
            Ok(t) if t.is_symlink() => tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            Ok(t) => t.is_dir(),
            Err(_) => false,
        };
        if is_dir {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }

    if dirs.is_empty() && files.is_empty() {
        return Ok("(empty directory)".to_string());
    }
    dirs.sort();
    files.sort();

    let total = dirs.len() + files.len();
    let mut lines: Vec<String> = dirs
        .iter()
        .map(|d| format!("[DIR]  {}/", d))
        .chain(files.iter().map(|f| format!("[FILE] {}", f)))
        .take(max_entries)
        .collect();
    if total > max_entries {
        lines.push(format!("... ({} more entries)", total - max_entries));
    }
    Ok(lines.join("\n"))
}

/// Display form of `full` relative to the sandbox root.
pub(crate) fn display_relative(sandbox: &Sandbox, full: &Path) -> String {
    let rel = sandbox.relative(full);
    if rel.as_os_str().is_empty() {
        ".".to_string()
    } else {
        rel.to_string_lossy().into_owned()
    }
}
