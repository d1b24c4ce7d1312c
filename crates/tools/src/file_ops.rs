//! Workspace-rooted file I/O.
//!
//! Every path is resolved against the workspace root; components escaping
//! the root (`..`, absolute paths outside it) are rejected before any I/O.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct FileReadRequest {
    pub path: String,
    /// Line number to start from (0-indexed).
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileWriteRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReadResponse {
    pub path: String,
    pub content: String,
    pub total_lines: usize,
}

/// Resolve a user-supplied relative path inside the workspace root.
///
/// Rejects absolute paths and any `..` component; the result always lives
/// under `root`.
pub fn resolve_in_workspace(root: &Path, raw: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(format!("absolute paths are not allowed: {raw}"));
    }
    let mut resolved = root.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(format!("path escapes the workspace: {raw}")),
        }
    }
    Ok(resolved)
}

/// Read a file (optionally a line window) from the workspace.
pub async fn read_file(root: &Path, req: FileReadRequest) -> Result<FileReadResponse, String> {
    let path = resolve_in_workspace(root, &req.path)?;
    let raw = fs::read_to_string(&path)
        .await
        .map_err(|e| format!("read {}: {e}", req.path))?;

    let lines: Vec<&str> = raw.lines().collect();
    let total_lines = lines.len();
    let offset = req.offset.unwrap_or(0).min(total_lines);
    let limit = req.limit.unwrap_or(total_lines);
    let window = lines[offset..(offset + limit).min(total_lines)].join("\n");

    Ok(FileReadResponse {
        path: req.path,
        content: window,
        total_lines,
    })
}

/// Write (create or replace) a file in the workspace.
pub async fn write_file(root: &Path, req: FileWriteRequest) -> Result<String, String> {
    let path = resolve_in_workspace(root, &req.path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("mkdir for {}: {e}", req.path))?;
    }
    fs::write(&path, req.content.as_bytes())
        .await
        .map_err(|e| format!("write {}: {e}", req.path))?;
    Ok(format!("wrote {} bytes to {}", req.content.len(), req.path))
}
