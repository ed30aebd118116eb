//! Sandboxed workspace file primitives.
//!
//! Every operation goes through the same gauntlet: rate-limit check, path
//! validation (see [`crate::security`]), then the size-capped filesystem
//! access. Listings are sorted by modification time, newest first; the tree
//! view sorts directories before files, alphabetically within each group.
//!
//! The workspace is shared across requests. Reads are safe concurrently;
//! concurrent writers to the same filename are last-writer-wins at the OS
//! level, which is acceptable for a single-user workspace.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use ignore::WalkBuilder;

use crate::error::{WorkspaceError, WsResult};
use crate::security;

/// Directory names excluded from recursive listings and the tree view,
/// in addition to anything starting with `.`.
const EXCLUDED_DIRS: &[&str] = &["__pycache__"];

/// Size and rate limits applied to every workspace operation.
#[derive(Debug, Clone, Copy)]
pub struct FsLimits {
    /// Maximum bytes a single read may return.
    pub max_read: u64,
    /// Maximum bytes a single write may accept.
    pub max_write: u64,
    /// Maximum operations per sliding 1-second window.
    pub rate_limit: usize,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_read: 10 * 1024 * 1024,
            max_write: 10 * 1024 * 1024,
            rate_limit: 10,
        }
    }
}

/// Write disposition for [`Workspace::write_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl WriteMode {
    /// Parses the wire forms accepted by the tools (`overwrite`/`w`,
    /// `append`/`a`).
    pub fn parse(s: &str) -> WsResult<Self> {
        match s {
            "overwrite" | "w" => Ok(Self::Overwrite),
            "append" | "a" => Ok(Self::Append),
            other => Err(WorkspaceError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Metadata summary returned by [`Workspace::file_info`].
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub lines: usize,
    pub preview: String,
}

/// A rooted, canonicalized, sandboxed directory.
pub struct Workspace {
    root: PathBuf,
    limits: FsLimits,
    // Sliding 1-second window of operation timestamps. Single short
    // critical section per operation.
    window: Mutex<VecDeque<Instant>>,
}

impl Workspace {
    /// Opens (creating if necessary) a workspace rooted at `root`.
    pub fn open(root: impl AsRef<Path>, limits: FsLimits) -> WsResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .map_err(|e| WorkspaceError::Other(format!("cannot create workspace root: {e}")))?;
        let root = dunce::canonicalize(root)
            .map_err(|e| WorkspaceError::Other(format!("cannot canonicalize workspace root: {e}")))?;
        if !root.is_dir() {
            return Err(WorkspaceError::Other(format!(
                "workspace root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            limits,
            window: Mutex::new(VecDeque::new()),
        })
    }

    /// The absolute workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> FsLimits {
        self.limits
    }

    /// Records one operation against the sliding window, failing fast when
    /// the window is full. Never blocks.
    fn check_rate_limit(&self) -> WsResult<()> {
        let now = Instant::now();
        let cutoff = now - Duration::from_secs(1);
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        while window.front().is_some_and(|t| *t <= cutoff) {
            window.pop_front();
        }
        if window.len() >= self.limits.rate_limit {
            return Err(WorkspaceError::RateLimit {
                current: window.len(),
                limit: self.limits.rate_limit,
            });
        }
        window.push_back(now);
        Ok(())
    }

    /// Resolves a single-segment filename against the root.
    fn safe_join(&self, name: &str) -> WsResult<PathBuf> {
        security::safe_join(&self.root, name)
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Lists top-level files, newest first. Hidden files are skipped.
    pub fn list_files(&self) -> WsResult<Vec<String>> {
        self.check_rate_limit()?;
        self.top_level_entries(EntryKind::Files)
    }

    /// Lists top-level directories, newest first. Hidden dirs are skipped.
    pub fn list_directories(&self) -> WsResult<Vec<String>> {
        self.check_rate_limit()?;
        self.top_level_entries(EntryKind::Dirs)
    }

    /// Lists top-level files and directories, newest first; directories are
    /// suffixed with `/`.
    pub fn list_all(&self) -> WsResult<Vec<String>> {
        self.check_rate_limit()?;
        self.top_level_entries(EntryKind::All)
    }

    fn top_level_entries(&self, kind: EntryKind) -> WsResult<Vec<String>> {
        let mut entries: Vec<(String, SystemTime)> = Vec::new();
        let read_dir = fs::read_dir(&self.root)
            .map_err(|e| WorkspaceError::Other(format!("failed to list workspace: {e}")))?;
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue; // skip entries we cannot stat
            };
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            match kind {
                EntryKind::Files if meta.is_file() => entries.push((name, mtime)),
                EntryKind::Dirs if meta.is_dir() => entries.push((name, mtime)),
                EntryKind::All => {
                    if meta.is_file() {
                        entries.push((name, mtime));
                    } else if meta.is_dir() {
                        entries.push((format!("{name}/"), mtime));
                    }
                }
                _ => {}
            }
        }
        // Newest first
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(entries.into_iter().map(|(name, _)| name).collect())
    }

    /// Lists files recursively as root-relative paths, newest first.
    /// Directories starting with `.` and `__pycache__` are not descended.
    pub fn list_files_recursive(&self) -> WsResult<Vec<String>> {
        self.check_rate_limit()?;
        Ok(self
            .walk_recursive()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn walk_recursive(&self) -> WsResult<Vec<(String, SystemTime)>> {
        let mut entries: Vec<(String, SystemTime)> = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(true)
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !EXCLUDED_DIRS.contains(&name.as_ref())
            })
            .build();
        for entry in walker.flatten() {
            let path = entry.path();
            if path == self.root {
                continue;
            }
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((rel.to_string_lossy().into_owned(), mtime));
        }
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(entries)
    }

    /// Reads up to `max_files` files recursively for analysis, truncating
    /// each to `max_chars` characters. Charged as a single operation against
    /// the rate window; the analysis tool reads many files per request.
    pub fn sample_files(
        &self,
        max_files: usize,
        max_chars: usize,
    ) -> WsResult<Vec<(String, String)>> {
        self.check_rate_limit()?;
        let mut out = Vec::new();
        for (rel, _) in self.walk_recursive()?.into_iter().take(max_files) {
            let Ok(path) = security::safe_join_relative(&self.root, &rel) else {
                continue;
            };
            let content = match self.read_checked(&path, &rel) {
                Ok(c) => c,
                Err(_) => continue, // unreadable or oversized files are skipped
            };
            let truncated: String = content.chars().take(max_chars).collect();
            out.push((rel, truncated));
        }
        Ok(out)
    }

    /// Renders an ASCII tree of the workspace, directories first then files,
    /// alphabetically within each group.
    pub fn list_tree(&self) -> WsResult<String> {
        self.check_rate_limit()?;
        let workspace_name = self
            .root
            .file_name()
            .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());
        let mut lines = vec![format!("{workspace_name}/")];
        let mut children = Vec::new();
        build_tree(&self.root, "", &mut children)?;
        if children.is_empty() {
            lines.push("└── (empty)".to_string());
        } else {
            lines.extend(children);
        }
        Ok(lines.join("\n"))
    }

    // ------------------------------------------------------------------
    // File content
    // ------------------------------------------------------------------

    /// Reads a top-level file, enforcing the read size cap.
    pub fn read_file(&self, name: &str) -> WsResult<String> {
        self.check_rate_limit()?;
        let path = self.safe_join(name)?;
        self.read_checked(&path, name)
    }

    /// Reads a file by root-relative path (subdirectories allowed).
    pub fn read_file_by_path(&self, rel_path: &str) -> WsResult<String> {
        self.check_rate_limit()?;
        let path = security::safe_join_relative(&self.root, rel_path)?;
        self.read_checked(&path, rel_path)
    }

    fn read_checked(&self, path: &Path, display_name: &str) -> WsResult<String> {
        if !path.exists() {
            return Err(WorkspaceError::FileNotFound {
                name: display_name.to_string(),
            });
        }
        if !path.is_file() {
            return Err(WorkspaceError::Other(format!(
                "path is not a file: {display_name}"
            )));
        }
        let size = fs::metadata(path)
            .map_err(|e| WorkspaceError::Other(format!("cannot stat '{display_name}': {e}")))?
            .len();
        if size > self.limits.max_read {
            return Err(WorkspaceError::SizeLimitExceeded {
                operation: "read",
                actual: size,
                limit: self.limits.max_read,
            });
        }
        match fs::read(path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => Err(WorkspaceError::Other(format!(
                "cannot read '{display_name}': {e}"
            ))),
        }
    }

    /// Writes (or appends) UTF-8 content, enforcing the write size cap.
    /// Returns a short confirmation message. Nothing is written on failure.
    pub fn write_file(&self, name: &str, content: &str, mode: WriteMode) -> WsResult<String> {
        self.check_rate_limit()?;
        let payload = content.as_bytes();
        if payload.len() as u64 > self.limits.max_write {
            return Err(WorkspaceError::SizeLimitExceeded {
                operation: "write",
                actual: payload.len() as u64,
                limit: self.limits.max_write,
            });
        }
        let path = self.safe_join(name)?;
        let result = match mode {
            WriteMode::Overwrite => fs::write(&path, payload),
            WriteMode::Append => fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| std::io::Write::write_all(&mut f, payload)),
        };
        result.map_err(|e| WorkspaceError::Other(format!("cannot write '{name}': {e}")))?;
        let action = match mode {
            WriteMode::Overwrite => "written",
            WriteMode::Append => "appended",
        };
        Ok(format!("Content {action} to {name}"))
    }

    /// Deletes a top-level file. Returns a short confirmation message.
    pub fn delete_file(&self, name: &str) -> WsResult<String> {
        self.check_rate_limit()?;
        let path = self.safe_join(name)?;
        if !path.exists() {
            return Err(WorkspaceError::FileNotFound {
                name: name.to_string(),
            });
        }
        if !path.is_file() {
            return Err(WorkspaceError::Other(format!("path is not a file: {name}")));
        }
        fs::remove_file(&path)
            .map_err(|e| WorkspaceError::Other(format!("cannot delete '{name}': {e}")))?;
        Ok(format!("File deleted: {name}"))
    }

    /// Whether a top-level file exists (path-validated).
    pub fn exists(&self, name: &str) -> WsResult<bool> {
        let path = self.safe_join(name)?;
        Ok(path.exists() && path.is_file())
    }

    // ------------------------------------------------------------------
    // Discovery helpers
    // ------------------------------------------------------------------

    /// Finds a file by exact name anywhere under the root, returning its
    /// root-relative path.
    pub fn find_file_by_name(&self, filename: &str) -> WsResult<Option<String>> {
        let matches = self.list_files_recursive()?;
        Ok(matches.into_iter().find(|rel| {
            Path::new(rel)
                .file_name()
                .is_some_and(|n| n.to_string_lossy() == filename)
        }))
    }

    /// Top-level filenames containing `pattern` (case-insensitive).
    pub fn find_files_by_pattern(&self, pattern: &str) -> WsResult<Vec<String>> {
        let needle = pattern.to_lowercase();
        let files = self.list_files()?;
        Ok(files
            .into_iter()
            .filter(|f| f.to_lowercase().contains(&needle))
            .collect())
    }

    /// Name and size of the largest top-level file, if any.
    pub fn find_largest_file(&self) -> WsResult<Option<(String, u64)>> {
        let files = self.list_files()?;
        let mut largest: Option<(String, u64)> = None;
        for name in files {
            let Ok(path) = self.safe_join(&name) else {
                continue;
            };
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if largest.as_ref().map_or(true, |(_, size)| meta.len() > *size) {
                largest = Some((name, meta.len()));
            }
        }
        Ok(largest)
    }

    /// Content of the most recently modified top-level file.
    pub fn read_newest_file(&self) -> WsResult<Option<(String, String)>> {
        let files = self.list_files()?;
        match files.first() {
            Some(newest) => {
                let content = self.read_file(newest)?;
                Ok(Some((newest.clone(), content)))
            }
            None => Ok(None),
        }
    }

    /// Size, mtime, line count and a 200-char preview for a file.
    pub fn file_info(&self, name: &str) -> WsResult<FileInfo> {
        self.check_rate_limit()?;
        let path = self.safe_join(name)?;
        if !path.exists() || !path.is_file() {
            return Err(WorkspaceError::FileNotFound {
                name: name.to_string(),
            });
        }
        let meta = fs::metadata(&path)
            .map_err(|e| WorkspaceError::Other(format!("cannot stat '{name}': {e}")))?;
        let content = self.read_checked(&path, name)?;
        let preview = if content.len() > 200 {
            let cut = content
                .char_indices()
                .take_while(|(i, _)| *i <= 200)
                .last()
                .map_or(0, |(i, c)| i + c.len_utf8());
            format!("{}...", &content[..cut])
        } else {
            content.clone()
        };
        Ok(FileInfo {
            name: name.to_string(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            lines: content.lines().count(),
            preview,
        })
    }
}

#[derive(Clone, Copy)]
enum EntryKind {
    Files,
    Dirs,
    All,
}

/// Recursively renders one directory level of the tree view.
fn build_tree(dir: &Path, prefix: &str, out: &mut Vec<String>) -> WsResult<()> {
    let mut children: Vec<(String, bool)> = Vec::new();
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => {
            out.push(format!("{prefix}└── [Permission Denied]"));
            return Ok(());
        }
    };
    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || EXCLUDED_DIRS.contains(&name.as_str()) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        children.push((name, is_dir));
    }
    // Directories first, then files, alphabetical within each group.
    children.sort_by(|a, b| (!a.1, a.0.to_lowercase()).cmp(&(!b.1, b.0.to_lowercase())));

    let count = children.len();
    for (i, (name, is_dir)) in children.into_iter().enumerate() {
        let is_last = i == count - 1;
        let connector = if is_last { "└── " } else { "├── " };
        let display = if is_dir { format!("{name}/") } else { name.clone() };
        out.push(format!("{prefix}{connector}{display}"));
        if is_dir {
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            build_tree(&dir.join(&name), &child_prefix, out)?;
        }
    }
    Ok(())
}
