//! Workspace-backed file tools.
//!
//! Each tool wraps one workspace primitive behind the [`Tool`] trait,
//! running the blocking filesystem work on the blocking pool. Output is
//! coerced to text the way the reasoning loop and the wire expect it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AgentError, Result, WorkspaceError};
use crate::workspace::{Workspace, WriteMode};

use super::{JsonMap, ParamSpec, Tool, ToolRegistry, ToolSpec};

/// Runs a blocking workspace operation on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, WorkspaceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::Workspace(WorkspaceError::Other(format!("task failed: {e}"))))?
        .map_err(AgentError::Workspace)
}

fn required_str<'a>(args: &'a JsonMap, key: &str, tool: &str) -> Result<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        AgentError::ToolArgument(format!("tool '{tool}' requires string parameter '{key}'"))
    })
}

// ─── Listings ────────────────────────────────────────────────────────────────

pub struct ListFilesTool {
    ws: Arc<Workspace>,
}

const LIST_FILES_SPEC: ToolSpec = ToolSpec {
    name: "list_files",
    description: "List all files in the workspace, sorted by modification time (newest first)",
    params: &[],
    examples: &["list the files", "what files are here?"],
    exposed: true,
};

#[async_trait]
impl Tool for ListFilesTool {
    fn spec(&self) -> &ToolSpec {
        &LIST_FILES_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let files = run_blocking(move || ws.list_files()).await?;
        Ok(if files.is_empty() {
            "No files found in workspace".to_string()
        } else {
            files.join("\n")
        })
    }
}

pub struct ListDirectoriesTool {
    ws: Arc<Workspace>,
}

const LIST_DIRECTORIES_SPEC: ToolSpec = ToolSpec {
    name: "list_directories",
    description: "List only the directories in the workspace (newest first)",
    params: &[],
    examples: &["list directories", "show the folders"],
    exposed: true,
};

#[async_trait]
impl Tool for ListDirectoriesTool {
    fn spec(&self) -> &ToolSpec {
        &LIST_DIRECTORIES_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let dirs = run_blocking(move || ws.list_directories()).await?;
        Ok(if dirs.is_empty() {
            "No directories found in workspace".to_string()
        } else {
            dirs.join("\n")
        })
    }
}

pub struct ListAllTool {
    ws: Arc<Workspace>,
}

const LIST_ALL_SPEC: ToolSpec = ToolSpec {
    name: "list_all",
    description: "List both files and directories (directories suffixed with '/'), newest first",
    params: &[],
    examples: &["list everything", "lista tutti i files e directory"],
    exposed: true,
};

#[async_trait]
impl Tool for ListAllTool {
    fn spec(&self) -> &ToolSpec {
        &LIST_ALL_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let items = run_blocking(move || ws.list_all()).await?;
        Ok(if items.is_empty() {
            "Workspace is empty".to_string()
        } else {
            items.join("\n")
        })
    }
}

pub struct ListTreeTool {
    ws: Arc<Workspace>,
}

const LIST_TREE_SPEC: ToolSpec = ToolSpec {
    name: "list_tree",
    description: "Show the workspace structure as an ASCII tree",
    params: &[],
    examples: &["show the tree", "display the directory structure"],
    exposed: true,
};

#[async_trait]
impl Tool for ListTreeTool {
    fn spec(&self) -> &ToolSpec {
        &LIST_TREE_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        run_blocking(move || ws.list_tree()).await
    }
}

pub struct ListFilesRecursiveTool {
    ws: Arc<Workspace>,
}

const LIST_FILES_RECURSIVE_SPEC: ToolSpec = ToolSpec {
    name: "list_files_recursive",
    description: "List files in all subdirectories as relative paths (newest first)",
    params: &[],
    examples: &["list files including subdirectories"],
    exposed: false,
};

#[async_trait]
impl Tool for ListFilesRecursiveTool {
    fn spec(&self) -> &ToolSpec {
        &LIST_FILES_RECURSIVE_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let files = run_blocking(move || ws.list_files_recursive()).await?;
        Ok(if files.is_empty() {
            "No files found in workspace".to_string()
        } else {
            files.join("\n")
        })
    }
}

// ─── Content ─────────────────────────────────────────────────────────────────

pub struct ReadFileTool {
    ws: Arc<Workspace>,
}

const READ_FILE_SPEC: ToolSpec = ToolSpec {
    name: "read_file",
    description: "Read the content of a file in the workspace",
    params: &[ParamSpec {
        name: "filename",
        ty: "string",
        required: true,
        description: "Name of the file to read",
    }],
    examples: &["read notes.txt", "show me config.json"],
    exposed: true,
};

#[async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> &ToolSpec {
        &READ_FILE_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let filename = required_str(args, "filename", READ_FILE_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        run_blocking(move || ws.read_file(&filename)).await
    }
}

pub struct ReadFileByPathTool {
    ws: Arc<Workspace>,
}

const READ_FILE_BY_PATH_SPEC: ToolSpec = ToolSpec {
    name: "read_file_by_path",
    description: "Read a file by relative path, including files in subdirectories",
    params: &[ParamSpec {
        name: "path",
        ty: "string",
        required: true,
        description: "Relative path of the file to read",
    }],
    examples: &["read src/main.rs"],
    exposed: false,
};

#[async_trait]
impl Tool for ReadFileByPathTool {
    fn spec(&self) -> &ToolSpec {
        &READ_FILE_BY_PATH_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let path = required_str(args, "path", READ_FILE_BY_PATH_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        run_blocking(move || ws.read_file_by_path(&path)).await
    }
}

pub struct WriteFileTool {
    ws: Arc<Workspace>,
}

const WRITE_FILE_SPEC: ToolSpec = ToolSpec {
    name: "write_file",
    description: "Write or append content to a file in the workspace",
    params: &[
        ParamSpec {
            name: "filename",
            ty: "string",
            required: true,
            description: "Name of the file to write",
        },
        ParamSpec {
            name: "content",
            ty: "string",
            required: true,
            description: "Content to write",
        },
        ParamSpec {
            name: "mode",
            ty: "string",
            required: false,
            description: "Write mode: 'overwrite' (default) or 'append'",
        },
    ],
    examples: &["create hello.txt containing 'hi'", "append a line to log.txt"],
    exposed: true,
};

#[async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> &ToolSpec {
        &WRITE_FILE_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let filename = required_str(args, "filename", WRITE_FILE_SPEC.name)?.to_string();
        let content = required_str(args, "content", WRITE_FILE_SPEC.name)?.to_string();
        let mode = match args.get("mode").and_then(Value::as_str) {
            Some(m) => WriteMode::parse(m)?,
            None => WriteMode::Overwrite,
        };
        let ws = Arc::clone(&self.ws);
        run_blocking(move || ws.write_file(&filename, &content, mode)).await
    }
}

pub struct DeleteFileTool {
    ws: Arc<Workspace>,
}

const DELETE_FILE_SPEC: ToolSpec = ToolSpec {
    name: "delete_file",
    description: "Delete a file from the workspace",
    params: &[ParamSpec {
        name: "filename",
        ty: "string",
        required: true,
        description: "Name of the file to delete",
    }],
    examples: &["delete old_notes.txt"],
    exposed: true,
};

#[async_trait]
impl Tool for DeleteFileTool {
    fn spec(&self) -> &ToolSpec {
        &DELETE_FILE_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let filename = required_str(args, "filename", DELETE_FILE_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        run_blocking(move || ws.delete_file(&filename)).await
    }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

pub struct FindFileByNameTool {
    ws: Arc<Workspace>,
}

const FIND_FILE_BY_NAME_SPEC: ToolSpec = ToolSpec {
    name: "find_file_by_name",
    description: "Find a file by exact name anywhere in the workspace",
    params: &[ParamSpec {
        name: "filename",
        ty: "string",
        required: true,
        description: "Exact filename to search for",
    }],
    examples: &["find main.rs"],
    exposed: false,
};

#[async_trait]
impl Tool for FindFileByNameTool {
    fn spec(&self) -> &ToolSpec {
        &FIND_FILE_BY_NAME_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let filename = required_str(args, "filename", FIND_FILE_BY_NAME_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        let name = filename.clone();
        let found = run_blocking(move || ws.find_file_by_name(&name)).await?;
        Ok(match found {
            Some(path) => format!("Found: {path}"),
            None => format!("File '{filename}' not found in workspace"),
        })
    }
}

pub struct FindFilesByPatternTool {
    ws: Arc<Workspace>,
}

const FIND_FILES_BY_PATTERN_SPEC: ToolSpec = ToolSpec {
    name: "find_files_by_pattern",
    description: "Find files whose names contain a pattern (case-insensitive)",
    params: &[ParamSpec {
        name: "pattern",
        ty: "string",
        required: true,
        description: "Substring to match against filenames",
    }],
    examples: &["find files containing 'report'"],
    exposed: false,
};

#[async_trait]
impl Tool for FindFilesByPatternTool {
    fn spec(&self) -> &ToolSpec {
        &FIND_FILES_BY_PATTERN_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let pattern = required_str(args, "pattern", FIND_FILES_BY_PATTERN_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        let needle = pattern.clone();
        let matches = run_blocking(move || ws.find_files_by_pattern(&needle)).await?;
        Ok(if matches.is_empty() {
            format!("No files found matching pattern '{pattern}'")
        } else {
            format!("Files matching pattern '{pattern}':\n{}", matches.join("\n"))
        })
    }
}

pub struct FindLargestFileTool {
    ws: Arc<Workspace>,
}

const FIND_LARGEST_FILE_SPEC: ToolSpec = ToolSpec {
    name: "find_largest_file",
    description: "Find the largest file in the workspace",
    params: &[],
    examples: &["which file is the biggest?"],
    exposed: false,
};

#[async_trait]
impl Tool for FindLargestFileTool {
    fn spec(&self) -> &ToolSpec {
        &FIND_LARGEST_FILE_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let largest = run_blocking(move || ws.find_largest_file()).await?;
        Ok(match largest {
            Some((name, size)) => format!("Largest file: {name} ({size} bytes)"),
            None => "No files found in workspace".to_string(),
        })
    }
}

pub struct ReadNewestFileTool {
    ws: Arc<Workspace>,
}

const READ_NEWEST_FILE_SPEC: ToolSpec = ToolSpec {
    name: "read_newest_file",
    description: "Read the most recently modified file in the workspace",
    params: &[],
    examples: &["what's in the newest file?"],
    exposed: false,
};

#[async_trait]
impl Tool for ReadNewestFileTool {
    fn spec(&self) -> &ToolSpec {
        &READ_NEWEST_FILE_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        let ws = Arc::clone(&self.ws);
        let newest = run_blocking(move || ws.read_newest_file()).await?;
        Ok(match newest {
            Some((name, content)) => format!("Content of newest file '{name}':\n{content}"),
            None => "No files found in workspace".to_string(),
        })
    }
}

pub struct GetFileInfoTool {
    ws: Arc<Workspace>,
}

const GET_FILE_INFO_SPEC: ToolSpec = ToolSpec {
    name: "get_file_info",
    description: "Get metadata about a file: size, modification time, line count, preview",
    params: &[ParamSpec {
        name: "filename",
        ty: "string",
        required: true,
        description: "Name of the file to inspect",
    }],
    examples: &["get info about data.csv"],
    exposed: false,
};

#[async_trait]
impl Tool for GetFileInfoTool {
    fn spec(&self) -> &ToolSpec {
        &GET_FILE_INFO_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let filename = required_str(args, "filename", GET_FILE_INFO_SPEC.name)?.to_string();
        let ws = Arc::clone(&self.ws);
        let info = run_blocking(move || ws.file_info(&filename)).await?;
        let modified: DateTime<Utc> = info.modified.into();
        Ok(format!(
            "File: {}\nSize: {} bytes\nModified: {}\nLines: {}\nPreview:\n{}",
            info.name,
            info.size,
            modified.format("%Y-%m-%d %H:%M:%S"),
            info.lines,
            info.preview
        ))
    }
}

// ─── Help ────────────────────────────────────────────────────────────────────

pub struct HelpTool;

const HELP_SPEC: ToolSpec = ToolSpec {
    name: "help",
    description: "Describe what the agent can do with workspace files",
    params: &[],
    examples: &["help", "what can you do?"],
    exposed: false,
};

#[async_trait]
impl Tool for HelpTool {
    fn spec(&self) -> &ToolSpec {
        &HELP_SPEC
    }

    async fn invoke(&self, _args: &JsonMap) -> Result<String> {
        Ok("I can work with files in your workspace:\n\
            • list files and directories (flat or as a tree)\n\
            • read the content of a file\n\
            • create or update a file with new content\n\
            • delete a file\n\
            • answer questions about what the files contain"
            .to_string())
    }
}

/// Registers every workspace-backed tool plus `help`.
pub fn register_fs_tools(registry: &mut ToolRegistry, ws: &Arc<Workspace>) {
    registry.register(Arc::new(ListFilesTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ListDirectoriesTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ListAllTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ListTreeTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ListFilesRecursiveTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ReadFileTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ReadFileByPathTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(WriteFileTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(DeleteFileTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(FindFileByNameTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(FindFilesByPatternTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(FindLargestFileTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(ReadNewestFileTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(GetFileInfoTool { ws: Arc::clone(ws) }));
    registry.register(Arc::new(HelpTool));
}
