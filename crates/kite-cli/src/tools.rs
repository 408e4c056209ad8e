//! Tools the CLI registers on its sessions.

use std::path::{Path, PathBuf};

use kite_core::tools::ToolParameterSchema;
use kite_tools::{FnTool, ToolContext, ToolError};
use serde::Deserialize;
use serde_json::json;

/// Name of the directory-listing tool.
pub const LIST_FILES_TOOL: &str = "list_local_files";

#[derive(Debug, Default, Deserialize)]
struct ListFilesParams {
    #[serde(default)]
    directory: Option<String>,
}

/// `list_local_files`: names of the entries in a directory.
///
/// Calls that omit `directory` list `default_dir`. A leading `~` expands to
/// `$HOME`. Listing failures are reported as tool output rather than a
/// failed call, so the model can tell the user what went wrong.
pub fn list_local_files(default_dir: String) -> FnTool {
    let schema = ToolParameterSchema::object().property(
        "directory",
        json!({
            "type": "string",
            "description": "Absolute or relative directory path. Defaults to the current directory."
        }),
        false,
    );
    FnTool::typed(
        LIST_FILES_TOOL,
        "Get files in a local directory",
        schema,
        move |params: ListFilesParams, _ctx: ToolContext| {
            let directory = params.directory.unwrap_or_else(|| default_dir.clone());
            async move { Ok::<_, ToolError>(describe_directory(&directory).await) }
        },
    )
}

async fn describe_directory(directory: &str) -> String {
    match read_names(&expand_home(directory)).await {
        Ok(names) => format!("Files in {directory}:\n{}", names.join("\n")),
        Err(e) => format!("Error listing files in {directory}: {e}"),
    }
}

async fn read_names(path: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn expand_home(directory: &str) -> PathBuf {
    if let Some(rest) = directory.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(format!("{home}{rest}"));
            }
        }
    }
    PathBuf::from(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kite_core::ids::{SessionId, ToolCallId};
    use kite_tools::KiteTool;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext {
            tool_call_id: ToolCallId::from("call-1"),
            session_id: SessionId::from("s1"),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn lists_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let path = dir.path().display().to_string();

        let tool = list_local_files(".".into());
        let out = tool.execute(json!({ "directory": path }), &ctx()).await.unwrap();
        assert_eq!(out, format!("Files in {path}:\na.txt\nb.txt"));
    }

    #[tokio::test]
    async fn missing_directory_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.md"), "").unwrap();
        let path = dir.path().display().to_string();

        let tool = list_local_files(path.clone());
        let out = tool.execute(serde_json::Value::Null, &ctx()).await.unwrap();
        assert_eq!(out, format!("Files in {path}:\nonly.md"));
    }

    #[tokio::test]
    async fn unreadable_directory_is_reported_as_output() {
        let tool = list_local_files(".".into());
        let out = tool
            .execute(json!({ "directory": "/definitely/not/here" }), &ctx())
            .await
            .unwrap();
        assert!(out.starts_with("Error listing files in /definitely/not/here:"));
    }

    #[test]
    fn definition_names_the_tool() {
        let tool = list_local_files(".".into());
        assert_eq!(tool.name(), LIST_FILES_TOOL);
        assert_eq!(tool.definition().description, "Get files in a local directory");
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("./src"), PathBuf::from("./src"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
    }
}
