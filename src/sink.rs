//! Result sink - persists each task's textual outcome
//!
//! One write per completed task, to a deterministically derived filename:
//! conversation handle, sibling-local task id, sanitized title and an
//! extension inferred from the content. A failed write is reported to the
//! caller but never blocks in-memory aggregation.

use std::path::PathBuf;
use async_trait::async_trait;
use tracing::info;

use crate::error::PhalanxError;
use crate::protocol::{ConversationId, SubtaskId};

/// Where completed outcomes go.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, file_name: &str, content: &str) -> Result<(), PhalanxError>;
}

/// Sink that writes outcomes as files under one directory.
pub struct FsResultSink {
    root: PathBuf,
}

impl FsResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResultSink for FsResultSink {
    async fn write(&self, file_name: &str, content: &str) -> Result<(), PhalanxError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(file_name);
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), "Outcome written");
        Ok(())
    }
}

/// Derive the outcome filename for a completed task.
pub fn outcome_file_name(
    conversation: ConversationId,
    task_id: SubtaskId,
    title: &str,
    content: &str,
) -> String {
    format!(
        "{}_{}.{}{}",
        conversation,
        task_id,
        sanitize_title(title),
        infer_extension(content)
    )
}

/// Keep alphanumerics, spaces and underscores; trim trailing whitespace.
fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Guess a file extension from code indicators in the content's head.
fn infer_extension(content: &str) -> &'static str {
    let head: String = content.chars().take(500).collect();

    const INDICATORS: [&str; 7] = [
        "import ", "def ", "class ", "function", "var ", "let ", "const ",
    ];
    if !INDICATORS.iter().any(|i| head.contains(i)) {
        return ".txt";
    }

    if head.contains("import") && (content.contains("def") || content.contains("class")) {
        ".py"
    } else if head.contains("function")
        || head.contains("var ")
        || head.contains("let ")
        || head.contains("const ")
    {
        ".js"
    } else {
        ".txt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Build the API!"), "Build the API");
        // Underscores survive, punctuation and trailing whitespace do not
        assert_eq!(sanitize_title("a/b: c_d "), "ab c_d");
        assert_eq!(sanitize_title("snake_case_name"), "snake_case_name");
    }

    #[test]
    fn test_infer_extension_python() {
        let content = "import os\n\ndef main():\n    pass\n";
        assert_eq!(infer_extension(content), ".py");
    }

    #[test]
    fn test_infer_extension_javascript() {
        let content = "const x = 1;\nfunction main() { return x; }\n";
        assert_eq!(infer_extension(content), ".js");
    }

    #[test]
    fn test_infer_extension_prose() {
        let content = "A three-phase plan for the rollout.";
        assert_eq!(infer_extension(content), ".txt");
    }

    #[test]
    fn test_outcome_file_name() {
        let conversation = ConversationId::new();
        let name = outcome_file_name(conversation, 3, "Write docs?", "Some prose.");
        assert_eq!(name, format!("{conversation}_3.Write docs.txt"));
    }

    #[tokio::test]
    async fn test_fs_sink_writes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsResultSink::new(dir.path().join("logs"));

        sink.write("out.txt", "hello").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("logs/out.txt")).unwrap();
        assert_eq!(written, "hello");
    }
}
