use std::path::PathBuf;
use thiserror::Error;

/// Fatal environment problems. These mean the tool cannot produce a grounded
/// answer at all and map to exit code 2 in main.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("gcloud executable not found on PATH. Install the Google Cloud SDK or add it to PATH.")]
    ToolNotFound,

    #[error("Failed to parse CLI tree {}: {reason}", .path.display())]
    TreeParse { path: PathBuf, reason: String },
}

/// A single gcloud invocation that did not yield usable output. Callers treat
/// these as retryable or degrade to unvalidated output; they never abort a run
/// on their own.
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{argv}' did not finish within {timeout_secs}s")]
    Timeout { argv: String, timeout_secs: u64 },

    #[error("'{argv}' exited with {code:?}: {stderr_excerpt}")]
    Failed {
        argv: String,
        code: Option<i32>,
        stderr_excerpt: String,
    },
}

impl ToolCallError {
    /// Timeouts and spawn failures say nothing about the command being
    /// checked; only a clean non-zero exit from a help probe does.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolCallError::Spawn { .. } | ToolCallError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_names_path() {
        let err = EnvironmentError::ToolNotFound;
        assert!(err.to_string().contains("PATH"));
    }

    #[test]
    fn timeout_is_transient_failed_is_not() {
        let timeout = ToolCallError::Timeout {
            argv: "gcloud run deploy --help".to_string(),
            timeout_secs: 10,
        };
        let failed = ToolCallError::Failed {
            argv: "gcloud bogus --help".to_string(),
            code: Some(2),
            stderr_excerpt: "Invalid choice".to_string(),
        };
        assert!(timeout.is_transient());
        assert!(!failed.is_transient());
    }
}
