use thiserror::Error;

/// Everything that can end a task without a success payload. The `Display`
/// output is what the browser shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("No file uploaded")]
    UploadRejected,

    #[error("The conversion process took longer than {secs} seconds (timeout).")]
    RecognitionTimeout { secs: u64 },

    #[error("The image could not be converted to a valid chemical structure.")]
    InvalidStructure,

    #[error("{0}")]
    RecognitionFailed(String),

    #[error("Process cancelled by user.")]
    RecognitionCancelled,

    #[error("The task was cancelled before completion.")]
    TaskVanished,

    #[error("{0}")]
    EnrichmentFailed(String),
}

pub const FALLBACK_FAILURE_MESSAGE: &str = "Unable to process the image.";

impl TaskError {
    /// Builds a failure from the tool's error stream, falling back to a
    /// generic message when the tool said nothing.
    pub fn from_stderr(stderr: &str) -> Self {
        let trimmed = stderr.trim();
        if trimmed.is_empty() {
            TaskError::RecognitionFailed(FALLBACK_FAILURE_MESSAGE.to_string())
        } else {
            TaskError::RecognitionFailed(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stderr_uses_tool_output() {
        let err = TaskError::from_stderr("  osra: cannot open file\n");
        assert_eq!(err.to_string(), "osra: cannot open file");
    }

    #[test]
    fn test_from_stderr_falls_back_when_empty() {
        let err = TaskError::from_stderr(" \n\t");
        assert_eq!(err.to_string(), FALLBACK_FAILURE_MESSAGE);
    }

    #[test]
    fn test_timeout_message_mentions_limit() {
        let err = TaskError::RecognitionTimeout { secs: 300 };
        assert!(err.to_string().contains("300 seconds"));
    }
}
