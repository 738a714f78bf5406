//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the mediadupe binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Nothing to do (a sweep found no pending files, a prune found no orphans)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed and did some work.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Nothing to do: the command completed without finding any work.
    NothingToDo = 2,
    /// Interrupted: stopped by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "MD000",
            Self::GeneralError => "MD001",
            Self::NothingToDo => "MD002",
            Self::Interrupted => "MD130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "MD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Underlying causes, outermost first
    pub causes: Vec<String>,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::NothingToDo.as_i32(), 2);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_code_prefixes() {
        assert_eq!(ExitCode::GeneralError.code_prefix(), "MD001");
        assert_eq!(ExitCode::Interrupted.code_prefix(), "MD130");
    }

    #[test]
    fn test_structured_error_includes_causes() {
        let err = Err::<(), _>(std::io::Error::other("disk gone"))
            .context("Failed to open record store")
            .unwrap_err();
        let structured = StructuredError::new(&err, ExitCode::GeneralError);

        assert_eq!(structured.code, "MD001");
        assert_eq!(structured.exit_code, 1);
        assert_eq!(structured.message, "Failed to open record store");
        assert_eq!(structured.causes, vec!["disk gone".to_string()]);
        assert!(!structured.interrupted);

        let json = serde_json::to_value(&structured).unwrap();
        assert_eq!(json["code"], "MD001");
    }
}
