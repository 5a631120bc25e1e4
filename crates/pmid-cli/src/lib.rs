//! PMID command-line tool
//!
//! - Manage temp identities in the local file store
//! - Inspect encoded envelopes
//! - Show or initialise the configuration
//! - Run a local two-party demo over the in-process bus

pub mod cli;
pub mod output;

pub use cli::Cli;
pub use output::{OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Authentication failed (wrong secret or corrupted record)
/// - 5: Invalid input
/// - 6: Not found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    AuthenticationFailed = 2,
    InvalidInput = 5,
    NotFound = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NotFound => "NOT_FOUND",
        }
    }
}
