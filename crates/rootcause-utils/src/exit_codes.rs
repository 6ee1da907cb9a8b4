//! Exit code constants for the rootcause CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Investigation completed (or command succeeded) |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, configuration or boundary misuse |
//! | 3 | `INVESTIGATION_FAILED` | Investigation reached `failed` |
//! | 4 | `WAITING_FOR_INPUT` | Investigation is suspended awaiting operator input |
//! | 10 | `TIMED_OUT` | Investigation reached `timed_out` |

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the CLI contract; scripts rely on them to
/// distinguish a suspended investigation from a failed one.
///
/// # Example
///
/// ```rust
/// use rootcause_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::WAITING_FOR_INPUT.as_i32(), 4);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments, configuration or unknown investigation
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// The investigation finished with status `failed`
    pub const INVESTIGATION_FAILED: ExitCode = ExitCode(3);

    /// The investigation is suspended and needs `rootcause supply`
    pub const WAITING_FOR_INPUT: ExitCode = ExitCode(4);

    /// The investigation finished with status `timed_out`
    pub const TIMED_OUT: ExitCode = ExitCode(10);

    /// Get the numeric exit code value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
