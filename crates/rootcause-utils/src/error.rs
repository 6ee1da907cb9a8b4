use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::redaction::redact_error_message;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `RootCauseError` is the error returned at the library and CLI boundary.
/// It provides:
/// - Detailed error information for programmatic handling
/// - User-friendly messages with context and suggestions
/// - Mapping to CLI exit codes for consistent error reporting
///
/// # Error Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Llm` | Reasoning service failures |
/// | `Tool` | Metrics, log or dashboard backend failures |
/// | `Store` | Investigation state persistence failures |
/// | `Stage` | Failures raised by a stage executor |
/// | `Investigation` | Misuse of the boundary API (unknown id, unexpected input) |
///
/// Errors raised while an investigation runs are recorded into its state and
/// never surface through this type; callers observe them through the status
/// and report views instead.
///
/// # Example
///
/// ```rust
/// use rootcause_utils::error::{ConfigError, RootCauseError};
/// use rootcause_utils::exit_codes::ExitCode;
///
/// let err = RootCauseError::Config(ConfigError::MissingRequired("llm.model".to_string()));
/// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
/// assert!(err.display_for_user().contains("llm.model"));
/// ```
#[derive(Error, Debug)]
pub enum RootCauseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool backend error: {0}")]
    Tool(#[from] ToolError),

    #[error("Investigation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Investigation error: {0}")]
    Investigation(#[from] InvestigationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Reasoning,
    ToolBackend,
    Storage,
    StageExecution,
    Input,
    Suspension,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Reasoning => write!(f, "Reasoning"),
            Self::ToolBackend => write!(f, "Tool Backend"),
            Self::Storage => write!(f, "Storage"),
            Self::StageExecution => write!(f, "Stage Execution"),
            Self::Input => write!(f, "Input"),
            Self::Suspension => write!(f, "Suspension"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::MissingRequired(key) => {
                format!("Required configuration '{key}' is missing")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [engine], [llm], [backends] and [store] sections."
                    .to_string(),
            ),
            Self::MissingRequired(_) => Some(
                "Some values have no usable default and must be configured explicitly.".to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has range or format requirements."
            )),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "rootcause searches for .rootcause/config.toml from the current directory upward."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Remove unknown keys or sections".to_string(),
            ],
            Self::MissingRequired(key) => vec![format!("Set '{key}' in .rootcause/config.toml")],
            Self::InvalidValue { key, .. } => vec![
                format!("Check the allowed range for '{key}'"),
                "Remove the key to fall back to the built-in default".to_string(),
            ],
            Self::NotFound { path } => vec![
                format!("Create the configuration file at {path}"),
                "Omit --config to use discovery and built-in defaults".to_string(),
            ],
            Self::DiscoveryFailed { .. } => {
                vec!["Pass --config with an explicit path".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors that can occur during reasoning backend operations
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, undecodable body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Whether a second attempt at the same call could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ProviderQuota(_) | Self::ProviderOutage(_) | Self::Timeout { .. }
        )
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => {
                Some("Transport errors occur when the LLM endpoint cannot be reached.".to_string())
            }
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Timeouts occur when a completion takes longer than llm.timeout_secs.".to_string(),
            ),
            Self::Misconfiguration(_) => {
                Some("The [llm] section is missing or has invalid settings.".to_string())
            }
            Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) => vec![
                "Verify llm.base_url is reachable from this host".to_string(),
                "Run with --verbose to see detailed error information".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the environment variable named by llm.api_key_env is set".to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Lower llm.max_concurrency".to_string(),
            ],
            Self::Timeout { .. } => vec!["Increase llm.timeout_secs".to_string()],
            Self::Misconfiguration(_) => vec![
                "Set llm.provider to 'openai' or 'anthropic'".to_string(),
                "Set llm.model".to_string(),
            ],
            Self::Unsupported(_) => vec!["Use a supported llm.provider".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Reasoning
    }
}

/// Errors returned by a query backend through the tool gateway
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The call exceeded the backend's per-call timeout
    #[error("{backend} query timed out after {duration:?}")]
    Timeout { backend: String, duration: Duration },

    /// Connection-level failure
    #[error("{backend} transport error: {message}")]
    Transport { backend: String, message: String },

    /// Non-success HTTP status
    #[error("{backend} returned HTTP {status}: {message}")]
    Http {
        backend: String,
        status: u16,
        message: String,
    },

    /// Response body could not be interpreted
    #[error("{backend} returned an unreadable response: {message}")]
    Decode { backend: String, message: String },

    /// No backend of this kind is configured
    #[error("{backend} backend is not configured")]
    Unsupported { backend: String },

    /// The query expression was rejected before execution
    #[error("{backend} rejected query: {reason}")]
    InvalidQuery { backend: String, reason: String },
}

impl ToolError {
    /// Whether retrying the same call could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } | Self::Unsupported { .. } | Self::InvalidQuery { .. } => false,
        }
    }

    /// Name of the backend that produced the error
    #[must_use]
    pub fn backend(&self) -> &str {
        match self {
            Self::Timeout { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Http { backend, .. }
            | Self::Decode { backend, .. }
            | Self::Unsupported { backend }
            | Self::InvalidQuery { backend, .. } => backend,
        }
    }
}

impl UserFriendlyError for ToolError {
    fn user_message(&self) -> String {
        redact_error_message(&self.to_string())
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Timeout { .. } => Some(
                "Each backend call is bounded by backends.<name>.timeout_secs.".to_string(),
            ),
            Self::Unsupported { .. } => Some(
                "Backends are enabled per section under [backends] in the configuration."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Timeout { backend, .. } => {
                vec![format!("Increase backends.{backend}.timeout_secs")]
            }
            Self::Transport { backend, .. } | Self::Http { backend, .. } => {
                vec![format!("Check that backends.{backend}.url points at a healthy instance")]
            }
            Self::Decode { .. } => vec!["Verify the backend type matches its URL".to_string()],
            Self::Unsupported { backend } => {
                vec![format!("Enable [backends.{backend}] in the configuration")]
            }
            Self::InvalidQuery { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::ToolBackend
    }
}

/// Errors raised by the investigation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Investigation {id} not found")]
    NotFound { id: String },

    #[error("Investigation {id} already exists")]
    AlreadyExists { id: String },

    #[error("Investigation {id}: invalid status transition {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Investigation {id} is terminal ({status}) and cannot be modified")]
    Terminal { id: String, status: String },

    #[error("Investigation {id} already has a report")]
    ReportAlreadyGenerated { id: String },

    #[error("Investigation {id}: {reason}")]
    Rejected { id: String, reason: String },

    #[error("Failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },
}

impl UserFriendlyError for StoreError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Persist { .. } | Self::Load { .. } => Some(
                "Investigation records are stored as JSON files under store.state_dir.".to_string(),
            ),
            Self::InvalidTransition { .. } | Self::Terminal { .. } => Some(
                "Status only moves forward, except waiting_for_input <-> running.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => {
                vec!["Run 'rootcause list' to see known investigations".to_string()]
            }
            Self::Persist { .. } | Self::Load { .. } => vec![
                "Check permissions on store.state_dir".to_string(),
                "Remove corrupted files from store.state_dir".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Persist { .. } | Self::Load { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::Storage,
        }
    }
}

/// Errors raised by a stage executor
#[derive(Debug, Error)]
pub enum StageError {
    /// The investigation input cannot be interpreted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Reasoning failed in {stage}: {source}")]
    Reasoning {
        stage: String,
        #[source]
        source: LlmError,
    },

    #[error("Tool call failed in {stage}: {source}")]
    Tool {
        stage: String,
        #[source]
        source: ToolError,
    },

    #[error("Malformed {stage} output: {reason}")]
    MalformedOutput { stage: String, reason: String },

    /// Every query of an evidence branch failed
    #[error("{branch} branch failed: {reason}")]
    BranchFailed {
        branch: String,
        reason: String,
        transient: bool,
    },

    #[error("No transition from {stage} on {signal}")]
    InvalidTransition { stage: String, signal: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StageError {
    /// Whether the engine should re-invoke the stage once more.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Reasoning { source, .. } => source.is_transient(),
            Self::Tool { source, .. } => source.is_transient(),
            Self::MalformedOutput { .. } => true,
            Self::BranchFailed { transient, .. } => *transient,
            Self::InvalidInput(_) | Self::InvalidTransition { .. } | Self::Store(_) => false,
        }
    }
}

impl UserFriendlyError for StageError {
    fn user_message(&self) -> String {
        redact_error_message(&self.to_string())
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidInput(_) => Some(
                "Investigations start from an Alertmanager payload or a non-empty question."
                    .to_string(),
            ),
            Self::BranchFailed { .. } => Some(
                "A failed evidence branch does not fail the investigation; evaluation continues with the other branch."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidInput(_) => vec![
                "Check that the alert payload contains at least one alert with an alertname label"
                    .to_string(),
            ],
            Self::Reasoning { source, .. } => source.suggestions(),
            Self::Tool { source, .. } => source.suggestions(),
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Input,
            Self::Reasoning { .. } => ErrorCategory::Reasoning,
            Self::Tool { .. } | Self::BranchFailed { .. } => ErrorCategory::ToolBackend,
            Self::Store(_) => ErrorCategory::Storage,
            Self::MalformedOutput { .. } | Self::InvalidTransition { .. } => {
                ErrorCategory::StageExecution
            }
        }
    }
}

/// Errors returned by the boundary API to its callers
#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("Investigation {id} not found")]
    NotFound { id: String },

    #[error("Investigation {id} is not waiting for input (status: {status})")]
    NotWaitingForInput { id: String, status: String },

    #[error("Investigation {id} stopped waiting for input; the suspension window expired")]
    SuspensionExpired { id: String },

    #[error("Supplied input cannot be used: {0}")]
    InvalidSuppliedInput(String),

    #[error("Invalid investigation input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InvestigationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
            other => Self::Store(other),
        }
    }
}

impl UserFriendlyError for InvestigationError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NotWaitingForInput { .. } => Some(
                "Input can only be supplied while the investigation is waiting_for_input."
                    .to_string(),
            ),
            Self::SuspensionExpired { .. } => Some(
                "Suspended investigations time out after engine.suspension_timeout_secs."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => {
                vec!["Run 'rootcause list' to see known investigations".to_string()]
            }
            Self::InvalidSuppliedInput(_) => vec![
                "Supply a range as 'START/END' in RFC 3339, e.g. 2024-05-01T10:00:00Z/2024-05-01T11:00:00Z"
                    .to_string(),
            ],
            Self::SuspensionExpired { .. } => {
                vec!["Start a new investigation with an explicit time range".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotWaitingForInput { .. } | Self::SuspensionExpired { .. } => {
                ErrorCategory::Suspension
            }
            Self::Store(_) => ErrorCategory::Storage,
            _ => ErrorCategory::Input,
        }
    }
}

impl UserFriendlyError for RootCauseError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Llm(err) => err.user_message(),
            Self::Tool(err) => err.user_message(),
            Self::Store(err) => err.user_message(),
            Self::Stage(err) => err.user_message(),
            Self::Investigation(err) => err.user_message(),
            Self::Io(err) => format!("File system error: {err}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Llm(err) => err.context(),
            Self::Tool(err) => err.context(),
            Self::Store(err) => err.context(),
            Self::Stage(err) => err.context(),
            Self::Investigation(err) => err.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Llm(err) => err.suggestions(),
            Self::Tool(err) => err.suggestions(),
            Self::Store(err) => err.suggestions(),
            Self::Stage(err) => err.suggestions(),
            Self::Investigation(err) => err.suggestions(),
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(err) => err.category(),
            Self::Llm(err) => err.category(),
            Self::Tool(err) => err.category(),
            Self::Store(err) => err.category(),
            Self::Stage(err) => err.category(),
            Self::Investigation(err) => err.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl RootCauseError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// The output is redacted so credentials embedded in URLs or key-like
    /// tokens never reach the terminal.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        redact_error_message(&output)
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Investigation(InvestigationError::NotFound { .. })
            | Self::Investigation(InvestigationError::InvalidSuppliedInput(_))
            | Self::Investigation(InvestigationError::InvalidInput(_))
            | Self::Investigation(InvestigationError::NotWaitingForInput { .. }) => {
                ExitCode::CLI_ARGS
            }
            Self::Investigation(InvestigationError::SuspensionExpired { .. }) => {
                ExitCode::TIMED_OUT
            }
            Self::Stage(StageError::InvalidInput(_)) => ExitCode::INVESTIGATION_FAILED,
            _ => ExitCode::INTERNAL,
        }
    }
}
