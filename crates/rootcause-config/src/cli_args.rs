use std::path::PathBuf;

/// CLI arguments for configuration override
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub investigation_timeout_secs: Option<u64>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
}
