//! Configuration management for rootcause
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. The TOML file has `[engine]`, `[llm]`,
//! `[backends.metrics]`, `[backends.logs]`, `[backends.dashboard]` and
//! `[store]` sections; every key is optional.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use discovery::CONFIG_DIR_NAME;
pub use model::*;
pub use sources::ConfigSource;
