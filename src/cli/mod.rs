//! Command-line interface for rootcause
//!
//! ## Module Structure
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, configuration discovery and dispatch
//! - `commands`: one module per subcommand plus output helpers

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
