//! Command implementations.
//!
//! Each command returns the exit code its outcome maps to; errors are
//! reported by `run()`.

mod common;
mod list;
mod output;
mod recover;
mod report;
mod start;
mod status;
mod supply;

pub use list::execute_list_command;
pub use output::Output;
pub use recover::execute_recover_command;
pub use report::execute_report_command;
pub use start::execute_start_command;
pub use status::execute_status_command;
pub use supply::execute_supply_command;
