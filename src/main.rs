//! rootcause CLI binary
//!
//! All logic lives in the library; this only maps the outcome of
//! `cli::run()` to the process exit code.

fn main() {
    if let Err(code) = rootcause::cli::run() {
        std::process::exit(code.as_i32());
    }
}
