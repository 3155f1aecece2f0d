//! CLI command handlers. Each command is in its own file.

mod call;
mod classify;
mod show_config;

pub use call::run_call;
pub use classify::{outcome_from_args, run_classify};
pub use show_config::run_show_config;
