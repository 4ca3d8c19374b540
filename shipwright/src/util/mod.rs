//! Small shared utilities.

pub mod process;

pub use process::{is_process_alive, kill_process};
