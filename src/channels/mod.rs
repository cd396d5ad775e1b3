//! User-facing channels for the assistant.

pub mod cli;

pub use cli::{CliChannel, Command};
