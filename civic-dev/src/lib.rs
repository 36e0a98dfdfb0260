pub mod cli;
pub mod workflow;

pub use cli::{run, Cli, Commands};
