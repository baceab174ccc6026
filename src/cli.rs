//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; a single route table dispatches to the package API.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{AccessCommands, Cli, Commands, TagCommands, VersionCommands};
pub use route::{load_config, RunContext};
