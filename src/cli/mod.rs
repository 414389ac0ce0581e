//! # CLI Module
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! yomu-server serve --config yomu-server.yaml --http-port 6969 --ws-port 42069 --static-dir ./web
//! ```
//!
//! Settings come from the file, then `YOMU_*` variables, then the flags.
//! Runs until SIGINT or SIGTERM.
//!
//! ### `routes`
//!
//! Prints the route table in the order routes are matched:
//!
//! ```text
//! GET    /api/library/ -> get_library
//! POST   /api/library/<id:int>/ -> add_manga_to_library
//! ...
//! ```
//!
//! ### `config init`
//!
//! ```bash
//! yomu-server config init ./yomu-server.yaml
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{resolve_config, route_table, run, run_cli, Cli, Commands, ConfigCommand, DEFAULT_CONFIG_PATH};
