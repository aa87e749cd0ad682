//! ShellDock Core - Shared functionality for the shelldock tool
//!
//! Standard paths, the configuration file, platform detection and the
//! small formatting helpers used by the CLI.

pub mod config;
pub mod format;
pub mod paths;
pub mod platform;

pub use config::{Config, IndexRebuild};
pub use paths::Paths;
