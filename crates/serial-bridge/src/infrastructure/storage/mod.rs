//! Storage infrastructure: the TOML configuration file.
//!
//! The `config` sub-module reads the bridge configuration and supplies
//! defaults when the file or individual fields are absent.

pub mod config;
