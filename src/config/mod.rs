//! Configuration module
//!
//! Handles user configuration (`~/.config/gitscope/config.toml`), layered
//! with `GITSCOPE_`-prefixed environment variables.

mod settings;

pub use settings::*;
