//! Configuration loading and schema definitions for routecheck.
//!
//! This module provides types and functions for loading routecheck
//! configuration from TOML files or strings. The configuration names the
//! routing service, the two profiles under comparison, the queue ceiling,
//! reporting options and the test cases to run.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads routecheck configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use routecheck::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("routecheck.toml"))?;
/// println!("Routing service: {}", config.routecheck.brouter_uri);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads routecheck configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the string is not valid TOML or doesn't match the
/// schema.
///
/// # Example
///
/// ```
/// use routecheck::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [routecheck]
///     brouter_uri = "http://localhost:17777"
///
///     [queue]
///     max_concurrency = 4
///
///     [profiles]
///     expected = "trekking"
///     actual = "trekking-dev"
/// "#)?;
///
/// assert_eq!(config.queue.ceiling(), 4);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
