//! Layered runtime settings for the Domino CLI and any long-running
//! host: defaults, overridden by an optional TOML file, overridden by
//! `DOMINO_*` environment variables. Loading order is defaults < file <
//! env.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub world: WorldSettings,
    #[serde(default)]
    pub budget: BudgetSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSettings {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_world_size_m")]
    pub world_size_m: u32,
}

fn default_seed() -> u64 {
    0
}

fn default_world_size_m() -> u32 {
    4096
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self { seed: default_seed(), world_size_m: default_world_size_m() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetSettings {
    #[serde(default = "default_resolve_budget")]
    pub resolve_budget: u32,
    #[serde(default = "default_query_budget")]
    pub query_budget: u32,
}

fn default_resolve_budget() -> u32 {
    100_000
}

fn default_query_budget() -> u32 {
    1_000
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            resolve_budget: default_resolve_budget(),
            query_budget: default_query_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            world: WorldSettings::default(),
            budget: BudgetSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Loads settings from an optional config file, then `DOMINO_*`
/// environment variables, falling back to defaults for anything
/// neither source sets.
pub fn load_settings(file_path: Option<&std::path::Path>) -> crate::error::Result<Settings> {
    let mut builder = config::Config::builder();

    if let Some(path) = file_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOMINO")
            .separator("_")
            .try_parsing(true),
    );

    // Every field carries a `#[serde(default)]`, so a builder with zero
    // sources still deserializes into `Settings::default()`.
    let built = builder.build().map_err(crate::error::ConfigError::Settings)?;
    built
        .try_deserialize()
        .map_err(crate::error::ConfigError::Settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_with_no_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.world.seed, 0);
        assert_eq!(settings.budget.resolve_budget, 100_000);
    }
}
