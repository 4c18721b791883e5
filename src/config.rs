use std::path::PathBuf;

use crate::cultivar::seedfinder::DEFAULT_BASE_URL;

/// Server configuration loaded from environment variables.
pub struct Config {
    pub port: u16,
    pub environment: String,
    /// Overrides the default `~/.plantrun` store location.
    pub data_dir: Option<PathBuf>,
    pub seedfinder_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("ENVIRONMENT").ok().as_deref(),
            std::env::var("DATA_DIR").ok().as_deref(),
            std::env::var("SEEDFINDER_BASE_URL").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env
    /// vars). Used directly in tests to avoid mutating process-global
    /// environment.
    pub fn from_raw_values(
        port: Option<&str>,
        environment: Option<&str>,
        data_dir: Option<&str>,
        seedfinder_base_url: Option<&str>,
    ) -> Self {
        let port = port.and_then(|v| v.parse().ok()).unwrap_or(8081);

        let environment = environment
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "local".to_string());

        let data_dir = data_dir.filter(|s| !s.is_empty()).map(PathBuf::from);

        let seedfinder_base_url = seedfinder_base_url
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Config {
            port,
            environment,
            data_dir,
            seedfinder_base_url,
        }
    }
}
