use crate::config::AppConfig;
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration from `config/Config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig, ConfigError> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration by layering defaults, a TOML file, a sibling JSON
    /// file and `MOMENTUM_` environment variables (`__` separates nesting,
    /// e.g. `MOMENTUM_FEED__PING_INTERVAL_SECS`).
    ///
    /// Missing files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value has
    /// the wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
        let path = path.as_ref();
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Json::file(path.with_extension("json")))
            .merge(Env::prefixed("MOMENTUM_").split("__"))
            .extract()
            .map_err(Box::new)?;

        Self::validate(&config)?;
        tracing::debug!(
            path = %path.display(),
            symbols = config.feed.symbols.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn validate(config: &AppConfig) -> Result<(), ConfigError> {
        if config.feed.symbols.is_empty() {
            return Err(ConfigError::Invalid("feed.symbols must not be empty".into()));
        }
        if config.feed.initial_reconnect_delay_ms == 0
            || config.feed.max_reconnect_delay_ms < config.feed.initial_reconnect_delay_ms
        {
            return Err(ConfigError::Invalid(
                "feed reconnect delays must satisfy 0 < initial <= max".into(),
            ));
        }
        if config.engine.bar_window < config.engine.min_history {
            return Err(ConfigError::Invalid(
                "engine.bar_window must be >= engine.min_history".into(),
            ));
        }
        Ok(())
    }
}
