pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod params;
pub mod traits;

pub use config::{
    AppConfig, CloseDetection, DatabaseConfig, EngineSettings, ExchangeSettings, FeedSettings,
};
pub use config_loader::ConfigLoader;
pub use error::{ConfigError, ExchangeError};
pub use events::{Bar, CandleEvent, Side, TpLevel};
pub use params::{SessionOverrides, StrategyParams, SymbolOverride, TpTemplateEntry};
pub use traits::{ExchangeClient, ExchangeCredentials, OrderRequest, OrderResult};
