pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AppConfigLayer, BlobFormat, ConfigError, ConfigManager, ExportConfig,
    ExportConfigLayer, LoggingConfig, LoggingConfigLayer, ProviderConfig, ProviderConfigLayer,
};
