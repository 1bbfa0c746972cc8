use crate::paths::AppPaths;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("toml error")]
    Toml(#[from] toml::de::Error),
    #[error("unknown blob format '{0}' (expected pkcs8, legacy-rsa or bcrypt)")]
    UnknownFormat(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfigLayer {
    pub provider: Option<ProviderConfigLayer>,
    pub export: Option<ExportConfigLayer>,
    pub logging: Option<LoggingConfigLayer>,
}

impl AppConfigLayer {
    pub fn apply_to(self, cfg: &mut AppConfig) {
        if let Some(layer) = self.provider {
            cfg.provider.apply(layer);
        }
        if let Some(layer) = self.export {
            cfg.export.apply(layer);
        }
        if let Some(layer) = self.logging {
            cfg.logging.apply(layer);
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub library: String,
    pub name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            library: "ncryptprov.dll".to_string(),
            name: "Microsoft Software Key Storage Provider".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProviderConfigLayer {
    pub library: Option<String>,
    pub name: Option<String>,
}

impl ProviderConfig {
    fn apply(&mut self, layer: ProviderConfigLayer) {
        if let Some(v) = layer.library {
            self.library = v;
        }
        if let Some(v) = layer.name {
            self.name = v;
        }
    }
}

/// Serialization a key is exported in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlobFormat {
    #[default]
    Pkcs8,
    LegacyRsa,
    Bcrypt,
}

impl BlobFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobFormat::Pkcs8 => "pkcs8",
            BlobFormat::LegacyRsa => "legacy-rsa",
            BlobFormat::Bcrypt => "bcrypt",
        }
    }
}

impl fmt::Display for BlobFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pkcs8" => Ok(BlobFormat::Pkcs8),
            "legacy-rsa" | "capi" => Ok(BlobFormat::LegacyRsa),
            "bcrypt" => Ok(BlobFormat::Bcrypt),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub format: BlobFormat,
    pub override_policy: bool,
    pub overwrite: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            format: BlobFormat::Pkcs8,
            override_policy: true,
            overwrite: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ExportConfigLayer {
    pub output_dir: Option<PathBuf>,
    pub format: Option<BlobFormat>,
    pub override_policy: Option<bool>,
    pub overwrite: Option<bool>,
}

impl ExportConfig {
    fn apply(&mut self, layer: ExportConfigLayer) {
        if let Some(v) = layer.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = layer.format {
            self.format = v;
        }
        if let Some(v) = layer.override_policy {
            self.override_policy = v;
        }
        if let Some(v) = layer.overwrite {
            self.overwrite = v;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub stderr: bool,
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            stderr: false,
            file: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LoggingConfigLayer {
    pub level: Option<String>,
    pub json: Option<bool>,
    pub stderr: Option<bool>,
    pub file: Option<bool>,
}

impl LoggingConfig {
    fn apply(&mut self, layer: LoggingConfigLayer) {
        if let Some(v) = layer.level {
            self.level = v;
        }
        if let Some(v) = layer.json {
            self.json = v;
        }
        if let Some(v) = layer.stderr {
            self.stderr = v;
        }
        if let Some(v) = layer.file {
            self.file = v;
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConfigManager {
    pub paths: AppPaths,
}

impl ConfigManager {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    pub fn load(&self, cwd: Option<&Path>, overrides: Option<AppConfigLayer>) -> Result<AppConfig> {
        let mut cfg = AppConfig::default();

        if self.paths.config_file.exists() {
            tracing::debug!(path = %self.paths.config_file.display(), "loading config");
            let layer = Self::load_layer(&self.paths.config_file)?;
            layer.apply_to(&mut cfg);
        }

        if let Some(dir) = cwd {
            let project_path = AppPaths::project_config_path(dir);
            if project_path.exists() {
                tracing::debug!(path = %project_path.display(), "loading project config");
                let layer = Self::load_layer(&project_path)?;
                layer.apply_to(&mut cfg);
            }
        }

        if let Some(layer) = overrides {
            layer.apply_to(&mut cfg);
        }

        Ok(cfg)
    }

    pub fn load_layer(path: &Path) -> Result<AppConfigLayer> {
        let content = fs::read_to_string(path).map_err(ConfigError::from)?;
        let layer: AppConfigLayer = toml::from_str(&content).map_err(ConfigError::from)?;
        Ok(layer)
    }
}
