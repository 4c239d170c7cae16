//! Configuration loading for the report pipeline.
//!
//! Values come from layered `.env` files and environment variables prefixed with `KPI_REPORT_`.
//! Later layers win: `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`, then the
//! process environment.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kpi::KpiColumns;
use crate::view::StarSchema;

/// Prefix shared by every configuration key.
pub const ENV_PREFIX: &str = "KPI_REPORT_";

/// The eight tables read from the source schema, in extraction order.
pub const DEFAULT_TABLES: &[&str] = &[
    "Cas",
    "Izdelek",
    "Kupec",
    "Lokacija",
    "Popust",
    "SocioekonomskiProfil",
    "Demografija",
    "tabela_dejstev",
];

/// Connection settings for the operational MySQL database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "dwpikp".to_string(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub profile: String,
    pub log_level: String,
    pub source: SourceConfig,
    pub tables: Vec<String>,
    pub store_path: PathBuf,
    pub figures_dir: PathBuf,
    pub report_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fonts_dir: Option<PathBuf>,
    #[serde(skip)]
    pub schema: StarSchema,
    #[serde(skip)]
    pub kpi_columns: KpiColumns,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            source: SourceConfig::default(),
            tables: DEFAULT_TABLES.iter().map(|name| name.to_string()).collect(),
            store_path: default_store_path(),
            figures_dir: default_figures_dir(),
            report_path: default_report_path(),
            fonts_dir: None,
            schema: StarSchema::default(),
            kpi_columns: KpiColumns::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for values that would make a run fail half-way.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.host.trim().is_empty() {
            return Err(ConfigError::MissingValue { key: "MYSQL_HOST" });
        }
        if self.source.database.trim().is_empty() {
            return Err(ConfigError::MissingValue {
                key: "MYSQL_DATABASE",
            });
        }
        if self.source.port == 0 {
            return Err(ConfigError::InvalidPort { value: 0 });
        }
        if self.tables.is_empty() {
            return Err(ConfigError::NoTables);
        }

        for table in self.schema.tables() {
            if !self.tables.iter().any(|candidate| candidate == table) {
                return Err(ConfigError::UnknownSchemaTable {
                    table: table.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Serializes the configuration with the source password masked.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut redacted = self.clone();
        if !redacted.source.password.is_empty() {
            redacted.source.password = "********".to_string();
        }
        serde_json::to_string(&redacted)
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("duckdb_database").join("dwpikp.duckdb")
}

fn default_figures_dir() -> PathBuf {
    PathBuf::from("documentation").join("screenshots")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("documentation").join("README.pdf")
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for KPI_REPORT_{key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("KPI_REPORT_{key} must not be empty")]
    MissingValue { key: &'static str },
    #[error("MySQL port must be between 1 and 65535, got {value}")]
    InvalidPort { value: u16 },
    #[error("no tables configured; set KPI_REPORT_TABLES")]
    NoTables,
    #[error("star schema references table `{table}` which is not extracted")]
    UnknownSchemaTable { table: String },
}

/// Loads configuration from layered `.env` files and `KPI_REPORT_*` variables.
pub struct ConfigLoader {
    base_dir: PathBuf,
    read_process_env: bool,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            read_process_env: true,
        }
    }

    /// Creates a loader rooted at the provided directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            read_process_env: true,
        }
    }

    /// Ignores the process environment so only `.env` files are considered.
    pub fn without_process_env(mut self) -> Self {
        self.read_process_env = false;
        self
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        let mut layered = self.collect_layered_env()?;

        if self.read_process_env {
            for (key, value) in env::vars() {
                if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                    layered.insert(stripped.to_string(), value);
                }
            }
        }

        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            profile: take_string(&mut layered, "PROFILE").unwrap_or(defaults.profile),
            log_level: take_string(&mut layered, "LOG_LEVEL").unwrap_or(defaults.log_level),
            source: SourceConfig {
                host: take_string(&mut layered, "MYSQL_HOST").unwrap_or(defaults.source.host),
                port: take_parsed(&mut layered, "MYSQL_PORT")?.unwrap_or(defaults.source.port),
                user: take_string(&mut layered, "MYSQL_USER").unwrap_or(defaults.source.user),
                password: layered
                    .remove("MYSQL_PASSWORD")
                    .unwrap_or(defaults.source.password),
                database: take_string(&mut layered, "MYSQL_DATABASE")
                    .unwrap_or(defaults.source.database),
            },
            tables: take_string(&mut layered, "TABLES")
                .map(|tables| {
                    tables
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.tables),
            store_path: take_string(&mut layered, "STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            figures_dir: take_string(&mut layered, "FIGURES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.figures_dir),
            report_path: take_string(&mut layered, "REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path),
            fonts_dir: take_string(&mut layered, "FONTS_DIR").map(PathBuf::from),
            schema: defaults.schema,
            kpi_columns: defaults.kpi_columns,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = self
            .read_process_env
            .then(|| env::var(format!("{ENV_PREFIX}PROFILE")).ok())
            .flatten()
            .or_else(|| values.get("PROFILE").cloned())
            .filter(|profile| !profile.is_empty())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(self.base_dir.join(format!(".env.{profile}")), &mut values)?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{profile}.local")),
            &mut values,
        )?;

        values.entry("PROFILE".to_string()).or_insert(profile);
        Ok(values)
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn take_parsed<T: std::str::FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match take_string(values, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}
