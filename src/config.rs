use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Files,
    Memory,
}

impl Backend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "files" => Some(Self::Files),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ShelfConfig {
    pub data_dir: PathBuf,
    pub backend: Backend,
    /// Per-store byte budget; `None` disables the check.
    pub quota_bytes: Option<u64>,
    pub log_level: String,
    pub log_json: bool,
    pub assistant_latency_ms: u64,
    pub assistant_jitter_ms: u64,
    pub page_size: u32,
    /// Forces the theme seed instead of reading the system preference.
    pub prefers_dark: Option<bool>,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".shelf"),
            backend: Backend::default(),
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
            log_level: "info".to_string(),
            log_json: true,
            assistant_latency_ms: 400,
            assistant_jitter_ms: 200,
            page_size: 50,
            prefers_dark: None,
        }
    }
}

impl ShelfConfig {
    /// Reads a YAML config file, or the defaults when `path` is `None`, then
    /// applies `SHELF_*` environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("SHELF_DATA_DIR").filter(|value| !value.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("SHELF_BACKEND") {
            self.backend = Backend::parse(&raw)
                .ok_or_else(|| AppError::Config(format!("SHELF_BACKEND: unknown backend '{}'", raw)))?;
        }
        if let Some(raw) = lookup("SHELF_QUOTA_BYTES") {
            let quota = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| AppError::Config(format!("SHELF_QUOTA_BYTES: expected a byte count, got '{}'", raw)))?;
            self.quota_bytes = (quota > 0).then_some(quota);
        }
        if let Some(level) = lookup("SHELF_LOG").filter(|value| !value.trim().is_empty()) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(AppError::Config("dataDir must not be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(AppError::Config("pageSize must be at least 1".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(AppError::Config("logLevel must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, ShelfConfig, DEFAULT_QUOTA_BYTES};
    use crate::errors::AppError;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shelf.yaml");
        std::fs::write(&path, "backend: files\npageSize: 10\nprefersDark: true\n").expect("write config");

        let config = ShelfConfig::from_file(&path).expect("config");
        assert_eq!(config.backend, Backend::Files);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.prefers_dark, Some(true));
        assert_eq!(config.quota_bytes, Some(DEFAULT_QUOTA_BYTES));
        assert_eq!(config.data_dir, PathBuf::from(".shelf"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shelf.yaml");
        std::fs::write(&path, "backnd: files\n").expect("write config");
        assert!(matches!(ShelfConfig::from_file(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHELF_DATA_DIR", "/tmp/shelf-data"),
            ("SHELF_BACKEND", "Memory"),
            ("SHELF_QUOTA_BYTES", "0"),
            ("SHELF_LOG", "debug"),
        ]);
        let mut config = ShelfConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|value| value.to_string()))
            .expect("overrides");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/shelf-data"));
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.quota_bytes, None);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn bad_override_is_a_config_error() {
        let mut config = ShelfConfig::default();
        let result = config.apply_overrides(|name| (name == "SHELF_BACKEND").then(|| "postgres".to_string()));
        assert!(matches!(result, Err(AppError::Config(_))));

        let zero_page = ShelfConfig {
            page_size: 0,
            ..ShelfConfig::default()
        };
        assert!(zero_page.validate().is_err());
    }
}
