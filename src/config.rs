use crate::selection::DuplicatePolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub geocoding: GeocodingConfig,
    pub selection: SelectionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub raw_file: PathBuf,
    /// Raw table enriched with coordinates; read first when present.
    pub geocoded_file: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            raw_file: PathBuf::from("data/minas_peru_completo_reordenado.csv"),
            geocoded_file: PathBuf::from("data/minas_peru_geocodificado.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Appended to every location query.
    pub country: String,
    pub min_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "mapa_minas_peru".to_string(),
            country: "Peru".to_string(),
            min_delay_ms: 1000,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SelectionConfig {
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    pub open_browser: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8050,
            static_dir: PathBuf::from("static"),
            open_browser: true,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Like [`AppConfig::load_from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config: AppConfig = toml::from_str(
            r#"
            [input]
            raw_file = "minas.csv"

            [selection]
            on_duplicate = "reject"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.input.raw_file, PathBuf::from("minas.csv"));
        assert_eq!(
            config.input.geocoded_file,
            PathBuf::from("data/minas_peru_geocodificado.csv")
        );
        assert_eq!(config.selection.on_duplicate, DuplicatePolicy::Reject);
        assert_eq!(config.server.port, 9000);
        assert!(config.server.open_browser);
        assert_eq!(config.geocoding.min_delay_ms, 1000);
        assert_eq!(config.geocoding.country, "Peru");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8050);
        assert_eq!(config.selection.on_duplicate, DuplicatePolicy::First);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nport = ").unwrap();
        assert!(AppConfig::load_or_default(&path).is_err());
    }
}
