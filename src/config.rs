use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data_service: DataServiceConfig,
    #[serde(default)]
    pub map: MapConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataServiceConfig {
    pub base_url: String,
    #[serde(default)]
    pub paths: ServicePaths,
}

/// Endpoint paths below `base_url`. Every collection is read and written wholesale.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServicePaths {
    pub associations: String,
    pub district_options: String,
    pub activity_options: String,
    pub import: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            associations: "associations".into(),
            district_options: "options/districts".into(),
            activity_options: "options/activities".into(),
            import: "import".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: f64,
    pub cluster_distance_px: f64,
    pub animation_duration_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        // Stuttgart city centre
        Self {
            center_lon: 9.179747886339912,
            center_lat: 48.77860400126555,
            zoom: 14.0,
            cluster_distance_px: 50.0,
            animation_duration_ms: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    // Prefix for history locations reported by the options editor
    #[serde(default)]
    pub root_path: String,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_map_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [data_service]
            base_url = "http://localhost:8080/api"

            [server]
            port = 4200
            "#,
        )
        .unwrap();

        assert_eq!(config.map.cluster_distance_px, 50.0);
        assert_eq!(config.map.animation_duration_ms, 300);
        assert_eq!(config.data_service.paths.district_options, "options/districts");
        assert_eq!(config.server.root_path, "");
    }

    #[test]
    fn overrides_single_paths() {
        let config = AppConfig::from_toml(
            r#"
            [data_service]
            base_url = "http://db"
            paths = { import = "bulk" }

            [map]
            zoom = 12.0

            [server]
            port = 80
            root_path = "/admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_service.paths.import, "bulk");
        assert_eq!(config.data_service.paths.associations, "associations");
        assert_eq!(config.map.zoom, 12.0);
        assert_eq!(config.map.center_lat, 48.77860400126555);
    }

    #[test]
    fn missing_server_section_is_an_error() {
        assert!(AppConfig::from_toml("[data_service]\nbase_url = \"x\"").is_err());
    }
}
