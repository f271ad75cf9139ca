use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub columns: ColumnConfig,
    pub geocode: GeocodeConfig,
    pub map: MapConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

/// Inputs of the `map` command.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub schools: PathBuf,
    pub roster: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            schools: PathBuf::from("schoolsfinal_all_coordinates_updated.csv"),
            roster: PathBuf::from("teacherslist.csv"),
        }
    }
}

/// Header names in the school table and the teacher roster.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnConfig {
    pub school_id: String,
    pub search_name: String,
    pub latitude: String,
    pub longitude: String,
    pub roster_school_id: String,
    pub member_group: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            school_id: "school_id".to_string(),
            search_name: "search_name".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
            roster_school_id: "school_id".to_string(),
            member_group: "member_group".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Throttle {
    /// Pause after every outbound request.
    #[default]
    PerRequest,
    /// Pause once after the whole run.
    PerRun,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocodeConfig {
    pub address_suffix: String,
    pub delay_ms: u64,
    pub throttle: Throttle,
    pub google: GoogleConfig,
    pub nominatim: NominatimConfig,
}

impl GeocodeConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            address_suffix: ", Manhattan, New York, NY".to_string(),
            delay_ms: 1000,
            throttle: Throttle::default(),
            google: GoogleConfig::default(),
            nominatim: NominatimConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub endpoint: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            input: PathBuf::from("schoolsfinal_still_missing_after_all_matching.csv"),
            output: PathBuf::from("schoolsfinal_geocoded_from_google.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NominatimConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "school_geocoder".to_string(),
            input: PathBuf::from("schoolsfinal_all_coordinates_merged.csv"),
            output: PathBuf::from("schoolsfinal_all_coordinates_updated.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub title: String,
    pub subtitle: String,
    pub legend_title: String,
    pub radius_base: f64,
    pub radius_scale: f64,
    pub tile_url: String,
    pub attribution: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [40.7831, -73.9712],
            zoom: 12,
            title: "Manhattan Schools - Teacher Density Map".to_string(),
            subtitle: "Active, Retired, Substitute, and All Teacher Types".to_string(),
            legend_title: "UFT Member Count".to_string(),
            radius_base: 3.0,
            radius_scale: 0.5,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub map_html: String,
    pub summary: String,
    pub geojson: String,
}

impl OutputConfig {
    pub fn map_html_path(&self) -> PathBuf {
        self.dir.join(&self.map_html)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.summary)
    }

    pub fn geojson_path(&self) -> PathBuf {
        self.dir.join(&self.geojson)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            map_html: "manhattan_schools_teacher_choropleth.html".to_string(),
            summary: "teacher_density_summary.txt".to_string(),
            geojson: "manhattan_schools_teacher_counts.geojson".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.columns.latitude, "Latitude");
        assert_eq!(config.geocode.delay_ms, 1000);
        assert_eq!(config.geocode.throttle, Throttle::PerRequest);
        assert_eq!(config.map.zoom, 12);
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config: AppConfig = toml::from_str(
            r#"
            [geocode]
            delay_ms = 0
            throttle = "per_run"

            [output]
            dir = "maps"
            "#,
        )
        .unwrap();

        assert_eq!(config.geocode.delay(), Duration::ZERO);
        assert_eq!(config.geocode.throttle, Throttle::PerRun);
        assert_eq!(config.geocode.address_suffix, ", Manhattan, New York, NY");
        assert_eq!(
            config.output.map_html_path(),
            PathBuf::from("maps/manhattan_schools_teacher_choropleth.html")
        );
    }
}
