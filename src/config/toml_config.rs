use crate::adapters::proxy::ProxySettings;
use crate::core::icon_crop::CropOptions;
use crate::geodata::companies::CompaniesSettings;
use crate::geodata::osm::OsmSettings;
use crate::geodata::overlays::{OverlaySettings, RouteLayerSettings};
use crate::utils::error::{PrepError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "mapprep.toml";

/// Settings for every tool. Each section is optional in the file and falls
/// back to its defaults; command-line flags override on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub server: ProxySettings,
    pub template: TemplateSettings,
    pub overlays: OverlaySettings,
    pub osm: OsmSettings,
    pub companies: CompaniesSettings,
    pub icons: CropOptions,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub base_dir: String,
    pub matching_file: String,
    pub output: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            base_dir: "data/i2 Specs".into(),
            matching_file: "Matching Settings/cached-system-match-rules.xml".into(),
            output: "data/i2 Specs/parsed/graph_output.json".into(),
        }
    }
}

impl TemplateSettings {
    pub fn base_path(&self) -> PathBuf {
        PathBuf::from(&self.base_dir)
    }

    /// The matching file, relative paths resolved against the base dir.
    pub fn matching_path(&self) -> PathBuf {
        let path = Path::new(&self.matching_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path().join(path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub commons_api_url: String,
    pub sketchfab_api_url: String,
    pub download_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: concat!("mapprep/", env!("CARGO_PKG_VERSION")).into(),
            commons_api_url: crate::adapters::commons::DEFAULT_API_URL.into(),
            sketchfab_api_url: crate::adapters::sketchfab::DEFAULT_API_URL.into(),
            download_delay_ms: 1000,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}

impl PrepConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Reads `path` when given, else `mapprep.toml` in the working directory
    /// if present, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(path)
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| PrepError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left
    /// as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("server.upstream_base", &self.server.upstream_base)?;
        validation::validate_path("server.static_dir", &self.server.static_dir)?;
        validation::validate_positive_number("server.port", self.server.port as usize, 1)?;
        validation::validate_positive_number("server.timeout_seconds", self.server.timeout_seconds as usize, 1)?;

        validation::validate_path("template.base_dir", &self.template.base_dir)?;
        validation::validate_file_extension("template.matching_file", &self.template.matching_file, &["xml"])?;
        validation::validate_file_extension("template.output", &self.template.output, &["json"])?;

        validation::validate_file_extension("overlays.roads_input", &self.overlays.roads_input, &["geojson", "json"])?;
        validation::validate_file_extension("overlays.rail_input", &self.overlays.rail_input, &["geojson", "json"])?;
        validation::validate_path("overlays.output_dir", &self.overlays.output_dir)?;
        validate_route_layer("overlays.roads", &self.overlays.roads)?;
        validate_route_layer("overlays.rail", &self.overlays.rail)?;

        validation::validate_path("osm.output_dir", &self.osm.output_dir)?;
        validation::validate_range("osm.simplify_m", self.osm.simplify_m, 0.0, 10_000.0)?;

        validation::validate_path("companies.output_dir", &self.companies.output_dir)?;
        validation::validate_file_extension("companies.index_file", &self.companies.index_file, &["json"])?;
        validation::validate_positive_number("companies.rows_per_file", self.companies.rows_per_file, 1)?;

        validation::validate_range("icons.alpha_threshold", self.icons.alpha_threshold, 0.0, 1.0)?;
        validation::validate_positive_number("icons.canvas_size", self.icons.canvas_size as usize, 1)?;
        if self.icons.padding.saturating_mul(2) >= self.icons.canvas_size {
            return Err(PrepError::InvalidConfigValueError {
                field: "icons.padding".to_string(),
                value: self.icons.padding.to_string(),
                reason: "Padding must leave room inside the canvas".to_string(),
            });
        }

        validation::validate_url("http.commons_api_url", &self.http.commons_api_url)?;
        validation::validate_url("http.sketchfab_api_url", &self.http.sketchfab_api_url)?;
        validation::validate_non_empty_string("http.user_agent", &self.http.user_agent)?;
        validation::validate_positive_number("http.timeout_seconds", self.http.timeout_seconds as usize, 1)?;

        Ok(())
    }
}

fn validate_route_layer(field: &str, layer: &RouteLayerSettings) -> Result<()> {
    validation::validate_range(&format!("{}.tolerance", field), layer.tolerance, 0.0, 1.0)?;
    validation::validate_positive_number(&format!("{}.max_points", field), layer.max_points, 2)?;
    validation::validate_non_empty_string(&format!("{}.class_property", field), &layer.class_property)?;
    Ok(())
}

impl Validate for PrepConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = PrepConfig::from_toml_str("").unwrap();
        assert_eq!(config, PrepConfig::default());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.companies.rows_per_file, 100_000);
        assert_eq!(config.overlays.roads.max_points, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = PrepConfig::from_toml_str(
            r#"
[server]
port = 9000

[overlays]
station_limit = 10

[icons]
canvas_size = 128
padding = 8
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.static_dir, ".");
        assert_eq!(config.overlays.station_limit, 10);
        assert_eq!(config.overlays.rail.max_points, 80);
        assert_eq!(config.icons.canvas_size, 128);
        assert_eq!(config.icons.margin, 40);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MAPPREP_TEST_UPSTREAM", "https://test.api.com");

        let config = PrepConfig::from_toml_str(
            r#"
[server]
upstream_base = "${MAPPREP_TEST_UPSTREAM}"
"#,
        )
        .unwrap();
        assert_eq!(config.server.upstream_base, "https://test.api.com");

        std::env::remove_var("MAPPREP_TEST_UPSTREAM");
    }

    #[test]
    fn test_config_validation() {
        let config = PrepConfig::from_toml_str(
            r#"
[server]
upstream_base = "invalid-url"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = PrepConfig::from_toml_str("[icons]\ncanvas_size = 40\npadding = 20\n").unwrap();
        assert!(config.validate().is_err());

        let config = PrepConfig::from_toml_str("[icons]\npadding = 4294967295\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(PrepError::InvalidConfigValueError { ref field, .. }) if field == "icons.padding"
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[template]\nbase_dir = \"specs\"\n")
            .unwrap();

        let config = PrepConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.template.base_dir, "specs");
        assert_eq!(
            config.template.matching_path(),
            Path::new("specs").join("Matching Settings/cached-system-match-rules.xml")
        );
    }

    #[test]
    fn test_unknown_type_is_parse_error() {
        let err = PrepConfig::from_toml_str("[server]\nport = \"eighty\"\n").unwrap_err();
        assert!(matches!(err, PrepError::ConfigValidationError { .. }));
    }
}
