//! Configuration files.
//!
//! Configuration is read from TOML or JSON and then validated into a
//! [`PagePipeline`]. All validation happens up front, before we look at any
//! input, so a bad configuration never produces partial output.

use indexmap::IndexMap;
use schemars::JsonSchema;
use thiserror::Error;

use crate::{
    async_utils::io::read_json_or_toml,
    mapping::{MappingPolicy, Region},
    pages::PagePipeline,
    prelude::*,
    reading_order::DEFAULT_LINE_TOLERANCE,
};

/// Errors in an otherwise well-formed configuration file.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown box mapping mode {0:?} (expected \"sequential\" or \"positional\")")]
    UnknownMode(String),

    #[error("box_mapping.mode is \"sequential\", but box_mapping.sequential_fields is missing")]
    MissingSequentialFields,

    #[error("box_mapping.mode is \"positional\", but box_mapping.positional_mapping is missing")]
    MissingPositionalMapping,

    #[error("field {0:?} appears more than once in box_mapping.sequential_fields")]
    DuplicateField(String),

    #[error("minimum confidence must be between 0.0 and 1.0, got {0}")]
    InvalidConfidence(f64),

    #[error("reading_order.line_tolerance must be a positive number of pixels, got {0}")]
    InvalidLineTolerance(f64),
}

/// Top-level configuration file.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Confidence filtering.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Reading-order sorting.
    #[serde(default)]
    pub reading_order: ReadingOrderConfig,

    /// How boxes are mapped to fields.
    pub box_mapping: BoxMappingConfig,
}

/// Confidence filtering options.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Boxes below this confidence are discarded before mapping.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.5
}

/// Reading-order options.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadingOrderConfig {
    /// Box centers within the same band of this many pixels are read as one
    /// line.
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance: f64,
}

impl Default for ReadingOrderConfig {
    fn default() -> Self {
        Self {
            line_tolerance: default_line_tolerance(),
        }
    }
}

fn default_line_tolerance() -> f64 {
    DEFAULT_LINE_TOLERANCE
}

/// Box mapping options, as written in the file.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BoxMappingConfig {
    /// Either `sequential` or `positional`.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Field names, in reading order. Required for `sequential`.
    #[serde(default)]
    pub sequential_fields: Option<Vec<String>>,

    /// Field regions, in priority order. Required for `positional`.
    #[serde(default)]
    pub positional_mapping: Option<IndexMap<String, RegionConfig>>,
}

fn default_mode() -> String {
    "sequential".to_owned()
}

/// A field region, as written in the file.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// `[x_min, y_min, x_max, y_max]`, as fractions of the page size.
    pub region: [f64; 4],
}

impl BoxMappingConfig {
    /// Validate this configuration and convert it to a [`MappingPolicy`].
    pub fn to_policy(&self) -> Result<MappingPolicy, ConfigError> {
        match self.mode.as_str() {
            "sequential" => {
                let field_names = self
                    .sequential_fields
                    .clone()
                    .ok_or(ConfigError::MissingSequentialFields)?;
                let mut seen = std::collections::HashSet::new();
                if let Some(dup) = field_names.iter().find(|n| !seen.insert(*n)) {
                    return Err(ConfigError::DuplicateField(dup.clone()));
                }
                Ok(MappingPolicy::Sequential { field_names })
            }
            "positional" => {
                let mapping = self
                    .positional_mapping
                    .as_ref()
                    .ok_or(ConfigError::MissingPositionalMapping)?;
                let regions = mapping
                    .iter()
                    .map(|(name, cfg)| (name.clone(), Region::from_array(cfg.region)))
                    .collect();
                let policy = MappingPolicy::Positional { regions };
                for name in policy.malformed_regions() {
                    warn!(
                        field = %name,
                        region = ?mapping[name].region,
                        "Region is malformed and can never match"
                    );
                }
                Ok(policy)
            }
            other => Err(ConfigError::UnknownMode(other.to_owned())),
        }
    }
}

impl Config {
    /// Load a configuration file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let config = read_json_or_toml::<Config>(path)
            .await
            .with_context(|| format!("failed to load configuration {:?}", path))?;
        info!(mode = %config.box_mapping.mode, "Loaded configuration");
        Ok(config)
    }

    /// Validate this configuration and build a [`PagePipeline`].
    ///
    /// `min_confidence` overrides `filter.min_confidence` if present.
    pub fn to_pipeline(
        &self,
        min_confidence: Option<f64>,
    ) -> Result<PagePipeline, ConfigError> {
        let min_confidence = min_confidence.unwrap_or(self.filter.min_confidence);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ConfigError::InvalidConfidence(min_confidence));
        }
        let line_tolerance = self.reading_order.line_tolerance;
        if !(line_tolerance.is_finite() && line_tolerance > 0.0) {
            return Err(ConfigError::InvalidLineTolerance(line_tolerance));
        }
        let policy = self.box_mapping.to_policy()?;
        Ok(PagePipeline {
            min_confidence,
            line_tolerance,
            policy,
        })
    }
}
