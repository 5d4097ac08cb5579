//! Configuration for the alert archive providers
//!
//! Loaded from wasmCloud link properties when present, otherwise from
//! environment variables. Every setting has a default, so a local gateway
//! and the `ztf*` table catalogue work out of the box.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use url::Url;

use crate::schemas::TableCatalog;

pub const DEFAULT_HBASE_REST_URL: &str = "http://localhost:8080";
pub const DEFAULT_SCHEMA_ROW_KEY: &str = "schema";
pub const DEFAULT_NSIDE: u32 = 128;
pub const DEFAULT_MAX_RADIUS_ARCSEC: f64 = 18_000.0;
pub const DEFAULT_LIMIT: usize = 10_000;
pub const DEFAULT_CLASS_LIMIT: usize = 10;
pub const DEFAULT_CONE_LIMIT: usize = 1_000;
pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;
pub const DEFAULT_COLOR_TOLERANCE_DAYS: f64 = 0.3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Alert archive provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// HBase REST gateway base URL
    pub hbase_rest_url: String,
    /// Row key of the per-table schema row
    pub schema_row_key: String,
    /// HEALPix resolution of the pixel index
    pub nside: u32,
    /// Largest accepted cone radius
    pub max_radius_arcsec: f64,
    /// Per-identifier row limit
    pub default_limit: usize,
    /// Default number of most-recent rows for class searches
    pub class_limit: usize,
    /// Default per-pixel row limit for cone searches
    pub cone_limit: usize,
    /// Concurrent scans per query
    pub scan_concurrency: usize,
    /// Maximum g/r pairing distance for colour, in days
    pub color_tolerance_days: f64,
    /// Per-query timeout
    pub request_timeout_secs: u64,
    /// Index table names
    pub tables: TableCatalog,
    /// Provider instance ID
    pub instance_id: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            hbase_rest_url: DEFAULT_HBASE_REST_URL.to_string(),
            schema_row_key: DEFAULT_SCHEMA_ROW_KEY.to_string(),
            nside: DEFAULT_NSIDE,
            max_radius_arcsec: DEFAULT_MAX_RADIUS_ARCSEC,
            default_limit: DEFAULT_LIMIT,
            class_limit: DEFAULT_CLASS_LIMIT,
            cone_limit: DEFAULT_CONE_LIMIT,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            color_tolerance_days: DEFAULT_COLOR_TOLERANCE_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            tables: TableCatalog::default(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Load configuration from wasmCloud properties HashMap
    ///
    /// Properties (from wasmCloud link config):
    /// - archive_hbase_rest_url, archive_schema_row_key
    /// - archive_nside, archive_max_radius_arcsec
    /// - archive_default_limit, archive_class_limit, archive_cone_limit
    /// - archive_scan_concurrency, archive_color_tolerance_days
    /// - archive_request_timeout_secs, archive_provider_instance_id
    /// - archive_{objects,classes,tns,pixels,timeline,low_state,resolver,salted_objects,sso,statistics}_table
    /// - archive_tag_prefix, archive_tag_tables (comma-separated tag names)
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        Self::load(|key| props.get(key).cloned())
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables mirror the property names, upper-cased:
    /// ARCHIVE_HBASE_REST_URL, ARCHIVE_NSIDE, ARCHIVE_SCAN_CONCURRENCY, ...
    pub fn from_env() -> Result<Self> {
        Self::load(|key| env::var(key.to_ascii_uppercase()).ok())
    }

    fn load(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let number = |key: &str| -> Result<Option<f64>> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Some)
                    .with_context(|| format!("{} must be a number, got '{}'", key, v)),
                None => Ok(None),
            }
        };
        let count = |key: &str| -> Result<Option<usize>> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Some)
                    .with_context(|| format!("{} must be a positive integer, got '{}'", key, v)),
                None => Ok(None),
            }
        };

        let table = |key: &str, default: &str| -> String {
            get(key).unwrap_or_else(|| default.to_string())
        };
        let tables = TableCatalog {
            objects: table("archive_objects_table", &defaults.tables.objects),
            classes: table("archive_classes_table", &defaults.tables.classes),
            tns: table("archive_tns_table", &defaults.tables.tns),
            pixels: table("archive_pixels_table", &defaults.tables.pixels),
            timeline: table("archive_timeline_table", &defaults.tables.timeline),
            low_state: table("archive_low_state_table", &defaults.tables.low_state),
            resolver: table("archive_resolver_table", &defaults.tables.resolver),
            salted_objects: table("archive_salted_objects_table", &defaults.tables.salted_objects),
            sso: table("archive_sso_table", &defaults.tables.sso),
            statistics: table("archive_statistics_table", &defaults.tables.statistics),
            tag_prefix: table("archive_tag_prefix", &defaults.tables.tag_prefix),
            tags: get("archive_tag_tables")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.tables.tags),
        };

        let config = Self {
            hbase_rest_url: get("archive_hbase_rest_url").unwrap_or(defaults.hbase_rest_url),
            schema_row_key: get("archive_schema_row_key").unwrap_or(defaults.schema_row_key),
            nside: count("archive_nside")?
                .map(|n| n as u32)
                .unwrap_or(defaults.nside),
            max_radius_arcsec: number("archive_max_radius_arcsec")?
                .unwrap_or(defaults.max_radius_arcsec),
            default_limit: count("archive_default_limit")?.unwrap_or(defaults.default_limit),
            class_limit: count("archive_class_limit")?.unwrap_or(defaults.class_limit),
            cone_limit: count("archive_cone_limit")?.unwrap_or(defaults.cone_limit),
            scan_concurrency: count("archive_scan_concurrency")?
                .unwrap_or(defaults.scan_concurrency),
            color_tolerance_days: number("archive_color_tolerance_days")?
                .unwrap_or(defaults.color_tolerance_days),
            request_timeout_secs: count("archive_request_timeout_secs")?
                .map(|n| n as u64)
                .unwrap_or(defaults.request_timeout_secs),
            tables,
            instance_id: get("archive_provider_instance_id").unwrap_or(defaults.instance_id),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.hbase_rest_url)
            .with_context(|| format!("Invalid HBase REST URL: {}", self.hbase_rest_url))?;

        if !self.nside.is_power_of_two() || self.nside > 8192 {
            bail!("nside must be a power of two up to 8192, got {}", self.nside);
        }
        if !(self.max_radius_arcsec > 0.0 && self.max_radius_arcsec <= 18_000.0) {
            bail!(
                "max_radius_arcsec must be in (0, 18000], got {}",
                self.max_radius_arcsec
            );
        }
        if self.scan_concurrency == 0 {
            bail!("scan_concurrency must be at least 1");
        }
        if self.default_limit == 0 || self.class_limit == 0 || self.cone_limit == 0 {
            bail!("row limits must be at least 1");
        }
        if !(self.color_tolerance_days >= 0.0) {
            bail!(
                "color_tolerance_days must be non-negative, got {}",
                self.color_tolerance_days
            );
        }
        if self.schema_row_key.is_empty() {
            bail!("schema_row_key must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_properties() {
        let config = ArchiveConfig::from_properties(&HashMap::new()).unwrap();
        assert_eq!(config.nside, 128);
        assert_eq!(config.class_limit, 10);
        assert_eq!(config.tables.pixels, "ztf.pixel128");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_properties_override_defaults() {
        let props: HashMap<String, String> = [
            ("archive_nside", "256"),
            ("archive_scan_concurrency", "2"),
            ("archive_pixels_table", "ztf.pixel256"),
            ("archive_hbase_rest_url", "http://hbase:8080"),
            ("archive_tag_tables", "extragalactic_new_candidate, in_tns,"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = ArchiveConfig::from_properties(&props).unwrap();
        assert_eq!(config.nside, 256);
        assert_eq!(config.scan_concurrency, 2);
        assert_eq!(config.tables.pixels, "ztf.pixel256");
        assert_eq!(config.hbase_rest_url, "http://hbase:8080");
        assert_eq!(
            config.tables.tags,
            vec!["extragalactic_new_candidate".to_string(), "in_tns".to_string()]
        );
        assert_eq!(
            config.tables.tag_table("in_tns").as_deref(),
            Some("rubin.in_tns")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut props = HashMap::new();
        props.insert("archive_nside".to_string(), "100".to_string());
        assert!(ArchiveConfig::from_properties(&props).is_err());

        let mut props = HashMap::new();
        props.insert("archive_scan_concurrency".to_string(), "many".to_string());
        assert!(ArchiveConfig::from_properties(&props).is_err());

        let mut props = HashMap::new();
        props.insert("archive_hbase_rest_url".to_string(), "::".to_string());
        assert!(ArchiveConfig::from_properties(&props).is_err());
    }
}
