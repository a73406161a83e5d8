use std::time::Duration;

use crate::error::{AppError, Result};
use crate::extract::DateWindowPolicy;
use crate::model::design::{MissingValuePolicy, PropertyTypeFilterPolicy};

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DB_PATH: &str = "property_prices.db";

/// Edge length (degrees) of the square transaction window around the query point.
pub const DEFAULT_BOX_SIZE: f64 = 0.1;

/// Half-width (degrees) of the POI query window. Covers the transaction box
/// plus the proximity threshold so edge records see their full neighbourhood.
pub const DEFAULT_POI_RADIUS: f64 = 0.06;

/// Distance (degrees) within which a POI counts towards a record's features.
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 0.01;

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Timeout around each external fetch (seconds).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Date window around the query date, in whole years.
pub const DEFAULT_YEARS_BEFORE: u32 = 2;
pub const DEFAULT_YEARS_AFTER: u32 = 1;

/// OSM tag keys requested from the POI source.
pub const DEFAULT_POI_CATEGORIES: &[&str] = &["amenity", "leisure"];

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub overpass_url: String,
    pub fetch_timeout: Duration,
    /// Bounding-box edge length in degrees (BOX_SIZE)
    pub box_size: f64,
    /// Half-width of the POI query window in degrees (POI_RADIUS)
    pub poi_radius: f64,
    /// Proximity threshold shared by both POI features (PROXIMITY_THRESHOLD)
    pub proximity_threshold: f64,
    pub date_window: DateWindowPolicy,
    pub confidence_level: f64,
    /// PROPERTY_TYPE_POLICY: "strict" or "fallback"
    pub property_type_policy: PropertyTypeFilterPolicy,
    /// MISSING_VALUE_POLICY: "impute" or "drop"
    pub missing_value_policy: MissingValuePolicy,
    /// POI_CATEGORIES, comma-separated.
    pub poi_categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            db_path: DB_PATH.to_string(),
            overpass_url: OVERPASS_URL.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            box_size: DEFAULT_BOX_SIZE,
            poi_radius: DEFAULT_POI_RADIUS,
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            date_window: DateWindowPolicy {
                years_before: DEFAULT_YEARS_BEFORE,
                years_after: DEFAULT_YEARS_AFTER,
            },
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            property_type_policy: PropertyTypeFilterPolicy::FallbackToAll,
            missing_value_policy: MissingValuePolicy::ImputeThreshold,
            poi_categories: DEFAULT_POI_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            db_path: std::env::var("DB_PATH").unwrap_or(defaults.db_path),
            overpass_url: std::env::var("OVERPASS_URL").unwrap_or(defaults.overpass_url),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| DEFAULT_FETCH_TIMEOUT_SECS.to_string())
                    .parse::<u64>()
                    .map_err(|_| {
                        AppError::Config("FETCH_TIMEOUT_SECS must be a whole number of seconds".to_string())
                    })?,
            ),
            box_size: positive_f64("BOX_SIZE", defaults.box_size)?,
            poi_radius: positive_f64("POI_RADIUS", defaults.poi_radius)?,
            proximity_threshold: positive_f64("PROXIMITY_THRESHOLD", defaults.proximity_threshold)?,
            date_window: DateWindowPolicy {
                years_before: whole_years("YEARS_BEFORE", defaults.date_window.years_before)?,
                years_after: whole_years("YEARS_AFTER", defaults.date_window.years_after)?,
            },
            confidence_level: open_unit_f64("CONFIDENCE_LEVEL", defaults.confidence_level)?,
            property_type_policy: match std::env::var("PROPERTY_TYPE_POLICY") {
                Ok(s) => s.parse().map_err(AppError::Config)?,
                Err(_) => defaults.property_type_policy,
            },
            missing_value_policy: match std::env::var("MISSING_VALUE_POLICY") {
                Ok(s) => s.parse().map_err(AppError::Config)?,
                Err(_) => defaults.missing_value_policy,
            },
            poi_categories: match std::env::var("POI_CATEGORIES") {
                Ok(s) => parse_list(&s),
                Err(_) => defaults.poi_categories,
            },
        })
    }
}

fn positive_f64(var: &str, default: f64) -> Result<f64> {
    match std::env::var(var) {
        Ok(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| AppError::Config(format!("{var} must be a positive number"))),
        Err(_) => Ok(default),
    }
}

fn open_unit_f64(var: &str, default: f64) -> Result<f64> {
    match std::env::var(var) {
        Ok(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| *v > 0.0 && *v < 1.0)
            .ok_or_else(|| AppError::Config(format!("{var} must lie strictly between 0 and 1"))),
        Err(_) => Ok(default),
    }
}

fn whole_years(var: &str, default: u32) -> Result<u32> {
    match std::env::var(var) {
        Ok(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| AppError::Config(format!("{var} must be a whole number of years"))),
        Err(_) => Ok(default),
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_skips_blanks() {
        assert_eq!(parse_list("amenity, leisure,,shop "), vec!["amenity", "leisure", "shop"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn defaults_match_documented_window() {
        let cfg = Config::default();
        assert_eq!(cfg.date_window.years_before, 2);
        assert_eq!(cfg.date_window.years_after, 1);
        assert_eq!(cfg.property_type_policy, PropertyTypeFilterPolicy::FallbackToAll);
        assert!((cfg.proximity_threshold - 0.01).abs() < 1e-12);
    }

    // Unique names: tests share the process environment.
    #[test]
    fn malformed_window_and_level_are_config_errors() {
        std::env::set_var("TEST_CFG_YEARS_BAD", "two");
        std::env::set_var("TEST_CFG_YEARS_OK", " 3 ");
        assert!(matches!(whole_years("TEST_CFG_YEARS_BAD", 2), Err(AppError::Config(_))));
        assert_eq!(whole_years("TEST_CFG_YEARS_OK", 2).unwrap(), 3);
        assert_eq!(whole_years("TEST_CFG_YEARS_UNSET", 2).unwrap(), 2);

        std::env::set_var("TEST_CFG_LEVEL_HIGH", "1.5");
        std::env::set_var("TEST_CFG_LEVEL_TEXT", "ninety");
        std::env::set_var("TEST_CFG_LEVEL_OK", "0.9");
        assert!(matches!(open_unit_f64("TEST_CFG_LEVEL_HIGH", 0.95), Err(AppError::Config(_))));
        assert!(matches!(open_unit_f64("TEST_CFG_LEVEL_TEXT", 0.95), Err(AppError::Config(_))));
        assert_eq!(open_unit_f64("TEST_CFG_LEVEL_OK", 0.95).unwrap(), 0.9);
        assert_eq!(open_unit_f64("TEST_CFG_LEVEL_UNSET", 0.95).unwrap(), 0.95);
    }
}
