use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use nalgebra::Vector2;
use serde::Serialize;

use crate::model::design::FilterOutcome;
use crate::model::ols::{CoefficientSummary, FitStatistics, Prediction};

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Land Registry property type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyType {
    #[serde(rename = "D")]
    Detached,
    #[serde(rename = "S")]
    SemiDetached,
    #[serde(rename = "T")]
    Terraced,
    #[serde(rename = "F")]
    Flat,
    #[serde(rename = "O")]
    Other,
}

impl PropertyType {
    pub fn code(&self) -> &'static str {
        match self {
            PropertyType::Detached => "D",
            PropertyType::SemiDetached => "S",
            PropertyType::Terraced => "T",
            PropertyType::Flat => "F",
            PropertyType::Other => "O",
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "D" | "DETACHED" => Ok(PropertyType::Detached),
            "S" | "SEMI" | "SEMI-DETACHED" => Ok(PropertyType::SemiDetached),
            "T" | "TERRACED" => Ok(PropertyType::Terraced),
            "F" | "FLAT" => Ok(PropertyType::Flat),
            "O" | "OTHER" => Ok(PropertyType::Other),
            other => Err(format!("unknown property type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tenure {
    #[serde(rename = "F")]
    Freehold,
    #[serde(rename = "L")]
    Leasehold,
    #[serde(rename = "U")]
    Unknown,
}

impl Tenure {
    /// Land Registry uses `U` for anything it has not classified.
    pub fn from_code(s: &str) -> Self {
        match s.trim() {
            "F" => Tenure::Freehold,
            "L" => Tenure::Leasehold,
            _ => Tenure::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub price: i64,
    pub date_of_transfer: NaiveDate,
    pub postcode: String,
    pub property_type: PropertyType,
    pub new_build: bool,
    pub tenure: Tenure,
    pub locality: String,
    pub town_city: String,
    pub district: String,
    pub county: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TransactionRecord {
    /// Planar point geometry, x = longitude, y = latitude.
    pub fn location(&self) -> Vector2<f64> {
        Vector2::new(self.longitude, self.latitude)
    }
}

// ---------------------------------------------------------------------------
// Points of interest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    /// x = longitude, y = latitude.
    pub location: Vector2<f64>,
    /// OSM tag key → value. A category is present when its key is.
    pub tags: BTreeMap<String, String>,
}

impl PointOfInterest {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Vector2::new(longitude, latitude),
            tags: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn has_category(&self, key: &str) -> bool {
        self.tags.get(key).is_some_and(|v| !v.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Query windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Square box of edge `size` centred on the point.
    pub fn around(latitude: f64, longitude: f64, size: f64) -> Self {
        let half = size / 2.0;
        Self {
            south: latitude - half,
            north: latitude + half,
            west: longitude - half,
            east: longitude + half,
        }
    }

    /// Boundary-inclusive.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude) && (self.west..=self.east).contains(&longitude)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4},{:.4}]x[{:.4},{:.4}]",
            self.south, self.north, self.west, self.east
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Boundary-inclusive.
    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.from..=self.to).contains(&date)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

// ---------------------------------------------------------------------------
// Feature columns
// ---------------------------------------------------------------------------

/// POI-derived features, in design-matrix column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    AmenityProximity,
    ClosestLeisure,
}

impl FeatureKind {
    /// The POI tag key a feature is derived from.
    pub fn category(&self) -> &'static str {
        match self {
            FeatureKind::AmenityProximity => "amenity",
            FeatureKind::ClosestLeisure => "leisure",
        }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureKind::AmenityProximity => write!(f, "amenity_proximity"),
            FeatureKind::ClosestLeisure => write!(f, "closest_leisure"),
        }
    }
}

/// Feature columns active for one prediction. Decided once from the POI set
/// and passed to both the training design and the query row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureColumns(BTreeSet<FeatureKind>);

impl FeatureColumns {
    pub fn contains(&self, kind: FeatureKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<FeatureKind> for FeatureColumns {
    fn from_iter<I: IntoIterator<Item = FeatureKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for FeatureColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Query and result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub date: NaiveDate,
    pub property_type: PropertyType,
    pub box_size: f64,
}

impl PredictionQuery {
    pub fn location(&self) -> Vector2<f64> {
        Vector2::new(self.longitude, self.latitude)
    }
}

impl std::fmt::Display for PredictionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat={:.5} lon={:.5} date={} type={} box={}",
            self.latitude, self.longitude, self.date, self.property_type, self.box_size
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub query: PredictionQuery,
    pub bounding_box: BoundingBox,
    pub date_range: DateRange,
    pub feature_columns: FeatureColumns,
    pub property_type_filter: FilterOutcome,
    /// Training rows dropped for undefined feature values.
    pub dropped_rows: usize,
    pub coefficients: Vec<CoefficientSummary>,
    pub statistics: FitStatistics,
    pub prediction: Prediction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_is_centred_and_inclusive() {
        let bbox = BoundingBox::around(52.0, -2.0, 0.1);
        assert!((bbox.north - bbox.south - 0.1).abs() < 1e-12);
        assert!((bbox.east - bbox.west - 0.1).abs() < 1e-12);
        assert!(bbox.contains(bbox.south, bbox.west));
        assert!(bbox.contains(bbox.north, bbox.east));
        assert!(!bbox.contains(bbox.north + 1e-9, -2.0));
    }

    #[test]
    fn date_range_is_inclusive() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
        };
        assert!(range.contains(range.from));
        assert!(range.contains(range.to));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2019, 1, 2).unwrap()));
    }

    #[test]
    fn property_type_parses_codes_and_names() {
        assert_eq!("d".parse::<PropertyType>(), Ok(PropertyType::Detached));
        assert_eq!("Flat".parse::<PropertyType>(), Ok(PropertyType::Flat));
        assert!("X".parse::<PropertyType>().is_err());
    }

    #[test]
    fn empty_tag_value_is_not_a_category() {
        let poi = PointOfInterest::new(0.0, 0.0).with_tag("amenity", "");
        assert!(!poi.has_category("amenity"));
        assert!(PointOfInterest::new(0.0, 0.0)
            .with_tag("leisure", "park")
            .has_category("leisure"));
    }

    #[test]
    fn feature_columns_iterate_in_design_order() {
        let cols: FeatureColumns = [FeatureKind::ClosestLeisure, FeatureKind::AmenityProximity]
            .into_iter()
            .collect();
        let order: Vec<_> = cols.iter().collect();
        assert_eq!(order, vec![FeatureKind::AmenityProximity, FeatureKind::ClosestLeisure]);
        assert_eq!(cols.to_string(), "{amenity_proximity, closest_leisure}");
    }
}
