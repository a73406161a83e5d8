use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::features::{FeatureValues, FeaturedRecord};
use crate::types::{FeatureColumns, FeatureKind, PropertyType};

/// What to do when no extracted record has the requested property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyTypeFilterPolicy {
    /// Train only on matching records, even if there are none.
    Strict,
    /// Train on every record when none match.
    FallbackToAll,
}

impl std::str::FromStr for PropertyTypeFilterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "fallback" | "fallback_to_all" => Ok(Self::FallbackToAll),
            other => Err(format!("PROPERTY_TYPE_POLICY must be 'strict' or 'fallback', got '{other}'")),
        }
    }
}

/// Handling of a feature value that is undefined for a record
/// (no leisure POI within the threshold).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Substitute the "nothing within threshold" value: the threshold for
    /// distances, a reciprocal of 1 for counts.
    ImputeThreshold,
    /// Drop the training row. The query row is still imputed.
    DropRow,
}

impl std::str::FromStr for MissingValuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "impute" | "impute_threshold" => Ok(Self::ImputeThreshold),
            "drop" | "drop_row" => Ok(Self::DropRow),
            other => Err(format!("MISSING_VALUE_POLICY must be 'impute' or 'drop', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignPolicy {
    pub property_type: PropertyTypeFilterPolicy,
    pub missing: MissingValuePolicy,
    /// Proximity threshold, used as the imputed leisure distance.
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FilterOutcome {
    Matched { rows: usize },
    FellBackToAll { rows: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignColumn {
    Intercept,
    InverseAmenityProximity,
    ClosestLeisure,
}

impl DesignColumn {
    pub fn name(&self) -> &'static str {
        match self {
            DesignColumn::Intercept => "const",
            DesignColumn::InverseAmenityProximity => "1/amenity_proximity",
            DesignColumn::ClosestLeisure => "closest_leisure",
        }
    }

    fn value(&self, features: &FeatureValues) -> Option<f64> {
        match self {
            DesignColumn::Intercept => Some(1.0),
            DesignColumn::InverseAmenityProximity => features.amenity_proximity.map(|n| 1.0 / n as f64),
            DesignColumn::ClosestLeisure => features.closest_leisure,
        }
    }

    fn imputed(&self, threshold: f64) -> f64 {
        match self {
            DesignColumn::Intercept | DesignColumn::InverseAmenityProximity => 1.0,
            DesignColumn::ClosestLeisure => threshold,
        }
    }
}

/// Intercept first, then one column per active feature in `FeatureKind` order.
pub fn design_columns(features: &FeatureColumns) -> Vec<DesignColumn> {
    std::iter::once(DesignColumn::Intercept)
        .chain(features.iter().map(|kind| match kind {
            FeatureKind::AmenityProximity => DesignColumn::InverseAmenityProximity,
            FeatureKind::ClosestLeisure => DesignColumn::ClosestLeisure,
        }))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Design {
    pub columns: Vec<DesignColumn>,
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    pub filter: FilterOutcome,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub columns: Vec<DesignColumn>,
    pub values: DVector<f64>,
}

impl Design {
    /// Fail unless the query row has exactly this design's columns.
    pub fn check_alignment(&self, row: &QueryRow) -> Result<(), PipelineError> {
        if self.x.ncols() != row.values.len() || self.columns != row.columns {
            return Err(PipelineError::DesignMismatch {
                training: self.x.ncols(),
                query: row.values.len(),
            });
        }
        Ok(())
    }
}

/// Build the training design matrix and price response.
pub fn build_design(
    records: &[FeaturedRecord],
    features: &FeatureColumns,
    property_type: PropertyType,
    policy: &DesignPolicy,
) -> Design {
    let matching: Vec<&FeaturedRecord> = records
        .iter()
        .filter(|r| r.record.property_type == property_type)
        .collect();

    let (selected, filter) = match policy.property_type {
        PropertyTypeFilterPolicy::FallbackToAll if matching.is_empty() => {
            warn!(
                %property_type,
                records = records.len(),
                "[DESIGN] no records of requested type; training on all records"
            );
            (records.iter().collect::<Vec<_>>(), FilterOutcome::FellBackToAll { rows: records.len() })
        }
        _ => {
            let rows = matching.len();
            (matching, FilterOutcome::Matched { rows })
        }
    };

    let columns = design_columns(features);
    let mut values = Vec::with_capacity(selected.len() * columns.len());
    let mut prices = Vec::with_capacity(selected.len());
    let mut dropped_rows = 0usize;

    'rows: for r in &selected {
        let start = values.len();
        for col in &columns {
            match (col.value(&r.features), policy.missing) {
                (Some(v), _) => values.push(v),
                (None, MissingValuePolicy::ImputeThreshold) => values.push(col.imputed(policy.threshold)),
                (None, MissingValuePolicy::DropRow) => {
                    values.truncate(start);
                    dropped_rows += 1;
                    continue 'rows;
                }
            }
        }
        prices.push(r.record.price as f64);
    }

    if dropped_rows > 0 {
        warn!(dropped_rows, "[DESIGN] dropped rows with undefined feature values");
    }

    let x = DMatrix::from_row_slice(prices.len(), columns.len(), &values);
    let y = DVector::from_vec(prices);
    info!(
        rows = x.nrows(),
        columns = x.ncols(),
        filter = ?filter,
        "[DESIGN] design matrix built"
    );

    Design {
        columns,
        x,
        y,
        filter,
        dropped_rows,
    }
}

/// Build the single prediction row for the query point's own features.
/// Undefined values are always imputed.
pub fn build_query_row(features: &FeatureValues, columns: &FeatureColumns, policy: &DesignPolicy) -> QueryRow {
    let columns = design_columns(columns);
    let values = DVector::from_iterator(
        columns.len(),
        columns
            .iter()
            .map(|col| col.value(features).unwrap_or_else(|| col.imputed(policy.threshold))),
    );
    QueryRow { columns, values }
}
