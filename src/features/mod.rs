pub mod proximity;

pub use proximity::{FeatureValues, FeaturedRecord, PoiIndex};

use std::time::Duration;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::poi::PoiSource;
use crate::types::{FeatureColumns, TransactionRecord};

/// Records with their POI features, plus the index needed to compute the
/// same features for the query point.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub records: Vec<FeaturedRecord>,
    pub index: PoiIndex,
}

impl FeatureSet {
    pub fn columns(&self) -> &FeatureColumns {
        self.index.columns()
    }
}

pub struct FeatureBuilder<P> {
    source: P,
    threshold: f64,
    timeout: Duration,
}

impl<P: PoiSource> FeatureBuilder<P> {
    pub fn new(source: P, threshold: f64, timeout: Duration) -> Self {
        Self { source, threshold, timeout }
    }

    /// Fetch POIs around the centre and attach proximity features to every record.
    pub async fn build_features(
        &self,
        records: Vec<TransactionRecord>,
        center_lat: f64,
        center_lon: f64,
        radius: f64,
    ) -> Result<FeatureSet, PipelineError> {
        let pois = tokio::time::timeout(self.timeout, self.source.query(center_lat, center_lon, radius))
            .await
            .map_err(|_| {
                PipelineError::FeatureSourceUnavailable(format!("POI query timed out after {:?}", self.timeout))
            })?
            .map_err(|e| PipelineError::FeatureSourceUnavailable(e.to_string()))?;

        let index = PoiIndex::new(&pois, self.threshold);
        let (amenities, leisure) = index.poi_count();
        if index.columns().is_empty() {
            warn!(pois = pois.len(), "[FEATURES] no recognised POI categories; intercept-only model");
        }

        let records = index.annotate(records);
        info!(
            records = records.len(),
            pois = pois.len(),
            amenities,
            leisure,
            columns = %index.columns(),
            "[FEATURES] proximity features computed"
        );

        Ok(FeatureSet { records, index })
    }
}
