use nalgebra::Vector2;
use rayon::prelude::*;
use serde::Serialize;

use crate::types::{FeatureColumns, FeatureKind, PointOfInterest, TransactionRecord};

/// Decide which feature columns this POI set can support. A feature is
/// active when at least one POI carries its category.
pub fn detect_feature_columns(pois: &[PointOfInterest]) -> FeatureColumns {
    [FeatureKind::AmenityProximity, FeatureKind::ClosestLeisure]
        .into_iter()
        .filter(|kind| pois.iter().any(|p| p.has_category(kind.category())))
        .collect()
}

/// Per-location feature values. `None` means the column is inactive, or for
/// `closest_leisure`, that no leisure POI lies within the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeatureValues {
    /// Amenities within the threshold, plus one. Always ≥ 1 when present.
    pub amenity_proximity: Option<u32>,
    pub closest_leisure: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FeaturedRecord {
    pub record: TransactionRecord,
    pub features: FeatureValues,
}

/// POI locations split by category, with the active columns and threshold
/// fixed for the lifetime of one prediction.
#[derive(Debug, Clone)]
pub struct PoiIndex {
    columns: FeatureColumns,
    threshold: f64,
    amenities: Vec<Vector2<f64>>,
    leisure: Vec<Vector2<f64>>,
}

impl PoiIndex {
    pub fn new(pois: &[PointOfInterest], threshold: f64) -> Self {
        let locations = |key: &str| -> Vec<Vector2<f64>> {
            pois.iter().filter(|p| p.has_category(key)).map(|p| p.location).collect()
        };
        Self {
            columns: detect_feature_columns(pois),
            threshold,
            amenities: locations(FeatureKind::AmenityProximity.category()),
            leisure: locations(FeatureKind::ClosestLeisure.category()),
        }
    }

    pub fn columns(&self) -> &FeatureColumns {
        &self.columns
    }

    pub fn poi_count(&self) -> (usize, usize) {
        (self.amenities.len(), self.leisure.len())
    }

    /// Features for one location. Distances are planar in degrees; the
    /// threshold is inclusive.
    pub fn features_at(&self, location: &Vector2<f64>) -> FeatureValues {
        let amenity_proximity = self.columns.contains(FeatureKind::AmenityProximity).then(|| {
            let within = self
                .amenities
                .iter()
                .filter(|a| a.metric_distance(location) <= self.threshold)
                .count() as u32;
            within + 1
        });

        let closest_leisure = if self.columns.contains(FeatureKind::ClosestLeisure) {
            self.leisure
                .iter()
                .map(|l| l.metric_distance(location))
                .filter(|d| *d <= self.threshold)
                .min_by(f64::total_cmp)
        } else {
            None
        };

        FeatureValues {
            amenity_proximity,
            closest_leisure,
        }
    }

    /// Attach features to every record. Output order matches input order.
    pub fn annotate(&self, records: Vec<TransactionRecord>) -> Vec<FeaturedRecord> {
        records
            .into_par_iter()
            .map(|record| {
                let features = self.features_at(&record.location());
                FeaturedRecord { record, features }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::record;
    use crate::types::PropertyType;
    use chrono::NaiveDate;

    fn amenity(lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest::new(lat, lon).with_tag("amenity", "pub")
    }

    fn leisure(lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest::new(lat, lon).with_tag("leisure", "park")
    }

    fn at(lat: f64, lon: f64) -> Vector2<f64> {
        Vector2::new(lon, lat)
    }

    #[test]
    fn columns_follow_categories_present() {
        assert!(detect_feature_columns(&[]).is_empty());

        let only_leisure = detect_feature_columns(&[leisure(52.0, 0.0)]);
        assert!(!only_leisure.contains(FeatureKind::AmenityProximity));
        assert!(only_leisure.contains(FeatureKind::ClosestLeisure));

        let both = detect_feature_columns(&[amenity(52.0, 0.0), leisure(52.0, 0.0)]);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn untagged_pois_activate_nothing() {
        let shop = PointOfInterest::new(52.0, 0.0).with_tag("shop", "bakery");
        assert!(detect_feature_columns(&[shop]).is_empty());
    }

    #[test]
    fn amenity_count_is_offset_by_one() {
        let index = PoiIndex::new(&[amenity(52.0, 0.0), amenity(52.005, 0.0), amenity(52.5, 0.0)], 0.01);

        assert_eq!(index.features_at(&at(52.0, 0.0)).amenity_proximity, Some(3));
        assert_eq!(index.features_at(&at(51.0, 0.0)).amenity_proximity, Some(1));
    }

    #[test]
    fn threshold_is_inclusive() {
        let index = PoiIndex::new(&[amenity(52.0, 0.0)], 0.5);
        assert_eq!(index.features_at(&at(52.0, 0.5)).amenity_proximity, Some(2));
    }

    #[test]
    fn closest_leisure_is_nearest_within_threshold() {
        let index = PoiIndex::new(&[leisure(52.0, 0.008), leisure(52.0, 0.003), leisure(52.0, 0.5)], 0.01);

        let near = index.features_at(&at(52.0, 0.0));
        assert!((near.closest_leisure.unwrap() - 0.003).abs() < 1e-12);
        assert_eq!(near.amenity_proximity, None);

        let far = index.features_at(&at(53.0, 0.0));
        assert_eq!(far.closest_leisure, None);
    }

    #[test]
    fn annotate_preserves_order() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let records: Vec<_> = (0..50)
            .map(|i| record(i, 52.0 + i as f64 * 0.001, 0.0, 100_000, date, PropertyType::Flat))
            .collect();
        let index = PoiIndex::new(&[amenity(52.0, 0.0)], 0.01);

        let featured = index.annotate(records);

        let ids: Vec<i64> = featured.iter().map(|f| f.record.id).collect();
        assert_eq!(ids, (0..50).collect::<Vec<i64>>());
        assert!(featured.iter().all(|f| f.features.amenity_proximity.unwrap() >= 1));
        assert_eq!(featured[0].features.amenity_proximity, Some(2));
        assert_eq!(featured[49].features.amenity_proximity, Some(1));
    }
}
