use tracing::info;

use crate::config::Config;
use crate::db::TransactionSource;
use crate::error::{PipelineError, Result, Stage};
use crate::extract::Extractor;
use crate::features::FeatureBuilder;
use crate::model::design::{build_design, build_query_row, DesignPolicy};
use crate::model::ols;
use crate::poi::PoiSource;
use crate::types::{PredictionQuery, PredictionResult};

/// Runs one prediction end to end: extract, features, design, fit, predict.
/// Nothing is cached between calls.
pub struct PricePredictor<S, P> {
    extractor: Extractor<S>,
    features: FeatureBuilder<P>,
    poi_radius: f64,
    design_policy: DesignPolicy,
}

impl<S: TransactionSource, P: PoiSource> PricePredictor<S, P> {
    pub fn new(store: S, pois: P, cfg: &Config) -> Self {
        Self {
            extractor: Extractor::new(store, cfg.date_window, cfg.fetch_timeout),
            features: FeatureBuilder::new(pois, cfg.proximity_threshold, cfg.fetch_timeout),
            poi_radius: cfg.poi_radius,
            design_policy: DesignPolicy {
                property_type: cfg.property_type_policy,
                missing: cfg.missing_value_policy,
                threshold: cfg.proximity_threshold,
            },
        }
    }

    pub async fn predict(&self, query: &PredictionQuery, level: f64) -> Result<PredictionResult> {
        let extraction = self
            .extractor
            .extract(query.latitude, query.longitude, query.box_size, query.date)
            .await
            .map_err(|e| e.at(Stage::Extract, query))?;

        let feature_set = self
            .features
            .build_features(extraction.records, query.latitude, query.longitude, self.poi_radius)
            .await
            .map_err(|e| e.at(Stage::Features, query))?;
        let columns = feature_set.columns().clone();

        let design = build_design(&feature_set.records, &columns, query.property_type, &self.design_policy);
        let query_features = feature_set.index.features_at(&query.location());
        let row = build_query_row(&query_features, &columns, &self.design_policy);
        design
            .check_alignment(&row)
            .map_err(|e| e.at(Stage::Design, query))?;

        let model = ols::fit(&design.x, &design.y).map_err(|e| e.at(Stage::Fit, query))?;

        let at_predict = |e: PipelineError| e.at(Stage::Predict, query);
        let prediction = ols::predict(&model, &row.values, level).map_err(at_predict)?;
        let coefficients = model
            .coefficient_summaries(&design.columns, level)
            .map_err(at_predict)?;
        let statistics = model.statistics();

        info!(
            query = %query,
            rows = statistics.n_obs,
            features = columns.len(),
            mean = prediction.mean,
            lower = prediction.mean_ci_lower,
            upper = prediction.mean_ci_upper,
            "[PREDICT] {:.0} ({:.0}..{:.0}) at {:.0}%",
            prediction.mean,
            prediction.mean_ci_lower,
            prediction.mean_ci_upper,
            level * 100.0,
        );

        Ok(PredictionResult {
            query: query.clone(),
            bounding_box: extraction.bounding_box,
            date_range: extraction.date_range,
            feature_columns: columns,
            property_type_filter: design.filter,
            dropped_rows: design.dropped_rows,
            coefficients,
            statistics,
            prediction,
        })
    }
}
