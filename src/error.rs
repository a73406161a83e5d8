use thiserror::Error;

use crate::types::PredictionQuery;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("{stage} stage failed for {query}: {source}")]
    Stage {
        stage: Stage,
        query: Box<PredictionQuery>,
        #[source]
        source: PipelineError,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of the prediction pipeline proper. Store and POI errors are
/// flattened into the first two variants at the stage boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("transaction data unavailable: {0}")]
    DataUnavailable(String),

    #[error("POI source unavailable: {0}")]
    FeatureSourceUnavailable(String),

    #[error("design mismatch: training design has {training} columns, query row has {query}")]
    DesignMismatch { training: usize, query: usize },

    #[error("singular design: {rows} usable rows for {columns} columns ({reason})")]
    SingularDesign {
        rows: usize,
        columns: usize,
        reason: &'static str,
    },

    #[error("empty training set")]
    EmptyTrainingSet,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PipelineError {
    /// Attach the stage and the query that produced this failure.
    pub fn at(self, stage: Stage, query: &PredictionQuery) -> AppError {
        AppError::Stage {
            stage,
            query: Box::new(query.clone()),
            source: self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Features,
    Design,
    Fit,
    Predict,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Features => "features",
            Stage::Design => "design",
            Stage::Fit => "fit",
            Stage::Predict => "predict",
        };
        write!(f, "{s}")
    }
}
