mod config;
mod db;
mod error;
mod extract;
mod features;
mod model;
mod pipeline;
mod poi;
mod report;
mod types;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::SqliteTransactionSource;
use crate::error::Result;
use crate::pipeline::PricePredictor;
use crate::poi::OverpassClient;
use crate::types::{PredictionQuery, PropertyType};

#[derive(Parser)]
#[command(author, version, about = "UK house price prediction from transactions and nearby POIs", long_about = None)]
enum Command {
    #[command(about = "Predict the sale price at a location, date and property type")]
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Sale date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// D, S, T, F or O
        #[arg(long = "property-type")]
        property_type: PropertyType,
        /// Bounding-box edge in degrees (defaults to BOX_SIZE)
        #[arg(long)]
        box_size: Option<f64>,
        /// Interval level (defaults to CONFIDENCE_LEVEL)
        #[arg(long)]
        confidence: Option<f64>,
        /// Print the result as JSON instead of a text table
        #[arg(long)]
        json: bool,
    },
    #[command(about = "Bulk-load price-paid and postcode CSV files into the store")]
    Load {
        #[arg(long = "price-paid", num_args = 1..)]
        price_paid: Vec<PathBuf>,
        #[arg(long, num_args = 1..)]
        postcodes: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    let command = Command::parse();
    if let Err(e) = run(cfg, command).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, command: Command) -> Result<()> {
    let pool = db::connect(&cfg.db_path).await?;

    match command {
        Command::Load { price_paid, postcodes } => {
            let stats = db::loader::load_all(&pool, &price_paid, &postcodes).await?;
            info!("Load complete: {} rows inserted, {} skipped", stats.inserted, stats.skipped);
        }
        Command::Predict {
            lat,
            lon,
            date,
            property_type,
            box_size,
            confidence,
            json,
        } => {
            let level = confidence.unwrap_or(cfg.confidence_level);
            let query = PredictionQuery {
                latitude: lat,
                longitude: lon,
                date,
                property_type,
                box_size: box_size.unwrap_or(cfg.box_size),
            };
            info!(
                "Predicting {query} (window -{}y/+{}y, threshold {}, policy {:?})",
                cfg.date_window.years_before,
                cfg.date_window.years_after,
                cfg.proximity_threshold,
                cfg.property_type_policy,
            );

            let store = SqliteTransactionSource::new(pool);
            let pois = OverpassClient::new(&cfg.overpass_url, cfg.poi_categories.clone(), cfg.fetch_timeout)?;
            let result = PricePredictor::new(store, pois, &cfg).predict(&query, level).await?;

            let out = if json {
                report::render_json(&result)?
            } else {
                report::render_text(&result)
            };
            println!("{out}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, PipelineError, Stage};

    #[test]
    fn predict_arguments_parse() {
        let cmd = Command::try_parse_from([
            "predictor",
            "predict",
            "--lat",
            "52.2",
            "--lon",
            "-0.12",
            "--date",
            "2020-06-01",
            "--property-type",
            "F",
            "--json",
        ])
        .unwrap();
        match cmd {
            Command::Predict { lon, property_type, json, box_size, .. } => {
                assert_eq!(lon, -0.12);
                assert_eq!(property_type, PropertyType::Flat);
                assert!(json);
                assert!(box_size.is_none());
            }
            Command::Load { .. } => panic!("parsed as load"),
        }
    }

    #[test]
    fn bad_property_type_is_rejected() {
        let err = Command::try_parse_from([
            "predictor", "predict", "--lat", "52", "--lon", "0", "--date", "2020-06-01", "--property-type", "Q",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn stage_errors_carry_query() {
        let query = PredictionQuery {
            latitude: 52.0,
            longitude: -1.0,
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            property_type: PropertyType::Detached,
            box_size: 0.1,
        };
        let err: AppError = PipelineError::EmptyTrainingSet.at(Stage::Fit, &query);
        let msg = err.to_string();
        assert!(msg.starts_with("fit stage failed for lat=52.00000 lon=-1.00000"));
        assert!(msg.contains("type=D"));
    }
}
