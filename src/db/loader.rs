use std::path::Path;

use csv::StringRecord;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::models::parse_transfer_date;
use crate::error::{AppError, Result};

/// Column count of a Land Registry price-paid CSV line.
const PRICE_PAID_FIELDS: usize = 16;
/// Column count of an open postcode geo CSV line.
const POSTCODE_FIELDS: usize = 17;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub inserted: usize,
    pub skipped: usize,
}

/// Bulk-load one headerless price-paid file into `pp_data` in a single transaction.
pub async fn load_price_paid(pool: &SqlitePool, path: &Path) -> Result<LoadStats> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut stats = LoadStats::default();
    let mut tx = pool.begin().await?;

    for result in reader.records() {
        let record = result?;
        let Some(row) = PricePaidLine::parse(&record) else {
            stats.skipped += 1;
            continue;
        };

        sqlx::query(
            r#"
            INSERT INTO pp_data (
                transaction_unique_identifier, price, date_of_transfer, postcode,
                property_type, new_build_flag, tenure_type,
                primary_addressable_object_name, secondary_addressable_object_name,
                street, locality, town_city, district, county,
                ppd_category_type, record_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(field(&record, 0))
        .bind(row.price)
        .bind(&row.date)
        .bind(field(&record, 3))
        .bind(field(&record, 4))
        .bind(field(&record, 5))
        .bind(field(&record, 6))
        .bind(field(&record, 7))
        .bind(field(&record, 8))
        .bind(field(&record, 9))
        .bind(field(&record, 10))
        .bind(field(&record, 11))
        .bind(field(&record, 12))
        .bind(field(&record, 13))
        .bind(field(&record, 14))
        .bind(field(&record, 15))
        .execute(&mut *tx)
        .await?;
        stats.inserted += 1;
    }

    tx.commit().await?;
    log_stats("pp_data", path, stats);
    Ok(stats)
}

/// Bulk-load one headerless open postcode geo file into `postcode_data`.
/// Postcodes without coordinates are skipped.
pub async fn load_postcodes(pool: &SqlitePool, path: &Path) -> Result<LoadStats> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut stats = LoadStats::default();
    let mut tx = pool.begin().await?;

    for result in reader.records() {
        let record = result?;
        if record.len() < POSTCODE_FIELDS {
            stats.skipped += 1;
            continue;
        }
        let (Some(latitude), Some(longitude)) = (parse_opt::<f64>(&record, 7), parse_opt::<f64>(&record, 8)) else {
            stats.skipped += 1;
            continue;
        };

        sqlx::query(
            r#"
            INSERT INTO postcode_data (
                postcode, status, usertype, easting, northing, positional_quality_indicator,
                country, latitude, longitude, postcode_no_space,
                postcode_fixed_width_seven, postcode_fixed_width_eight,
                postcode_area, postcode_district, postcode_sector, outcode, incode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(field(&record, 0))
        .bind(field(&record, 1))
        .bind(field(&record, 2))
        .bind(parse_opt::<i64>(&record, 3))
        .bind(parse_opt::<i64>(&record, 4))
        .bind(parse_opt::<i64>(&record, 5))
        .bind(field(&record, 6))
        .bind(latitude)
        .bind(longitude)
        .bind(field(&record, 9))
        .bind(field(&record, 10))
        .bind(field(&record, 11))
        .bind(field(&record, 12))
        .bind(field(&record, 13))
        .bind(field(&record, 14))
        .bind(field(&record, 15))
        .bind(field(&record, 16))
        .execute(&mut *tx)
        .await?;
        stats.inserted += 1;
    }

    tx.commit().await?;
    log_stats("postcode_data", path, stats);
    Ok(stats)
}

/// Load every price-paid file and postcode file, failing on the first missing path.
pub async fn load_all(pool: &SqlitePool, price_paid: &[impl AsRef<Path>], postcodes: &[impl AsRef<Path>]) -> Result<LoadStats> {
    let mut total = LoadStats::default();
    for path in postcodes {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Config(format!("postcode file not found: {}", path.display())));
        }
        let s = load_postcodes(pool, path).await?;
        total.inserted += s.inserted;
        total.skipped += s.skipped;
    }
    for path in price_paid {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Config(format!("price-paid file not found: {}", path.display())));
        }
        let s = load_price_paid(pool, path).await?;
        total.inserted += s.inserted;
        total.skipped += s.skipped;
    }
    Ok(total)
}

struct PricePaidLine {
    price: i64,
    /// Normalised to `YYYY-MM-DD` so string range comparisons stay correct.
    date: String,
}

impl PricePaidLine {
    fn parse(record: &StringRecord) -> Option<Self> {
        if record.len() < PRICE_PAID_FIELDS {
            return None;
        }
        let price = record.get(1)?.trim().parse::<i64>().ok()?;
        let date = parse_transfer_date(record.get(2)?)?.format("%Y-%m-%d").to_string();
        Some(Self { price, date })
    }
}

fn field<'a>(record: &'a StringRecord, idx: usize) -> &'a str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn parse_opt<T: std::str::FromStr>(record: &StringRecord, idx: usize) -> Option<T> {
    record.get(idx).and_then(|s| s.trim().parse::<T>().ok())
}

fn log_stats(table: &str, path: &Path, stats: LoadStats) {
    info!(table, inserted = stats.inserted, skipped = stats.skipped, "[LOAD] {}", path.display());
    if stats.skipped > 0 {
        warn!(table, skipped = stats.skipped, "[LOAD] skipped malformed lines in {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::db::reader::{SqliteTransactionSource, TransactionSource};
    use crate::types::{BoundingBox, DateRange, PropertyType};
    use chrono::NaiveDate;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn loaded_files_are_queryable() {
        let pool = memory_pool().await;
        let postcodes = write_temp(
            "postcodes.csv",
            "\"CB2 1TN\",\"live\",\"small\",\"545000\",\"258000\",\"1\",\"England\",\"52.2\",\"0.12\",\"CB21TN\",\"CB2 1TN\",\"CB2  1TN\",\"CB\",\"CB2\",\"CB2 1\",\"CB2\",\"1TN\"\n\
             \"CB2 9ZZ\",\"terminated\",\"small\",\"\",\"\",\"9\",\"England\",\"\",\"\",\"CB29ZZ\",\"CB2 9ZZ\",\"CB2  9ZZ\",\"CB\",\"CB2\",\"CB2 9\",\"CB2\",\"9ZZ\"\n",
        );
        let prices = write_temp(
            "pp.csv",
            "\"{A1}\",\"350000\",\"2019-05-24 00:00\",\"CB2 1TN\",\"S\",\"N\",\"F\",\"12\",\"\",\"MILL ROAD\",\"\",\"CAMBRIDGE\",\"CAMBRIDGE\",\"CAMBRIDGESHIRE\",\"A\",\"A\"\n\
             \"{A2}\",\"not-a-price\",\"2019-05-24 00:00\",\"CB2 1TN\",\"S\",\"N\",\"F\",\"12\",\"\",\"MILL ROAD\",\"\",\"CAMBRIDGE\",\"CAMBRIDGE\",\"CAMBRIDGESHIRE\",\"A\",\"A\"\n",
        );

        let stats = load_all(&pool, &[&prices], &[&postcodes]).await.unwrap();
        assert_eq!(stats, LoadStats { inserted: 2, skipped: 2 });

        let records = SqliteTransactionSource::new(pool)
            .query(
                &BoundingBox::around(52.2, 0.12, 0.1),
                &DateRange {
                    from: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
                    to: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].property_type, PropertyType::SemiDetached);
        assert_eq!(records[0].town_city, "CAMBRIDGE");

        let _ = std::fs::remove_file(prices);
        let _ = std::fs::remove_file(postcodes);
    }

    #[tokio::test]
    async fn missing_file_is_a_config_error() {
        let pool = memory_pool().await;
        let missing = std::path::PathBuf::from("/nonexistent/pp.csv");
        let none: [&std::path::Path; 0] = [];
        let err = load_all(&pool, &[missing], &none).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
