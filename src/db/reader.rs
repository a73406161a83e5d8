use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::TransactionRow;
use crate::error::Result;
use crate::types::{BoundingBox, DateRange, TransactionRecord};

/// Read side of the transaction store.
pub trait TransactionSource {
    /// Transactions joined to their postcode location, restricted to the box
    /// (on the postcode's coordinates) and the date range. Both ends inclusive.
    async fn query(&self, bbox: &BoundingBox, range: &DateRange) -> Result<Vec<TransactionRecord>>;
}

pub struct SqliteTransactionSource {
    pool: SqlitePool,
}

impl SqliteTransactionSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl TransactionSource for SqliteTransactionSource {
    async fn query(&self, bbox: &BoundingBox, range: &DateRange) -> Result<Vec<TransactionRecord>> {
        let from = range.from.format("%Y-%m-%d").to_string();
        let to = range.to.format("%Y-%m-%d").to_string();

        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT
                pp.db_id AS id,
                pp.price,
                pp.date_of_transfer,
                pp.postcode,
                pp.property_type,
                pp.new_build_flag,
                pp.tenure_type,
                pp.locality,
                pp.town_city,
                pp.district,
                pp.county,
                pc.country,
                pc.latitude,
                pc.longitude
            FROM pp_data pp
            INNER JOIN postcode_data pc ON pp.postcode = pc.postcode
            WHERE pc.latitude BETWEEN ? AND ?
              AND pc.longitude BETWEEN ? AND ?
              AND pp.date_of_transfer BETWEEN ? AND ?
            ORDER BY pp.db_id
            "#,
        )
        .bind(bbox.south)
        .bind(bbox.north)
        .bind(bbox.west)
        .bind(bbox.east)
        .bind(&from)
        .bind(&to)
        .fetch_all(&self.pool)
        .await?;

        debug!(rows = rows.len(), %bbox, %range, "[STORE] join query complete");

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}
