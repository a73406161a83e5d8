use std::time::Duration;

use chrono::{Months, NaiveDate};
use tracing::{info, warn};

use crate::db::TransactionSource;
use crate::error::PipelineError;
use crate::types::{BoundingBox, DateRange, TransactionRecord};

/// How far the date window extends around the query date, in whole years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindowPolicy {
    pub years_before: u32,
    pub years_after: u32,
}

impl DateWindowPolicy {
    #[cfg(test)]
    pub fn symmetric(years: u32) -> Self {
        Self { years_before: years, years_after: years }
    }

    /// Feb 29 clamps to Feb 28 in non-leap target years.
    pub fn range_around(&self, date: NaiveDate) -> Result<DateRange, PipelineError> {
        let from = months(self.years_before)
            .and_then(|m| date.checked_sub_months(m))
            .ok_or_else(|| PipelineError::InvalidParameter(format!("date window start before {date} out of range")))?;
        let to = months(self.years_after)
            .and_then(|m| date.checked_add_months(m))
            .ok_or_else(|| PipelineError::InvalidParameter(format!("date window end after {date} out of range")))?;
        Ok(DateRange { from, to })
    }
}

fn months(years: u32) -> Option<Months> {
    years.checked_mul(12).map(Months::new)
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub bounding_box: BoundingBox,
    pub date_range: DateRange,
    pub records: Vec<TransactionRecord>,
}

/// Spatial-temporal extraction around a centre point and date.
pub struct Extractor<S> {
    source: S,
    policy: DateWindowPolicy,
    timeout: Duration,
}

impl<S: TransactionSource> Extractor<S> {
    pub fn new(source: S, policy: DateWindowPolicy, timeout: Duration) -> Self {
        Self { source, policy, timeout }
    }

    pub async fn extract(
        &self,
        center_lat: f64,
        center_lon: f64,
        box_size: f64,
        date_center: NaiveDate,
    ) -> Result<Extraction, PipelineError> {
        if !(box_size.is_finite() && box_size > 0.0) {
            return Err(PipelineError::InvalidParameter(format!("box size must be positive, got {box_size}")));
        }
        let bounding_box = BoundingBox::around(center_lat, center_lon, box_size);
        let date_range = self.policy.range_around(date_center)?;

        let fetched = tokio::time::timeout(self.timeout, self.source.query(&bounding_box, &date_range))
            .await
            .map_err(|_| {
                PipelineError::DataUnavailable(format!("store query timed out after {:?}", self.timeout))
            })?
            .map_err(|e| PipelineError::DataUnavailable(e.to_string()))?;

        let total = fetched.len();
        let records: Vec<TransactionRecord> = fetched
            .into_iter()
            .filter(|r| bounding_box.contains(r.latitude, r.longitude) && date_range.contains(r.date_of_transfer))
            .collect();
        if records.len() < total {
            warn!(
                dropped = total - records.len(),
                "[EXTRACT] store returned rows outside {bounding_box} / {date_range}; dropped"
            );
        }

        if records.is_empty() {
            return Err(PipelineError::DataUnavailable(format!(
                "no transactions in {bounding_box} between {date_range}"
            )));
        }

        info!(
            records = records.len(),
            %bounding_box,
            %date_range,
            "[EXTRACT] {} transactions",
            records.len()
        );

        Ok(Extraction { bounding_box, date_range, records })
    }
}
