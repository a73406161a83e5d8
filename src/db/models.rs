/// Database row types for the `pp_data` ⋈ `postcode_data` join.
/// Used by sqlx for typed queries.
use chrono::NaiveDate;

use crate::error::AppError;
use crate::types::{PropertyType, Tenure, TransactionRecord};

#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub price: i64,
    pub date_of_transfer: String,
    pub postcode: String,
    pub property_type: String,
    pub new_build_flag: String,
    pub tenure_type: String,
    pub locality: String,
    pub town_city: String,
    pub district: String,
    pub county: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let date_of_transfer = parse_transfer_date(&row.date_of_transfer).ok_or_else(|| {
            AppError::InvalidRecord(format!(
                "pp_data row {} has unparseable date '{}'",
                row.id, row.date_of_transfer
            ))
        })?;
        let property_type = row
            .property_type
            .parse::<PropertyType>()
            .map_err(|e| AppError::InvalidRecord(format!("pp_data row {}: {e}", row.id)))?;

        Ok(TransactionRecord {
            id: row.id,
            price: row.price,
            date_of_transfer,
            postcode: row.postcode,
            property_type,
            new_build: row.new_build_flag.trim() == "Y",
            tenure: Tenure::from_code(&row.tenure_type),
            locality: row.locality,
            town_city: row.town_city,
            district: row.district,
            county: row.county,
            country: row.country,
            latitude: row.latitude,
            longitude: row.longitude,
        })
    }
}

/// Accepts `2019-05-24` and the Land Registry export form `2019-05-24 00:00`.
pub fn parse_transfer_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, property_type: &str) -> TransactionRow {
        TransactionRow {
            id: 7,
            price: 250_000,
            date_of_transfer: date.to_string(),
            postcode: "CB2 1TN".to_string(),
            property_type: property_type.to_string(),
            new_build_flag: "N".to_string(),
            tenure_type: "F".to_string(),
            locality: String::new(),
            town_city: "CAMBRIDGE".to_string(),
            district: "CAMBRIDGE".to_string(),
            county: "CAMBRIDGESHIRE".to_string(),
            country: "England".to_string(),
            latitude: 52.2,
            longitude: 0.12,
        }
    }

    #[test]
    fn parses_both_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2019, 5, 24);
        assert_eq!(parse_transfer_date("2019-05-24"), expected);
        assert_eq!(parse_transfer_date("2019-05-24 00:00"), expected);
        assert_eq!(parse_transfer_date("24/05/2019"), None);
    }

    #[test]
    fn row_converts_to_record() {
        let record = TransactionRecord::try_from(row("2019-05-24", "T")).unwrap();
        assert_eq!(record.property_type, PropertyType::Terraced);
        assert_eq!(record.tenure, Tenure::Freehold);
        assert!(!record.new_build);
    }

    #[test]
    fn bad_property_type_is_rejected() {
        let err = TransactionRecord::try_from(row("2019-05-24", "Z")).unwrap_err();
        assert!(matches!(err, AppError::InvalidRecord(_)));
    }
}
