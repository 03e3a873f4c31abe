use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::timestamp::{format_date, format_timestamp, parse_date, parse_timestamp};

pub const TOTAL: &str = "total";
pub const USED: &str = "used";
pub const RESET_DATE: &str = "resetDate";
pub const LAST_UPDATE: &str = "lastUpdate";

/// Per-user credit allowance for the current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRecord {
    pub total: i64,
    pub used: i64,
    pub reset_date: Option<NaiveDate>,
    pub last_update: Option<DateTime<Utc>>,
}

impl CreditRecord {
    /// Zeroed record, as written on cancellation or payment failure.
    pub fn revoked(at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            used: 0,
            reset_date: None,
            last_update: Some(at),
        }
    }

    pub fn remaining(&self) -> i64 {
        (self.total - self.used).max(0)
    }

    /// Parse a stored hash. Returns `None` for an empty hash (no record).
    /// Unparseable counters read as zero.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let int = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };
        Some(Self {
            total: int(TOTAL),
            used: int(USED),
            reset_date: fields.get(RESET_DATE).and_then(|v| parse_date(v)),
            last_update: fields.get(LAST_UPDATE).and_then(|v| parse_timestamp(v)),
        })
    }

    /// Hash fields for this record. A cleared reset date is written as `""`.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (TOTAL.to_string(), self.total.to_string()),
            (USED.to_string(), self.used.to_string()),
            (
                RESET_DATE.to_string(),
                self.reset_date.map(format_date).unwrap_or_default(),
            ),
            (
                LAST_UPDATE.to_string(),
                self.last_update.map(format_timestamp).unwrap_or_default(),
            ),
        ]
    }
}
