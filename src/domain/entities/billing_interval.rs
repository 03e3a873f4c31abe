use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Recurring interval of a plan price.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillingInterval {
    Day,
    #[default]
    Month,
    Year,
}

impl BillingInterval {
    /// Convert from a Stripe `recurring.interval` value.
    /// Weekly prices are not sold; they fall back to the monthly cycle.
    pub fn from_stripe(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Next credit reset boundary after `today`.
    ///
    /// Day plans reset tomorrow. Month and year plans reset on the first day
    /// of the next calendar month.
    pub fn next_reset_date(&self, today: NaiveDate) -> NaiveDate {
        match self {
            BillingInterval::Day => today
                .checked_add_days(Days::new(1))
                .unwrap_or(NaiveDate::MAX),
            BillingInterval::Month | BillingInterval::Year => first_of_next_month(today),
        }
    }
}

fn first_of_next_month(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}
