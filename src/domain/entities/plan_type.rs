use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Plan tier stored as `planType` in the subscription record.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PlanType {
    #[default]
    None,
    Free,
    Standard,
    #[strum(to_string = "PRO", serialize = "ENTERPRISE")]
    Pro,
}

impl PlanType {
    /// Whether this tier is backed by a paid subscription.
    pub fn is_paid(&self) -> bool {
        matches!(self, PlanType::Standard | PlanType::Pro)
    }
}
