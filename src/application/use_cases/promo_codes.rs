//! Promotion code checks for the deferred checkout flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    app_error::AppError,
    application::ports::billing_provider::{PriceInfo, PromotionCodeInfo},
};

/// Why a promotion code cannot be applied to a price.
/// Checks run in declaration order; the first failure wins.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PromoRejection {
    #[error("Promotion code is invalid or no longer active")]
    NotFound,

    #[error("Promotion code has expired")]
    Expired,

    /// Carries the product ids the code is limited to.
    #[error("Promotion code is not valid for this product")]
    WrongProduct(Vec<String>),

    #[error("Promotion code is not valid for the selected price")]
    WrongPrice,

    #[error("Promotion code is only valid for {0} billing")]
    WrongBillingCycle(String),

    #[error("Promotion code does not give a discount on this plan")]
    NoDiscount,
}

impl From<PromoRejection> for AppError {
    fn from(rejection: PromoRejection) -> Self {
        AppError::InvalidInput(rejection.to_string())
    }
}

/// A promotion code that passed every check, with its discount on the price.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPromo {
    pub promotion_code_id: String,
    pub code: String,
    pub coupon_id: String,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    /// Discount in minor units.
    pub discount_amount: i64,
}

impl AppliedPromo {
    pub fn info(&self) -> PromoCodeInfo {
        PromoCodeInfo {
            id: self.promotion_code_id.clone(),
            code: self.code.clone(),
            coupon_id: self.coupon_id.clone(),
            percent_off: self.percent_off,
            amount_off: self.amount_off.map(to_major_units),
            discount_amount: to_major_units(self.discount_amount),
        }
    }
}

/// Promotion code summary returned to the browser. Amounts in major units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeInfo {
    pub id: String,
    pub code: String,
    pub coupon_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_off: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_off: Option<f64>,
    pub discount_amount: f64,
}

pub fn to_major_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Discount a coupon gives on `amount` (minor units).
pub fn discount_for(percent_off: Option<f64>, amount_off: Option<i64>, amount: i64) -> i64 {
    if let Some(pct) = percent_off {
        (amount as f64 * pct / 100.0).round() as i64
    } else if let Some(off) = amount_off {
        off.min(amount)
    } else {
        0
    }
}

/// Run every check against `price`. `promo` is the lookup result for the code.
pub fn evaluate(
    promo: Option<&PromotionCodeInfo>,
    price: &PriceInfo,
    now: DateTime<Utc>,
) -> Result<AppliedPromo, PromoRejection> {
    let promo = promo
        .filter(|p| p.active)
        .ok_or(PromoRejection::NotFound)?;
    let coupon = &promo.coupon;
    let now_secs = now.timestamp();

    let expired = promo.expires_at.is_some_and(|t| t <= now_secs)
        || !coupon.valid
        || coupon.redeem_by.is_some_and(|t| t <= now_secs);
    if expired {
        return Err(PromoRejection::Expired);
    }

    if let Some(products) = coupon.applies_to_products.as_ref().filter(|p| !p.is_empty()) {
        if !products.contains(&price.product_id) {
            return Err(PromoRejection::WrongProduct(products.clone()));
        }
    }

    if let Some(prices) = &coupon.applies_to_prices {
        if !prices.contains(&price.id) {
            return Err(PromoRejection::WrongPrice);
        }
    }

    if let Some(cycle) = coupon
        .metadata
        .get("billing_cycle")
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
    {
        if !cycle.eq_ignore_ascii_case(price.interval.as_ref()) {
            return Err(PromoRejection::WrongBillingCycle(cycle.to_string()));
        }
    }

    let discount_amount = discount_for(coupon.percent_off, coupon.amount_off, price.unit_amount);
    if discount_amount <= 0 {
        return Err(PromoRejection::NoDiscount);
    }

    Ok(AppliedPromo {
        promotion_code_id: promo.id.clone(),
        code: promo.code.clone(),
        coupon_id: coupon.id.clone(),
        percent_off: coupon.percent_off,
        amount_off: coupon.amount_off,
        discount_amount,
    })
}
