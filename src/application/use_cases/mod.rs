pub mod account;
pub mod checkout;
pub mod credit_ledger;
pub mod customer_index;
pub mod event_reconciler;
pub mod plan_credits;
pub mod profiles;
pub mod promo_codes;
pub mod subscription_records;
