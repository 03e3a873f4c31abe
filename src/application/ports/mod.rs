pub mod billing_provider;
pub mod key_value_store;
