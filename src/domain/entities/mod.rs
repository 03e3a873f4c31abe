pub mod billing_event;
pub mod billing_interval;
pub mod credit_record;
pub mod model_tier;
pub mod plan_type;
pub mod subscription_record;
pub mod subscription_status;
pub mod timestamp;
