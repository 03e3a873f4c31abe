//! Typed view of Stripe webhook events.
//!
//! The envelope is parsed once; the `data.object` payload is decoded into a
//! kind-specific struct so the reconciler can dispatch with a plain `match`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};

use super::timestamp::from_unix;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
    #[serde(default)]
    previous_attributes: Option<serde_json::Value>,
}

/// Event types the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
pub enum EventKind {
    #[strum(serialize = "checkout.session.completed")]
    CheckoutSessionCompleted,
    #[strum(serialize = "customer.subscription.updated")]
    SubscriptionUpdated,
    #[strum(serialize = "customer.subscription.deleted")]
    SubscriptionDeleted,
    #[strum(serialize = "customer.subscription.trial_will_end")]
    TrialWillEnd,
    #[strum(serialize = "invoice.payment_succeeded")]
    InvoicePaymentSucceeded,
    #[strum(serialize = "invoice.payment_failed")]
    InvoicePaymentFailed,
    #[strum(serialize = "payment_intent.payment_failed")]
    PaymentIntentFailed,
    #[strum(serialize = "payment_intent.canceled")]
    PaymentIntentCanceled,
    #[strum(serialize = "payment_intent.requires_action")]
    PaymentIntentRequiresAction,
    #[strum(serialize = "setup_intent.setup_failed")]
    SetupIntentFailed,
}

// ============================================================================
// Payload Objects
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionObject {
    /// End of the current period. Newer API versions only report it per item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.current_period_end)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub billing_reason: Option<String>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
}

impl InvoiceObject {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_deref())
            })
            .filter(|s| !s.is_empty())
    }

    pub fn billing_reason(&self) -> &str {
        self.billing_reason.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StripeErrorDetail {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<StripeErrorDetail>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl PaymentIntentObject {
    pub fn is_trial_authorization(&self) -> bool {
        self.metadata
            .get("is_trial_authorization")
            .is_some_and(|v| v == "true")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetupIntentObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_setup_error: Option<StripeErrorDetail>,
}

impl SetupIntentObject {
    pub fn is_trial_setup(&self) -> bool {
        self.metadata
            .get("is_trial_setup")
            .is_some_and(|v| v == "true")
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.metadata
            .get("subscription_id")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// BillingEvent
// ============================================================================

#[derive(Debug, Clone)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutSessionObject),
    SubscriptionUpdated {
        subscription: SubscriptionObject,
        previous_status: Option<String>,
    },
    SubscriptionDeleted(SubscriptionObject),
    TrialWillEnd(SubscriptionObject),
    InvoicePaymentSucceeded(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    PaymentIntentFailed(PaymentIntentObject),
    PaymentIntentCanceled(PaymentIntentObject),
    PaymentIntentRequiresAction(PaymentIntentObject),
    SetupIntentFailed(SetupIntentObject),
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    /// When Stripe created the event. Used for every timestamp a handler writes.
    pub created: DateTime<Utc>,
    pub payload: EventPayload,
}

impl BillingEvent {
    /// Decode a verified webhook body.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(body)?;
        let created = from_unix(envelope.created).unwrap_or_else(Utc::now);
        let object = envelope.data.object;

        let payload = match envelope.event_type.parse::<EventKind>() {
            Ok(EventKind::CheckoutSessionCompleted) => {
                EventPayload::CheckoutCompleted(serde_json::from_value(object)?)
            }
            Ok(EventKind::SubscriptionUpdated) => {
                let previous_status = envelope
                    .data
                    .previous_attributes
                    .as_ref()
                    .and_then(|prev| prev.get("status"))
                    .and_then(|s| s.as_str())
                    .map(str::to_string);
                EventPayload::SubscriptionUpdated {
                    subscription: serde_json::from_value(object)?,
                    previous_status,
                }
            }
            Ok(EventKind::SubscriptionDeleted) => {
                EventPayload::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            Ok(EventKind::TrialWillEnd) => {
                EventPayload::TrialWillEnd(serde_json::from_value(object)?)
            }
            Ok(EventKind::InvoicePaymentSucceeded) => {
                EventPayload::InvoicePaymentSucceeded(serde_json::from_value(object)?)
            }
            Ok(EventKind::InvoicePaymentFailed) => {
                EventPayload::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            Ok(EventKind::PaymentIntentFailed) => {
                EventPayload::PaymentIntentFailed(serde_json::from_value(object)?)
            }
            Ok(EventKind::PaymentIntentCanceled) => {
                EventPayload::PaymentIntentCanceled(serde_json::from_value(object)?)
            }
            Ok(EventKind::PaymentIntentRequiresAction) => {
                EventPayload::PaymentIntentRequiresAction(serde_json::from_value(object)?)
            }
            Ok(EventKind::SetupIntentFailed) => {
                EventPayload::SetupIntentFailed(serde_json::from_value(object)?)
            }
            Err(_) => EventPayload::Unrecognized,
        };

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            created,
            payload,
        })
    }
}
