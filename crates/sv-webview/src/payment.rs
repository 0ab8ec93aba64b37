//! Payment provider callback handling and host notification.

use crate::bridge::{Delivery, NativeBridge};
use crate::deeplink::DeepLink;
use sv_api_types::OutboundMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub reference: String,
}

impl PaymentCallback {
    /// `?reference=...` or the provider's `?trxref=...`.
    pub fn from_query(query: &str) -> Option<Self> {
        DeepLink::parse(query)
            .reference
            .map(|reference| Self { reference })
    }

    pub fn outcome_message(&self, outcome: &PaymentOutcome) -> OutboundMessage {
        match outcome {
            PaymentOutcome::Verified { new_balance } => OutboundMessage::PaymentSuccess {
                reference: self.reference.clone(),
                new_balance: *new_balance,
            },
            PaymentOutcome::Failed { message } => OutboundMessage::PaymentFailed {
                reference: self.reference.clone(),
                message: message.clone(),
            },
            PaymentOutcome::Error { message } => OutboundMessage::PaymentError {
                message: message.clone(),
            },
        }
    }
}

/// Result of verifying a callback reference with the API.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Verified { new_balance: Option<f64> },
    /// The provider reported the charge as not successful.
    Failed { message: String },
    /// Verification itself could not complete.
    Error { message: String },
}

pub fn notify_payment_outcome(
    bridge: &NativeBridge,
    callback: &PaymentCallback,
    outcome: &PaymentOutcome,
) -> Delivery {
    bridge.send(&callback.outcome_message(outcome))
}
