//! The abstract contract of the external payment gateway.
//!
//! The engine never owns a wire protocol; it only asks a collaborator to move money and treats a
//! failure as terminal for the invoking flow. Implementations live with the API layer that embeds
//! the engine.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wfe_common::Money;

/// A refund can target a single payment, or carry an explicit per-payment allocation list when an
/// order holds several active payments. Allocation order is preserved; zero allocations are
/// dropped before the gateway sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundTarget {
    Single(String),
    Allocations(Vec<RefundAllocation>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundAllocation {
    pub reference: String,
    pub amount: Money,
}

impl RefundTarget {
    /// The target with zero-amount allocations removed, ordering preserved.
    pub fn without_empty_allocations(&self) -> RefundTarget {
        match self {
            RefundTarget::Single(r) => RefundTarget::Single(r.clone()),
            RefundTarget::Allocations(allocs) => {
                RefundTarget::Allocations(allocs.iter().filter(|a| !a.amount.is_zero()).cloned().collect())
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfirmation {
    /// The gateway's reference for the movement, recorded on the audit trail.
    pub reference: String,
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("The payment gateway rejected the call: {0}")]
    Rejected(String),
    #[error("The payment gateway could not be reached: {0}")]
    Unavailable(String),
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn capture(&self, reference: &str, amount: Money) -> Result<GatewayConfirmation, PaymentError>;

    async fn refund(
        &self,
        target: &RefundTarget,
        amount: Money,
        metadata: &serde_json::Value,
    ) -> Result<GatewayConfirmation, PaymentError>;

    async fn void(&self, reference: &str) -> Result<GatewayConfirmation, PaymentError>;
}
