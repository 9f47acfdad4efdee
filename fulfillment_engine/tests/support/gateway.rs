use std::sync::{Arc, Mutex};

use fulfillment_engine::gateway::{GatewayConfirmation, PaymentError, PaymentGateway, RefundTarget};
use wfe_common::Money;

/// A gateway double that records every call and can be told to refuse refunds.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    refunds: Arc<Mutex<Vec<(RefundTarget, Money)>>>,
    refuse: Arc<Mutex<bool>>,
}

impl RecordingGateway {
    pub fn refusing() -> Self {
        let gateway = Self::default();
        *gateway.refuse.lock().unwrap() = true;
        gateway
    }

    pub fn refund_calls(&self) -> Vec<(RefundTarget, Money)> {
        self.refunds.lock().unwrap().clone()
    }
}

impl PaymentGateway for RecordingGateway {
    async fn capture(&self, reference: &str, _amount: Money) -> Result<GatewayConfirmation, PaymentError> {
        Ok(GatewayConfirmation { reference: format!("cap-{reference}") })
    }

    async fn refund(
        &self,
        target: &RefundTarget,
        amount: Money,
        _metadata: &serde_json::Value,
    ) -> Result<GatewayConfirmation, PaymentError> {
        if *self.refuse.lock().unwrap() {
            return Err(PaymentError::Rejected("declined by issuer".to_string()));
        }
        self.refunds.lock().unwrap().push((target.clone(), amount));
        Ok(GatewayConfirmation { reference: format!("ref-{}", self.refunds.lock().unwrap().len()) })
    }

    async fn void(&self, reference: &str) -> Result<GatewayConfirmation, PaymentError> {
        Ok(GatewayConfirmation { reference: format!("void-{reference}") })
    }
}
