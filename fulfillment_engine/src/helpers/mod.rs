//! Pure derivations used by the backends.
//!
//! Everything in this module is a plain function over plain data, so the rules that decide order
//! status and payment status can be tested without a database.
mod order_status;
mod payment_status;

pub use order_status::{derive_order_status, LineFulfillmentTotals};
pub use payment_status::{derive_authorize_status, derive_charge_status};
