//! # Database management and control.
//!
//! This module provides the interface contracts of the fulfillment engine database *backends*,
//! plus the bundled SQLite implementation.
//!
//! ## Traits
//! * [`traits::FulfillmentDatabase`] defines the write-side behaviour: the stock ledger, the
//!   fulfillment lifecycle flows, and the return/replace bookkeeping. Every flow is atomic with
//!   its ledger side effects.
//! * [`traits::TransactionDatabase`] defines the payment-transaction aggregation flows.
//! * [`traits::OrderManagement`] provides read-side queries over orders, fulfillments, stock and
//!   the audit trail.
//!
//! Backends implement the traits; the public API structs in [`crate::wfe_api`] are generic over
//! them and never touch a connection directly.
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
