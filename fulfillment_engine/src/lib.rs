//! Warehouse Fulfillment Engine
//!
//! The fulfillment engine fulfills customer orders against warehouse stock and reconciles money
//! movement across one or more payment transactions, while preserving an auditable, idempotent
//! state under concurrent mutation. This library contains the core logic; it is storefront- and
//! gateway-agnostic, and owns no public network surface of its own.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the bundled backend. You should
//!    never need to access the database directly; use the public API instead. The exception is
//!    the data types used in the database, which are defined in the `db_types` module and are
//!    public.
//! 2. The engine public API ([`mod@wfe_api`]). [`FulfillmentApi`] drives the fulfillment
//!    lifecycle, [`RefundApi`] orchestrates returns/replacements/refunds against an external
//!    payment gateway, and [`TransactionApi`] aggregates per-transaction amounts into order and
//!    checkout charge/authorize statuses. Backends implement the traits in [`mod@traits`] to
//!    serve these APIs.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted
//! when certain transitions occur, for example when an order becomes fully paid. Hooks are async
//! and fire-and-forget; a failing subscriber never fails the transition that produced the event.
mod db;

pub mod db_types;
pub mod events;
pub mod gateway;
pub mod helpers;
mod wfe_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite;
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits;
pub use db::traits::{FulfillmentDatabase, FulfillmentError, OrderManagement, TransactionDatabase, TransactionError};
pub use wfe_api::{
    errors::RefundError,
    fulfillment_api::FulfillmentApi,
    order_objects,
    refund_api::RefundApi,
    refund_objects,
    transaction_api::TransactionApi,
};
