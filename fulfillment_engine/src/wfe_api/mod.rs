//! # Fulfillment engine public API
//!
//! The `wfe_api` module exposes the programmatic API for the fulfillment engine. The API is
//! modular, so clients can pick and choose the functionality they want, and different parts
//! (fulfillment, refunds, transactions) can be wired to different backends.
//!
//! * [`fulfillment_api`] manages the fulfillment lifecycle: creating, approving and cancelling
//!   fulfillments against the stock ledger.
//! * [`refund_api`] orchestrates returns, replacements and refunds, including the external
//!   payment gateway call.
//! * [`transaction_api`] maintains payment-transaction amounts and the derived charge and
//!   authorize statuses of orders and checkouts.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a
//! database backend that implements the traits required by the API, plus the event producers the
//! API should notify.
//!
//! ```rust,ignore
//! use fulfillment_engine::{EventProducers, FulfillmentApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/store.db", 5).await?;
//! let api = FulfillmentApi::new(db, EventProducers::default());
//! let batch = api.create_fulfillments(request, &policy).await?;
//! ```
pub mod errors;
pub mod fulfillment_api;
pub mod order_objects;
pub mod refund_api;
pub mod refund_objects;
pub mod transaction_api;
