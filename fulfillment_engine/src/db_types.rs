use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use wfe_common::Money;

//--------------------------------------    OrderNumber      ---------------------------------------------------------
/// The public identifier of an order, as assigned by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    WarehouseId      ---------------------------------------------------------
/// A lightweight wrapper around the external identifier of a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct WarehouseId(pub String);

impl Display for WarehouseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for WarehouseId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------     VariantId       ---------------------------------------------------------
/// A lightweight wrapper around the external identifier of a product variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct VariantId(pub String);

impl Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for VariantId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------  OrderStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created but not yet confirmed by the customer or an admin.
    Draft,
    /// The order awaits confirmation before fulfillment work may begin.
    Unconfirmed,
    /// No ordered quantity has reached a fulfilled or returned state.
    Unfulfilled,
    /// Some, but not all, ordered quantity is fulfilled.
    PartiallyFulfilled,
    /// Every ordered quantity is fulfilled.
    Fulfilled,
    /// Some, but not all, ordered quantity has been returned.
    PartiallyReturned,
    /// Every ordered quantity has been returned.
    Returned,
    /// The order has been cancelled by the customer or an admin.
    Canceled,
}

impl OrderStatusType {
    /// Whether this status is derived from fulfillment state and may be overwritten by a recomputation.
    pub fn is_fulfillment_derived(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Unfulfilled
                | OrderStatusType::PartiallyFulfilled
                | OrderStatusType::Fulfilled
                | OrderStatusType::PartiallyReturned
                | OrderStatusType::Returned
        )
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Draft => write!(f, "Draft"),
            OrderStatusType::Unconfirmed => write!(f, "Unconfirmed"),
            OrderStatusType::Unfulfilled => write!(f, "Unfulfilled"),
            OrderStatusType::PartiallyFulfilled => write!(f, "PartiallyFulfilled"),
            OrderStatusType::Fulfilled => write!(f, "Fulfilled"),
            OrderStatusType::PartiallyReturned => write!(f, "PartiallyReturned"),
            OrderStatusType::Returned => write!(f, "Returned"),
            OrderStatusType::Canceled => write!(f, "Canceled"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(Self::Draft),
            "Unconfirmed" => Ok(Self::Unconfirmed),
            "Unfulfilled" => Ok(Self::Unfulfilled),
            "PartiallyFulfilled" => Ok(Self::PartiallyFulfilled),
            "Fulfilled" => Ok(Self::Fulfilled),
            "PartiallyReturned" => Ok(Self::PartiallyReturned),
            "Returned" => Ok(Self::Returned),
            "Canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Unfulfilled");
            OrderStatusType::Unfulfilled
        })
    }
}

//--------------------------------------    OrderOrigin      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderOrigin {
    /// A regular customer order.
    Regular,
    /// A replacement order spawned by a return-and-replace flow.
    Reissue,
}

impl Display for OrderOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderOrigin::Regular => write!(f, "Regular"),
            OrderOrigin::Reissue => write!(f, "Reissue"),
        }
    }
}

impl FromStr for OrderOrigin {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Regular" => Ok(Self::Regular),
            "Reissue" => Ok(Self::Reissue),
            s => Err(ConversionError(format!("Invalid order origin: {s}"))),
        }
    }
}

//-------------------------------------- FulfillmentStatusType -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum FulfillmentStatusType {
    /// Created without stock consumption; goods ship only after approval.
    WaitingForApproval,
    /// Stock has been consumed and the goods have shipped.
    Fulfilled,
    /// The fulfillment was cancelled and its stock restocked.
    Canceled,
    /// Money was refunded for the goods, which were not returned.
    Refunded,
    /// The goods came back without a refund.
    Returned,
    /// The goods came back and the money was refunded.
    RefundedAndReturned,
    /// The goods came back and a replacement order was issued.
    Replaced,
}

impl FulfillmentStatusType {
    /// Statuses whose lines count towards the fulfilled bucket of the order status derivation.
    pub fn counts_as_fulfilled(&self) -> bool {
        matches!(self, FulfillmentStatusType::Fulfilled | FulfillmentStatusType::Replaced)
    }

    /// Statuses whose lines count towards the returned bucket of the order status derivation.
    pub fn counts_as_returned(&self) -> bool {
        matches!(self, FulfillmentStatusType::Returned | FulfillmentStatusType::RefundedAndReturned)
    }
}

impl Display for FulfillmentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FulfillmentStatusType::WaitingForApproval => write!(f, "WaitingForApproval"),
            FulfillmentStatusType::Fulfilled => write!(f, "Fulfilled"),
            FulfillmentStatusType::Canceled => write!(f, "Canceled"),
            FulfillmentStatusType::Refunded => write!(f, "Refunded"),
            FulfillmentStatusType::Returned => write!(f, "Returned"),
            FulfillmentStatusType::RefundedAndReturned => write!(f, "RefundedAndReturned"),
            FulfillmentStatusType::Replaced => write!(f, "Replaced"),
        }
    }
}

impl FromStr for FulfillmentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WaitingForApproval" => Ok(Self::WaitingForApproval),
            "Fulfilled" => Ok(Self::Fulfilled),
            "Canceled" => Ok(Self::Canceled),
            "Refunded" => Ok(Self::Refunded),
            "Returned" => Ok(Self::Returned),
            "RefundedAndReturned" => Ok(Self::RefundedAndReturned),
            "Replaced" => Ok(Self::Replaced),
            s => Err(ConversionError(format!("Invalid fulfillment status: {s}"))),
        }
    }
}

//--------------------------------------  ChargeStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ChargeStatusType {
    /// Nothing has been charged, and the charge target is non-zero.
    None,
    /// The charged total is positive but below the charge target.
    Partial,
    /// The charged total equals the charge target.
    Full,
    /// The charged total exceeds the charge target.
    Overcharged,
}

impl Display for ChargeStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChargeStatusType::None => write!(f, "None"),
            ChargeStatusType::Partial => write!(f, "Partial"),
            ChargeStatusType::Full => write!(f, "Full"),
            ChargeStatusType::Overcharged => write!(f, "Overcharged"),
        }
    }
}

impl ChargeStatusType {
    /// An order is considered paid for fulfillment-policy purposes once its charge target is covered.
    pub fn is_fully_charged(&self) -> bool {
        matches!(self, ChargeStatusType::Full | ChargeStatusType::Overcharged)
    }
}

//-------------------------------------- AuthorizeStatusType ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuthorizeStatusType {
    None,
    Partial,
    /// Covers the order total, including over-authorization.
    Full,
}

impl Display for AuthorizeStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorizeStatusType::None => write!(f, "None"),
            AuthorizeStatusType::Partial => write!(f, "Partial"),
            AuthorizeStatusType::Full => write!(f, "Full"),
        }
    }
}

//-------------------------------------- TransactionEventType --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionEventType {
    AuthorizationSuccess,
    ChargeSuccess,
    RefundSuccess,
    CancelSuccess,
    /// A change to an already-authorized amount; the event amount is the signed delta.
    AuthorizationAdjustment,
    /// Free-form informational entry.
    Info,
}

impl Display for TransactionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionEventType::AuthorizationSuccess => write!(f, "AuthorizationSuccess"),
            TransactionEventType::ChargeSuccess => write!(f, "ChargeSuccess"),
            TransactionEventType::RefundSuccess => write!(f, "RefundSuccess"),
            TransactionEventType::CancelSuccess => write!(f, "CancelSuccess"),
            TransactionEventType::AuthorizationAdjustment => write!(f, "AuthorizationAdjustment"),
            TransactionEventType::Info => write!(f, "Info"),
        }
    }
}

//--------------------------------------   OrderEventType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderEventType {
    FulfillmentCreated,
    FulfillmentApproved,
    FulfillmentCanceled,
    FulfillmentReturned,
    FulfillmentRefunded,
    FulfillmentReplaced,
    TrackingUpdated,
    PaymentRefunded,
    PaymentRefundFailed,
}

impl Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderEventType::FulfillmentCreated => write!(f, "FulfillmentCreated"),
            OrderEventType::FulfillmentApproved => write!(f, "FulfillmentApproved"),
            OrderEventType::FulfillmentCanceled => write!(f, "FulfillmentCanceled"),
            OrderEventType::FulfillmentReturned => write!(f, "FulfillmentReturned"),
            OrderEventType::FulfillmentRefunded => write!(f, "FulfillmentRefunded"),
            OrderEventType::FulfillmentReplaced => write!(f, "FulfillmentReplaced"),
            OrderEventType::TrackingUpdated => write!(f, "TrackingUpdated"),
            OrderEventType::PaymentRefunded => write!(f, "PaymentRefunded"),
            OrderEventType::PaymentRefundFailed => write!(f, "PaymentRefundFailed"),
        }
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub number: OrderNumber,
    pub status: OrderStatusType,
    pub origin: OrderOrigin,
    /// Set when this order was spawned as a replacement for another order.
    pub original_order_id: Option<i64>,
    pub currency: String,
    pub channel: String,
    pub total_gross: Money,
    pub total_net: Money,
    pub shipping_price_gross: Money,
    pub shipping_price_net: Money,
    /// Aggregates over this order's transaction items, maintained by the transaction flows.
    pub total_authorized: Money,
    pub total_charged: Money,
    pub total_refunded: Money,
    pub total_canceled: Money,
    /// Amounts from the pre-transaction single-payment era, folded into the aggregates.
    pub legacy_authorized: Money,
    pub legacy_charged: Money,
    pub charge_status: ChargeStatusType,
    pub authorize_status: AuthorizeStatusType,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The amount a full charge must reach: the gross total less all granted refunds.
    pub fn charge_target(&self, granted_refunds: Money) -> Money {
        self.total_gross - granted_refunds
    }
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub currency: String,
    pub channel: String,
    pub total_gross: Money,
    pub total_net: Money,
    pub shipping_price_gross: Money,
    pub shipping_price_net: Money,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub metadata: Option<String>,
}

impl NewOrder {
    pub fn new(number: OrderNumber, currency: &str, total_gross: Money, total_net: Money) -> Self {
        Self {
            number,
            currency: currency.to_string(),
            channel: "default".to_string(),
            total_gross,
            total_net,
            shipping_price_gross: Money::ZERO,
            shipping_price_net: Money::ZERO,
            shipping_address: None,
            billing_address: None,
            metadata: None,
        }
    }

    pub fn with_shipping_price(mut self, gross: Money, net: Money) -> Self {
        self.shipping_price_gross = gross;
        self.shipping_price_net = net;
        self
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }
}

//--------------------------------------     OrderLine       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: VariantId,
    pub product_name: String,
    pub sku: String,
    pub quantity: i64,
    /// Quantity that has reached the fulfilled tier. Quantity reserved in fulfillments awaiting
    /// approval is tracked through those fulfillments' lines, not here.
    pub quantity_fulfilled: i64,
    pub unit_price_gross: Money,
    pub unit_price_net: Money,
    /// Tax rate in basis points.
    pub tax_rate: i64,
    pub is_gift_card: bool,
    pub is_preorder: bool,
}

impl OrderLine {
    pub fn quantity_unfulfilled(&self) -> i64 {
        self.quantity - self.quantity_fulfilled
    }
}

//--------------------------------------    NewOrderLine     ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub variant_id: VariantId,
    pub product_name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_price_gross: Money,
    pub unit_price_net: Money,
    pub tax_rate: i64,
    pub is_gift_card: bool,
    pub is_preorder: bool,
}

impl NewOrderLine {
    pub fn new(variant_id: VariantId, product_name: &str, quantity: i64, unit_price_gross: Money) -> Self {
        Self {
            variant_id,
            product_name: product_name.to_string(),
            sku: String::new(),
            quantity,
            unit_price_gross,
            unit_price_net: unit_price_gross,
            tax_rate: 0,
            is_gift_card: false,
            is_preorder: false,
        }
    }

    pub fn with_sku(mut self, sku: &str) -> Self {
        self.sku = sku.to_string();
        self
    }

    pub fn gift_card(mut self) -> Self {
        self.is_gift_card = true;
        self
    }

    pub fn preorder(mut self) -> Self {
        self.is_preorder = true;
        self
    }
}

//--------------------------------------    Fulfillment      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Fulfillment {
    pub id: i64,
    pub order_id: i64,
    /// Sequential per-order ordinal, assigned at creation and never reused.
    pub ordinal: i64,
    pub status: FulfillmentStatusType,
    pub tracking_number: Option<String>,
    /// Set only by the refund/return paths.
    pub total_refund_amount: Option<Money>,
    pub shipping_refund_amount: Option<Money>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  FulfillmentLine    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FulfillmentLine {
    pub id: i64,
    pub fulfillment_id: i64,
    pub order_line_id: i64,
    /// Present for physically-consumed lines; return/replace bookkeeping lines carry no stock.
    pub stock_id: Option<i64>,
    pub quantity: i64,
}

//--------------------------------------       Stock         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Stock {
    pub id: i64,
    pub warehouse_id: WarehouseId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

//--------------------------------------      NewStock       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewStock {
    pub warehouse_id: WarehouseId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

impl NewStock {
    pub fn new(warehouse_id: WarehouseId, variant_id: VariantId, quantity: i64) -> Self {
        Self { warehouse_id, variant_id, quantity }
    }
}

//--------------------------------------     Allocation      ---------------------------------------------------------
/// A reservation of stock quantity against a specific order line, prior to physical consumption.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub order_line_id: i64,
    pub stock_id: i64,
    pub quantity_allocated: i64,
}

//--------------------------------------      Checkout       ---------------------------------------------------------
/// The pre-order owner of transaction items. Conversion into an order is out of scope for the
/// engine; the checkout only participates in amount aggregation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Checkout {
    pub id: i64,
    pub currency: String,
    pub total_gross: Money,
    pub total_authorized: Money,
    pub total_charged: Money,
    pub total_refunded: Money,
    pub total_canceled: Money,
    pub charge_status: ChargeStatusType,
    pub authorize_status: AuthorizeStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub currency: String,
    pub total_gross: Money,
}

impl NewCheckout {
    pub fn new(currency: &str, total_gross: Money) -> Self {
        Self { currency: currency.to_string(), total_gross }
    }
}

//--------------------------------------  TransactionItem    ---------------------------------------------------------
/// One payment transaction attached to an order or a checkout. The four amount fields are
/// independent; setting one never implicitly adjusts another. Pending values track amounts
/// requested from the gateway but not yet confirmed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: i64,
    pub order_id: Option<i64>,
    pub checkout_id: Option<i64>,
    pub name: String,
    pub psp_reference: Option<String>,
    pub currency: String,
    pub authorized_value: Money,
    pub charged_value: Money,
    pub refunded_value: Money,
    pub canceled_value: Money,
    pub authorize_pending_value: Money,
    pub charge_pending_value: Money,
    pub refund_pending_value: Money,
    pub cancel_pending_value: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewTransaction    ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub name: String,
    pub psp_reference: Option<String>,
    pub currency: String,
    pub authorized_value: Money,
    pub charged_value: Money,
    pub refunded_value: Money,
    pub canceled_value: Money,
    pub authorize_pending_value: Money,
    pub charge_pending_value: Money,
    pub refund_pending_value: Money,
    pub cancel_pending_value: Money,
}

impl NewTransaction {
    pub fn new(name: &str, currency: &str) -> Self {
        Self { name: name.to_string(), currency: currency.to_string(), ..Default::default() }
    }

    pub fn authorized(mut self, amount: Money) -> Self {
        self.authorized_value = amount;
        self
    }

    pub fn charged(mut self, amount: Money) -> Self {
        self.charged_value = amount;
        self
    }

    pub fn refunded(mut self, amount: Money) -> Self {
        self.refunded_value = amount;
        self
    }

    pub fn canceled(mut self, amount: Money) -> Self {
        self.canceled_value = amount;
        self
    }

    pub fn with_psp_reference(mut self, reference: &str) -> Self {
        self.psp_reference = Some(reference.to_string());
        self
    }
}

//-------------------------------------- TransactionUpdate   ---------------------------------------------------------
/// A partial update: only the provided fields change. Pending-value changes mutate state without
/// emitting calculation events.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub authorized_value: Option<Money>,
    pub charged_value: Option<Money>,
    pub refunded_value: Option<Money>,
    pub canceled_value: Option<Money>,
    pub authorize_pending_value: Option<Money>,
    pub charge_pending_value: Option<Money>,
    pub refund_pending_value: Option<Money>,
    pub cancel_pending_value: Option<Money>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.authorized_value.is_none()
            && self.charged_value.is_none()
            && self.refunded_value.is_none()
            && self.canceled_value.is_none()
            && self.authorize_pending_value.is_none()
            && self.charge_pending_value.is_none()
            && self.refund_pending_value.is_none()
            && self.cancel_pending_value.is_none()
    }

    pub fn authorized(mut self, amount: Money) -> Self {
        self.authorized_value = Some(amount);
        self
    }

    pub fn charged(mut self, amount: Money) -> Self {
        self.charged_value = Some(amount);
        self
    }

    pub fn refunded(mut self, amount: Money) -> Self {
        self.refunded_value = Some(amount);
        self
    }

    pub fn canceled(mut self, amount: Money) -> Self {
        self.canceled_value = Some(amount);
        self
    }
}

//-------------------------------------- TransactionEventRow ---------------------------------------------------------
/// Append-only audit entry for a transaction item. Amounts are signed deltas, except during
/// creation where the full initial value is recorded.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionEventRow {
    pub id: i64,
    pub transaction_id: i64,
    pub event_type: TransactionEventType,
    pub amount: Money,
    pub reference: Option<String>,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   OrderEventRow     ---------------------------------------------------------
/// Append-only audit entry for an order, with a JSON parameter bag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderEventRow {
    pub id: i64,
    pub order_id: i64,
    pub event_type: OrderEventType,
    pub params: String,
    pub created_at: DateTime<Utc>,
}

impl OrderEventRow {
    /// The parameter bag, parsed. Events are always written with valid JSON.
    pub fn params_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.params).unwrap_or(serde_json::Value::Null)
    }
}

//--------------------------------------   GrantedRefund     ---------------------------------------------------------
/// A refund amount granted against an order independent of any transaction. The sum of granted
/// refunds reduces the order's charge target.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GrantedRefund {
    pub id: i64,
    pub order_id: i64,
    pub amount: Money,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
