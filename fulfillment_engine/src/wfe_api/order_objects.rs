use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wfe_common::parse_boolean_flag;

use crate::{
    db_types::{OrderNumber, OrderOrigin, OrderStatusType},
    traits::FulfillmentLineInput,
};

/// Explicit fulfillment policy, passed into every lifecycle call. There is no process-wide
/// settings singleton; the embedding application decides where these values come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FulfillmentPolicy {
    /// Allow fulfilling orders whose charge target is not yet covered.
    pub allow_unpaid_fulfillment: bool,
    /// Newly created fulfillments consume stock immediately instead of waiting for approval.
    pub auto_approve: bool,
}

impl Default for FulfillmentPolicy {
    fn default() -> Self {
        Self { allow_unpaid_fulfillment: true, auto_approve: true }
    }
}

impl FulfillmentPolicy {
    /// Reads the policy from `WFE_ALLOW_UNPAID_FULFILLMENT` and `WFE_AUTO_APPROVE_FULFILLMENT`,
    /// defaulting both to true.
    pub fn from_env() -> Self {
        Self {
            allow_unpaid_fulfillment: parse_boolean_flag(std::env::var("WFE_ALLOW_UNPAID_FULFILLMENT").ok(), true),
            auto_approve: parse_boolean_flag(std::env::var("WFE_AUTO_APPROVE_FULFILLMENT").ok(), true),
        }
    }
}

/// A fulfillment batch request: which quantities to ship from which warehouses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentRequest {
    pub order_number: OrderNumber,
    pub lines: Vec<FulfillmentLineInput>,
    /// `None` defers to the policy's `auto_approve`.
    pub approved: Option<bool>,
    pub allow_stock_exceed: bool,
    pub tracking_number: Option<String>,
}

impl FulfillmentRequest {
    pub fn new(order_number: OrderNumber, lines: Vec<FulfillmentLineInput>) -> Self {
        Self { order_number, lines, approved: None, allow_stock_exceed: false, tracking_number: None }
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }

    pub fn allow_stock_exceed(mut self) -> Self {
        self.allow_stock_exceed = true;
        self
    }

    pub fn with_tracking_number(mut self, tracking: &str) -> Self {
        self.tracking_number = Some(tracking.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub number: Option<OrderNumber>,
    pub channel: Option<String>,
    pub currency: Option<String>,
    pub origin: Option<OrderOrigin>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_number(mut self, number: OrderNumber) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_channel(mut self, channel: String) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_currency(mut self, currency: String) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_origin(mut self, origin: OrderOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.number.is_none()
            && self.channel.is_none()
            && self.currency.is_none()
            && self.origin.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.status.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(number) = &self.number {
            write!(f, "number: {number}. ")?;
        }
        if let Some(channel) = &self.channel {
            write!(f, "channel: {channel}. ")?;
        }
        if let Some(currency) = &self.currency {
            write!(f, "currency: {currency}. ")?;
        }
        if let Some(origin) = &self.origin {
            write!(f, "origin: {origin}. ")?;
        }
        if let Some(statuses) = &self.status {
            let s = statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "status: [{s}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since: {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until: {until}. ")?;
        }
        Ok(())
    }
}
