use wfe_common::Money;

use crate::db_types::{AuthorizeStatusType, ChargeStatusType};

/// Classifies the charged total against the charge target (gross total less granted refunds).
///
/// A zero target met by a zero charge is `Full`: the granted refunds require nothing to be
/// charged, and nothing is.
pub fn derive_charge_status(charged: Money, target: Money) -> ChargeStatusType {
    if charged.is_zero() && !target.is_zero() {
        ChargeStatusType::None
    } else if charged == target {
        ChargeStatusType::Full
    } else if charged > target {
        ChargeStatusType::Overcharged
    } else {
        ChargeStatusType::Partial
    }
}

/// Classifies the authorized total against the order total. Granted refunds do not reduce the
/// authorize target, and holding more than the target still classifies as `Full`.
pub fn derive_authorize_status(authorized: Money, target: Money) -> AuthorizeStatusType {
    if authorized >= target && !(authorized.is_zero() && !target.is_zero()) {
        AuthorizeStatusType::Full
    } else if authorized.is_positive() {
        AuthorizeStatusType::Partial
    } else {
        AuthorizeStatusType::None
    }
}
