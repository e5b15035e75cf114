//! Sale price arithmetic.
//!
//! Pure functions only: no I/O, no clock. The combined discount is the sum of
//! the buyer's tier and the manager-granted additional percent, capped at 100,
//! and the discount amount is rounded half-up to the currency's minor unit.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Digits after the decimal point of the currency's minor unit.
pub const MINOR_UNIT_SCALE: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Output of [`compute_final_price`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    /// Combined percent after capping at 100
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub final_price: Decimal,
}

fn check_percent(name: &str, value: Decimal) -> Result<(), ServiceError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative (got {})",
            name, value
        )));
    }
    if value > HUNDRED {
        return Err(ServiceError::ValidationError(format!(
            "{} must be at most 100 (got {})",
            name, value
        )));
    }
    Ok(())
}

/// Sum of both percents, capped at 100.
pub fn combined_percent(buyer_percent: Decimal, additional_percent: Decimal) -> Decimal {
    (buyer_percent + additional_percent).min(HUNDRED)
}

/// Computes discount and final price for one unit.
///
/// Rejects a negative base price and any percent outside `[0, 100]`.
/// Guarantees `0 <= discount_amount <= base_price` and
/// `final_price == base_price - discount_amount`.
pub fn compute_final_price(
    base_price: Decimal,
    buyer_discount_percent: Decimal,
    additional_discount_percent: Decimal,
) -> Result<PriceBreakdown, ServiceError> {
    if base_price.is_sign_negative() && !base_price.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "base price must not be negative (got {})",
            base_price
        )));
    }
    check_percent("buyer discount percent", buyer_discount_percent)?;
    check_percent("additional discount percent", additional_discount_percent)?;

    let discount_percent = combined_percent(buyer_discount_percent, additional_discount_percent);
    let discount_amount = (base_price * discount_percent / HUNDRED)
        .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        // a base price with sub-minor-unit digits could round past itself
        .min(base_price);

    Ok(PriceBreakdown {
        base_price,
        discount_percent,
        discount_amount,
        final_price: base_price - discount_amount,
    })
}
