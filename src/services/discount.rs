//! Loyalty discount calculation. Pure, no I/O.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::entities::Rank;

/// Breakdown of the discount applied to an order. Recomputed on every
/// checkout; never taken from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCalculation {
    pub original_amount: Decimal,
    /// Whole percent, e.g. `5` for 5%.
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub user_rank: Rank,
}

/// Discount percentage for a rank. Non-decreasing in rank order.
pub fn discount_percentage(rank: Rank) -> Decimal {
    match rank {
        Rank::Bronze => Decimal::ZERO,
        Rank::Silver => dec!(3),
        Rank::Gold => dec!(5),
        Rank::Platinum => dec!(7),
        Rank::Diamond => dec!(10),
    }
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Applies the rank discount to `original_amount`.
///
/// Negative amounts are treated as zero.
pub fn calculate(rank: Rank, original_amount: Decimal) -> DiscountCalculation {
    let original_amount = round_money(original_amount.max(Decimal::ZERO));
    let discount_percentage = discount_percentage(rank);
    let discount_amount = round_money(original_amount / dec!(100) * discount_percentage);
    let final_amount = (original_amount - discount_amount).max(Decimal::ZERO);

    DiscountCalculation {
        original_amount,
        discount_percentage,
        discount_amount,
        final_amount,
        user_rank: rank,
    }
}
