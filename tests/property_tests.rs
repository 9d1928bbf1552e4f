use order_engine::entities::Rank;
use order_engine::services::discount::{calculate, discount_percentage};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn rank() -> impl Strategy<Value = Rank> {
    prop_oneof![
        Just(Rank::Bronze),
        Just(Rank::Silver),
        Just(Rank::Gold),
        Just(Rank::Platinum),
        Just(Rank::Diamond),
    ]
}

fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    #[test]
    fn final_amount_is_original_minus_discount(rank in rank(), amount in amount()) {
        let calc = calculate(rank, amount);
        prop_assert_eq!(calc.final_amount, calc.original_amount - calc.discount_amount);
        prop_assert!(calc.final_amount >= Decimal::ZERO);
        prop_assert!(calc.discount_amount <= calc.original_amount);
        prop_assert_eq!(calc.user_rank, rank);
    }

    #[test]
    fn calculation_is_deterministic(rank in rank(), amount in amount()) {
        prop_assert_eq!(calculate(rank, amount), calculate(rank, amount));
    }

    #[test]
    fn amounts_carry_at_most_two_decimals(rank in rank(), amount in amount()) {
        let calc = calculate(rank, amount);
        prop_assert!(calc.discount_amount.scale() <= 2);
        prop_assert!(calc.final_amount.scale() <= 2);
    }

    #[test]
    fn higher_rank_never_pays_more(a in rank(), b in rank(), amount in amount()) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(discount_percentage(low) <= discount_percentage(high));
        prop_assert!(calculate(high, amount).final_amount <= calculate(low, amount).final_amount);
    }
}
