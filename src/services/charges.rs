use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Orders above this subtotal ship free; at or below it the flat rate
/// applies.
const FREE_SHIPPING_THRESHOLD: Decimal = dec!(50.00);
const FLAT_SHIPPING_RATE: Decimal = dec!(5.99);
const TAX_RATE: Decimal = dec!(0.10);

/// Display breakdown of an order's charges. Presentation only: the
/// amount actually charged always comes from the gateway session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeBreakdown {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Computes the confirmation-page breakdown over (unit price, quantity)
/// pairs. All components are rounded half-up to two decimals.
pub fn charge_breakdown<I>(lines: I) -> ChargeBreakdown
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let subtotal: Decimal = lines
        .into_iter()
        .map(|(unit_price, quantity)| unit_price * Decimal::from(quantity))
        .sum();
    let subtotal = round2(subtotal);

    let shipping = if subtotal > FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING_RATE
    };
    let tax = round2(subtotal * TAX_RATE);
    let total = round2(subtotal + shipping + tax);

    ChargeBreakdown {
        subtotal,
        shipping,
        tax,
        total,
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
