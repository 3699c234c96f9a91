//! Checkout configuration.

use chrono::Duration;
use common::{Currency, Money};
use domain::ShippingRule;

/// Pricing and timing knobs for the checkout flow.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Currency every order is charged in.
    pub currency: Currency,

    /// Tax rate in basis points (1900 = 19%).
    pub tax_rate_bps: u32,

    /// Shipping pricing rule.
    pub shipping: ShippingRule,

    /// How long inventory holds live before the sweep cancels the
    /// checkout.
    pub reservation_ttl: Duration,

    /// How long a payment intent stays completable.
    pub intent_ttl: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Eur,
            tax_rate_bps: 1900,
            shipping: ShippingRule::flat(Money::from_cents(495))
                .with_free_above(Money::from_cents(10_000)),
            reservation_ttl: Duration::minutes(30),
            intent_ttl: Duration::minutes(15),
        }
    }
}
