//! Pure money math for order totals. No I/O, no side effects.

use common::Money;
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderItem};

/// Shipping pricing: a flat regional rate, waived above an optional
/// free-shipping subtotal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRule {
    /// Flat rate charged per order.
    pub flat_rate: Money,

    /// Subtotals at or above this threshold ship free.
    pub free_above: Option<Money>,
}

impl ShippingRule {
    /// Creates a flat-rate rule with no free-shipping threshold.
    pub fn flat(rate: Money) -> Self {
        Self {
            flat_rate: rate,
            free_above: None,
        }
    }

    /// Adds a free-shipping subtotal threshold.
    pub fn with_free_above(mut self, threshold: Money) -> Self {
        self.free_above = Some(threshold);
        self
    }

    /// Returns the shipping charge for a given subtotal.
    pub fn charge_for(&self, subtotal: Money) -> Money {
        match self.free_above {
            Some(threshold) if subtotal >= threshold => Money::zero(),
            _ => self.flat_rate,
        }
    }
}

/// The monetary breakdown of an order.
///
/// Invariant: `total == subtotal + tax + shipping - discount`, always, at
/// two-decimal precision. [`calculate_totals`] constructs values holding
/// the invariant; [`Totals::is_consistent`] revalidates it at order
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl Totals {
    /// Returns true if the total equals subtotal + tax + shipping − discount.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping - self.discount
    }
}

/// Computes the totals for a set of line items.
///
/// Line totals (`quantity × unit_price`) and their sum are exact in integer
/// cents, so the only rounding point is the tax: `subtotal × tax_rate`
/// rounds half-up to the nearest cent once, after the subtotal is
/// finalized. Rounding per line item would differ for some carts; the
/// per-subtotal rule is the one adopted here.
///
/// `tax_rate_bps` is the tax rate in basis points (1900 = 19%).
pub fn calculate_totals(
    items: &[OrderItem],
    tax_rate_bps: u32,
    shipping_rule: &ShippingRule,
    discount: Money,
) -> Result<Totals, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                sku: item.sku.to_string(),
                quantity: item.quantity,
            });
        }
        if !item.unit_price.is_positive() {
            return Err(OrderError::InvalidUnitPrice {
                sku: item.sku.to_string(),
                price: item.unit_price.cents(),
            });
        }
    }

    if discount.is_negative() {
        return Err(OrderError::InvalidDiscount {
            discount: discount.cents(),
        });
    }

    let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
    let tax = subtotal.apply_rate_bps(tax_rate_bps);
    let shipping = shipping_rule.charge_for(subtotal);

    let gross = subtotal + tax + shipping;
    if discount > gross {
        return Err(OrderError::DiscountExceedsOrderValue {
            discount: discount.cents(),
            gross: gross.cents(),
        });
    }

    Ok(Totals {
        subtotal,
        tax,
        shipping,
        discount,
        total: gross - discount,
    })
}
