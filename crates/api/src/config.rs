//! Application configuration loaded from environment variables.

use common::{Currency, Money};
use domain::ShippingRule;
use saga::CheckoutConfig;

/// Server and checkout configuration with sensible defaults.
///
/// Environment variables:
/// - `HOST` — bind address (default `"0.0.0.0"`)
/// - `PORT` — listen port (default `3000`)
/// - `WEBHOOK_SECRET` — shared secret for gateway webhook signatures
/// - `TAX_RATE_BPS` — tax rate in basis points (default `1900`)
/// - `SHIPPING_FLAT_CENTS` — flat shipping rate (default `495`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS` — free-shipping subtotal threshold
///   (default `10000`; `0` disables)
/// - `RESERVATION_TTL_MINUTES` — inventory hold lifetime (default `30`)
/// - `INTENT_TTL_MINUTES` — payment intent lifetime (default `15`)
/// - `SWEEP_INTERVAL_SECS` — abandoned-checkout sweep period (default `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub webhook_secret: String,
    pub tax_rate_bps: u32,
    pub shipping_flat_cents: i64,
    pub free_shipping_threshold_cents: i64,
    pub reservation_ttl_minutes: i64,
    pub intent_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 3000),
            webhook_secret: env_or("WEBHOOK_SECRET", "whsec_dev_only"),
            tax_rate_bps: env_parsed("TAX_RATE_BPS", 1900),
            shipping_flat_cents: env_parsed("SHIPPING_FLAT_CENTS", 495),
            free_shipping_threshold_cents: env_parsed("FREE_SHIPPING_THRESHOLD_CENTS", 10_000),
            reservation_ttl_minutes: env_parsed("RESERVATION_TTL_MINUTES", 30),
            intent_ttl_minutes: env_parsed("INTENT_TTL_MINUTES", 15),
            sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECS", 60),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the checkout configuration for the orchestrator.
    pub fn checkout_config(&self) -> CheckoutConfig {
        let mut shipping = ShippingRule::flat(Money::from_cents(self.shipping_flat_cents));
        if self.free_shipping_threshold_cents > 0 {
            shipping =
                shipping.with_free_above(Money::from_cents(self.free_shipping_threshold_cents));
        }

        CheckoutConfig {
            currency: Currency::Eur,
            tax_rate_bps: self.tax_rate_bps,
            shipping,
            reservation_ttl: chrono::Duration::minutes(self.reservation_ttl_minutes),
            intent_ttl: chrono::Duration::minutes(self.intent_ttl_minutes),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            webhook_secret: "whsec_dev_only".to_string(),
            tax_rate_bps: 1900,
            shipping_flat_cents: 495,
            free_shipping_threshold_cents: 10_000,
            reservation_ttl_minutes: 30,
            intent_ttl_minutes: 15,
            sweep_interval_secs: 60,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
