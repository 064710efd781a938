use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::DomainError;

/// ISO-4217 style three-letter code, stored upper-case so comparisons are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let code = raw.trim();
        if code.len() != 3 || !code.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(DomainError::Validation(format!(
                "currency must be a 3-letter code, got `{raw}`"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RateLookupError {
    #[error("no conversion rate from {from} to {to}")]
    NotFound { from: CurrencyCode, to: CurrencyCode },
    #[error("rate lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Units of `to` per one unit of `from`.
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal, RateLookupError>;
}

/// What submission does when a rate cannot be obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fail the submission with `RateLookupFailed`.
    #[default]
    Reject,
    /// Carry the submitted amount over unconverted.
    BestEffort,
}

impl FromStr for FallbackPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            other => Err(DomainError::Validation(format!(
                "unsupported currency fallback `{other}` (expected reject|best_effort)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionSettings {
    pub fallback: FallbackPolicy,
    pub timeout: Duration,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self { fallback: FallbackPolicy::Reject, timeout: Duration::from_secs(5) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedAmount {
    pub amount: Decimal,
    pub rate: Option<Decimal>,
    /// Set when the lookup failed and the fallback policy carried the amount unconverted.
    pub degraded_reason: Option<RateLookupError>,
}

/// Converts `amount` from `from` into `to`, honouring the timeout and fallback policy.
pub async fn normalize_amount(
    provider: &dyn RateProvider,
    amount: Decimal,
    from: &CurrencyCode,
    to: &CurrencyCode,
    settings: ConversionSettings,
) -> Result<NormalizedAmount, DomainError> {
    if from == to {
        return Ok(NormalizedAmount { amount, rate: None, degraded_reason: None });
    }

    let lookup = match tokio::time::timeout(settings.timeout, provider.get_rate(from, to)).await {
        Ok(result) => result,
        Err(_) => Err(RateLookupError::Timeout(settings.timeout)),
    };

    match (lookup, settings.fallback) {
        (Ok(rate), _) if rate > Decimal::ZERO => Ok(NormalizedAmount {
            amount: (amount * rate)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            rate: Some(rate),
            degraded_reason: None,
        }),
        (Ok(rate), policy) => {
            let error = RateLookupError::Unavailable(format!(
                "provider returned non-positive rate {rate}"
            ));
            fallback(amount, from, to, error, policy)
        }
        (Err(error), policy) => fallback(amount, from, to, error, policy),
    }
}

fn fallback(
    amount: Decimal,
    from: &CurrencyCode,
    to: &CurrencyCode,
    error: RateLookupError,
    policy: FallbackPolicy,
) -> Result<NormalizedAmount, DomainError> {
    match policy {
        FallbackPolicy::Reject => Err(DomainError::RateLookupFailed {
            from: from.to_string(),
            to: to.to_string(),
            reason: error.to_string(),
        }),
        FallbackPolicy::BestEffort => {
            Ok(NormalizedAmount { amount, rate: None, degraded_reason: Some(error) })
        }
    }
}

/// Fixed table of rates, keyed by (from, to).
#[derive(Clone, Debug, Default)]
pub struct StaticRateProvider {
    rates: HashMap<(CurrencyCode, CurrencyCode), Decimal>,
}

impl StaticRateProvider {
    pub fn with_rates(rates: Vec<(CurrencyCode, CurrencyCode, Decimal)>) -> Self {
        Self { rates: rates.into_iter().map(|(from, to, rate)| ((from, to), rate)).collect() }
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal, RateLookupError> {
        self.rates
            .get(&(from.clone(), to.clone()))
            .copied()
            .ok_or_else(|| RateLookupError::NotFound { from: from.clone(), to: to.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::{
        normalize_amount, ConversionSettings, CurrencyCode, FallbackPolicy, RateLookupError,
        RateProvider, StaticRateProvider,
    };
    use crate::errors::DomainError;

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).expect("valid currency")
    }

    fn provider() -> StaticRateProvider {
        StaticRateProvider::with_rates(vec![(code("EUR"), code("USD"), Decimal::new(108, 2))])
    }

    struct StalledProvider;

    #[async_trait]
    impl RateProvider for StalledProvider {
        async fn get_rate(
            &self,
            _from: &CurrencyCode,
            _to: &CurrencyCode,
        ) -> Result<Decimal, RateLookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Decimal::ONE)
        }
    }

    #[test]
    fn currency_codes_are_normalized_to_upper_case() {
        assert_eq!(code("inr").as_str(), "INR");
        assert_eq!(code(" usd "), code("USD"));
        assert!(CurrencyCode::parse("US").is_err());
        assert!(CurrencyCode::parse("U5D").is_err());
    }

    #[tokio::test]
    async fn same_currency_skips_lookup() {
        let result = normalize_amount(
            &StaticRateProvider::default(),
            Decimal::new(1_000, 2),
            &code("usd"),
            &code("USD"),
            ConversionSettings::default(),
        )
        .await
        .expect("no conversion needed");

        assert_eq!(result.amount, Decimal::new(1_000, 2));
        assert!(result.rate.is_none());
    }

    #[tokio::test]
    async fn converts_and_rounds_to_cents() {
        let result = normalize_amount(
            &provider(),
            Decimal::new(3_333, 2),
            &code("EUR"),
            &code("USD"),
            ConversionSettings::default(),
        )
        .await
        .expect("conversion");

        assert_eq!(result.amount, Decimal::new(3_600, 2));
        assert_eq!(result.rate, Some(Decimal::new(108, 2)));
    }

    #[tokio::test]
    async fn missing_rate_is_rejected_under_default_policy() {
        let error = normalize_amount(
            &provider(),
            Decimal::new(1_000, 2),
            &code("GBP"),
            &code("USD"),
            ConversionSettings::default(),
        )
        .await
        .expect_err("missing rate should fail");

        assert!(matches!(error, DomainError::RateLookupFailed { ref from, .. } if from == "GBP"));
    }

    #[tokio::test]
    async fn best_effort_carries_amount_unconverted() {
        let result = normalize_amount(
            &provider(),
            Decimal::new(1_000, 2),
            &code("GBP"),
            &code("USD"),
            ConversionSettings {
                fallback: FallbackPolicy::BestEffort,
                ..ConversionSettings::default()
            },
        )
        .await
        .expect("best effort succeeds");

        assert_eq!(result.amount, Decimal::new(1_000, 2));
        assert!(matches!(result.degraded_reason, Some(RateLookupError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_is_bounded_by_timeout() {
        let error = normalize_amount(
            &StalledProvider,
            Decimal::ONE,
            &code("EUR"),
            &code("USD"),
            ConversionSettings {
                fallback: FallbackPolicy::Reject,
                timeout: Duration::from_millis(200),
            },
        )
        .await
        .expect_err("lookup should time out");

        assert!(matches!(
            error,
            DomainError::RateLookupFailed { ref reason, .. } if reason.contains("timed out")
        ));
    }
}
