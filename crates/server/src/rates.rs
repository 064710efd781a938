//! Exchange rates over HTTP.
//!
//! The provider speaks the `GET {base_url}/{FROM}` shape, answering
//! `{ "base": "EUR", "rates": { "USD": 1.08, ... } }`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use expensa_core::config::CurrencyConfig;
use expensa_core::currency::{CurrencyCode, RateLookupError, RateProvider};

pub struct HttpRateProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpRateProvider {
    pub fn from_config(config: &CurrencyConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.rate_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Decimal, RateLookupError> {
        let url = format!("{}/{}", self.base_url, from.as_str());
        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| self.transport_error(error))?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(RateLookupError::NotFound { from: from.clone(), to: to.clone() })
            }
            status => {
                return Err(RateLookupError::Unavailable(format!("rate API answered {status}")))
            }
        }

        let body: Value = response.json().await.map_err(|error| self.transport_error(error))?;
        let rate = rate_from_body(&body, from, to)?;
        debug!(from = %from, to = %to, rate = %rate, "exchange rate fetched");
        Ok(rate)
    }
}

impl HttpRateProvider {
    fn transport_error(&self, error: reqwest::Error) -> RateLookupError {
        if error.is_timeout() {
            RateLookupError::Timeout(self.timeout)
        } else {
            RateLookupError::Unavailable(error.to_string())
        }
    }
}

fn rate_from_body(
    body: &Value,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Result<Decimal, RateLookupError> {
    let raw = body
        .get("rates")
        .and_then(|rates| rates.get(to.as_str()))
        .ok_or_else(|| RateLookupError::NotFound { from: from.clone(), to: to.clone() })?;

    let text = match raw {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        other => {
            return Err(RateLookupError::Unavailable(format!("unexpected rate value {other}")))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|error| {
            RateLookupError::Unavailable(format!("unparseable rate `{text}`: {error}"))
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use rust_decimal::Decimal;
    use serde_json::json;

    use expensa_core::config::AppConfig;
    use expensa_core::currency::{CurrencyCode, RateLookupError, RateProvider};

    use super::{rate_from_body, HttpRateProvider};

    fn code(raw: &str) -> CurrencyCode {
        CurrencyCode::parse(raw).expect("currency")
    }

    #[test]
    fn rates_are_read_from_number_or_string() {
        let body = json!({
            "base": "EUR",
            "rates": { "USD": 1.08, "INR": "90.125", "JPY": 1.6e2 }
        });
        let eur = code("EUR");

        assert_eq!(rate_from_body(&body, &eur, &code("USD")).expect("usd"), Decimal::new(108, 2));
        assert_eq!(
            rate_from_body(&body, &eur, &code("INR")).expect("inr"),
            Decimal::new(90_125, 3)
        );
        assert_eq!(rate_from_body(&body, &eur, &code("JPY")).expect("jpy"), Decimal::new(160, 0));
        assert!(matches!(
            rate_from_body(&body, &code("EUR"), &code("GBP")),
            Err(RateLookupError::NotFound { .. })
        ));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    fn provider(base_url: String, timeout_ms: u64) -> HttpRateProvider {
        let mut config = AppConfig::default().currency;
        config.rate_api_base_url = base_url;
        config.timeout_ms = timeout_ms;
        HttpRateProvider::from_config(&config).expect("client")
    }

    #[tokio::test]
    async fn fetches_rate_from_http_endpoint() {
        let base_url = serve(Router::new().route(
            "/latest/{base}",
            get(|Path(base): Path<String>| async move {
                if base == "EUR" {
                    (StatusCode::OK, Json(json!({ "base": "EUR", "rates": { "USD": 1.1 } })))
                } else {
                    (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown base" })))
                }
            }),
        ))
        .await;
        let provider = provider(format!("{base_url}/latest"), 2_000);

        let rate = provider.get_rate(&code("EUR"), &code("USD")).await.expect("rate");
        assert_eq!(rate, Decimal::new(11, 1));

        let missing = provider.get_rate(&code("XYZ"), &code("USD")).await;
        assert!(matches!(missing, Err(RateLookupError::NotFound { .. })));
    }

    #[tokio::test]
    async fn slow_endpoint_reports_timeout() {
        let base_url = serve(Router::new().route(
            "/latest/{base}",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({ "rates": { "USD": 1.1 } }))
            }),
        ))
        .await;
        let provider = provider(format!("{base_url}/latest"), 50);

        let result = provider.get_rate(&code("EUR"), &code("USD")).await;
        assert!(matches!(result, Err(RateLookupError::Timeout(_))), "{result:?}");
    }
}
