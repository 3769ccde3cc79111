use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::{FetchError, ProviderError};
use crate::exchange_rate::DailyRateSnapshot;

/// Decimal places kept after normalization.
const RATE_SCALE: u32 = 5;

/// Source of daily rate snapshots.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Currency every returned rate is expressed against.
    fn base_currency(&self) -> &str;

    /// Snapshots for the `days` calendar days ending today, oldest first.
    /// Days that could not be loaded are left out.
    async fn fetch_historical_rates(&self, days: u32)
    -> Result<Vec<DailyRateSnapshot>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct HistoricalRates {
    #[serde(default)]
    base: Option<String>,
    rates: HashMap<String, Option<f64>>,
}

/// Client for an Open Exchange Rates compatible `historical` endpoint.
pub struct RateProviderClient {
    config: ProviderConfig,
}

impl RateProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Like [`RateSource::fetch_historical_rates`] with an explicit last day.
    pub async fn fetch_window(
        &self,
        end: NaiveDate,
        days: u32,
    ) -> Result<Vec<DailyRateSnapshot>, ProviderError> {
        if days == 0 {
            return Ok(Vec::new());
        }

        let start = end
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or(ProviderError::DateWindow { days, end })?;
        let dates: Vec<NaiveDate> = start.iter_days().take(days as usize).collect();

        // One pool per batch, dropped once every day has resolved.
        let client = Client::new();
        let snapshots: Vec<DailyRateSnapshot> = stream::iter(dates)
            .map(|date| {
                let client = &client;
                async move {
                    match self.fetch_day(client, date).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            warn!("Skipping exchange rates for {}: {}", date, e);
                            DailyRateSnapshot::failed(date)
                        }
                    }
                }
            })
            .buffered(self.config.max_concurrent_requests)
            .collect()
            .await;

        Ok(snapshots.into_iter().filter(|s| !s.is_empty()).collect())
    }

    async fn fetch_day(
        &self,
        client: &Client,
        date: NaiveDate,
    ) -> Result<DailyRateSnapshot, FetchError> {
        let url = self.url_for(date);
        let resp = client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let text = resp.text().await?;
        let payload: HistoricalRates = serde_json::from_str(&text)?;

        let base_currency = &self.config.base_currency;
        let base_rate = payload
            .rates
            .get(base_currency)
            .copied()
            .flatten()
            .filter(|r| r.is_finite() && *r != 0.0)
            .ok_or_else(|| FetchError::MissingBaseRate {
                currency: base_currency.clone(),
            })?;

        debug!(
            "Loaded {} rates for {} quoted against {}",
            payload.rates.len(),
            date,
            payload.base.as_deref().unwrap_or("unknown")
        );

        Ok(DailyRateSnapshot {
            day: date,
            rates: convert_to_base(base_rate, &payload.rates),
        })
    }

    fn url_for(&self, date: NaiveDate) -> String {
        let mut url = format!(
            "{}/historical/{}.json?app_id={}",
            self.config.base_url,
            date.format("%Y-%m-%d"),
            self.config.api_key
        );
        if !self.config.symbols.is_empty() {
            url.push_str("&symbols=");
            url.push_str(&self.config.symbols.join(","));
        }
        url
    }
}

#[async_trait]
impl RateSource for RateProviderClient {
    fn base_currency(&self) -> &str {
        &self.config.base_currency
    }

    async fn fetch_historical_rates(
        &self,
        days: u32,
    ) -> Result<Vec<DailyRateSnapshot>, ProviderError> {
        self.fetch_window(Utc::now().date_naive(), days).await
    }
}

/// Re-expresses provider rates against the currency whose raw rate is `base_rate`.
///
/// Null and non-finite results are dropped.
pub fn convert_to_base(
    base_rate: f64,
    rates: &HashMap<String, Option<f64>>,
) -> BTreeMap<String, Decimal> {
    rates
        .iter()
        .filter_map(|(currency, raw)| {
            let value = Decimal::from_f64(raw.as_ref()? / base_rate)?;
            Some((currency.clone(), value.round_dp(RATE_SCALE)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use wiremock::matchers::{any, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn raw(pairs: &[(&str, Option<f64>)]) -> HashMap<String, Option<f64>> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn client_for(server: &MockServer) -> RateProviderClient {
        RateProviderClient::new(ProviderConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            symbols: vec!["USD".to_string(), "GBP".to_string(), "EUR".to_string()],
            base_currency: "EUR".to_string(),
            max_concurrent_requests: 4,
        })
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn payload(eur: f64) -> serde_json::Value {
        serde_json::json!({
            "base": "USD",
            "rates": { "USD": 1.0, "EUR": eur, "GBP": 0.8, "XAU": null }
        })
    }

    #[test]
    fn convert_to_base_rescales_and_rounds() {
        let rates = raw(&[("EUR", Some(1.2)), ("USD", Some(1.0)), ("JPY", Some(110.0))]);

        let result = convert_to_base(1.2, &rates);

        assert_eq!(result.len(), 3);
        assert_eq!(result["EUR"], Decimal::ONE);
        assert_eq!(result["USD"], dec("0.83333"));
        assert_eq!(result["JPY"], dec("91.66667"));
    }

    #[test]
    fn convert_to_base_drops_null_rates() {
        let rates = raw(&[("USD", Some(1.0)), ("NULL", None)]);

        let result = convert_to_base(1.0, &rates);

        assert!(!result.contains_key("NULL"));
        assert_eq!(result["USD"], Decimal::ONE);
    }

    #[test]
    fn convert_to_base_keeps_at_most_five_decimals() {
        let rates = raw(&[("A", Some(1.0)), ("B", Some(3.0)), ("C", Some(0.000001))]);

        for value in convert_to_base(7.0, &rates).values() {
            assert!(value.scale() <= RATE_SCALE);
        }
    }

    #[test]
    fn url_contains_day_key_and_symbols() {
        let client = RateProviderClient::new(ProviderConfig {
            base_url: "https://example.com/api".to_string(),
            api_key: "k".to_string(),
            symbols: vec!["USD".to_string(), "EUR".to_string()],
            base_currency: "EUR".to_string(),
            max_concurrent_requests: 1,
        });

        assert_eq!(
            client.url_for(day(15)),
            "https://example.com/api/historical/2024-06-15.json?app_id=k&symbols=USD,EUR"
        );
    }

    #[tokio::test]
    async fn zero_days_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_window(day(15), 0).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn window_is_ordered_and_normalized() {
        let server = MockServer::start().await;
        for d in [13, 14, 15] {
            Mock::given(method("GET"))
                .and(path(format!("/historical/2024-06-{}.json", d)))
                .and(query_param("app_id", "test-key"))
                .and(query_param("symbols", "USD,GBP,EUR"))
                .respond_with(ResponseTemplate::new(200).set_body_json(payload(0.8)))
                .expect(1)
                .mount(&server)
                .await;
        }

        let result = client_for(&server).fetch_window(day(15), 3).await.unwrap();

        let days: Vec<_> = result.iter().map(|s| s.day).collect();
        assert_eq!(days, vec![day(13), day(14), day(15)]);
        let rates = &result[0].rates;
        assert_eq!(rates["EUR"], Decimal::ONE);
        assert_eq!(rates["USD"], dec("1.25"));
        assert_eq!(rates["GBP"], Decimal::ONE);
        assert!(!rates.contains_key("XAU"));
    }

    #[tokio::test]
    async fn failed_day_is_omitted() {
        let server = MockServer::start().await;
        for d in [13, 15] {
            Mock::given(path(format!("/historical/2024-06-{}.json", d)))
                .respond_with(ResponseTemplate::new(200).set_body_json(payload(0.9)))
                .mount(&server)
                .await;
        }
        Mock::given(path("/historical/2024-06-14.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_window(day(15), 3).await.unwrap();

        let days: Vec<_> = result.iter().map(|s| s.day).collect();
        assert_eq!(days, vec![day(13), day(15)]);
    }

    #[tokio::test]
    async fn malformed_or_baseless_payloads_are_omitted() {
        let server = MockServer::start().await;
        Mock::given(path("/historical/2024-06-13.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        Mock::given(path("/historical/2024-06-14.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "rates": { "USD": 1.0 } })),
            )
            .mount(&server)
            .await;
        Mock::given(path("/historical/2024-06-15.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload(0.0)))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_window(day(15), 3).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_every_day() {
        let client = RateProviderClient::new(ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "k".to_string(),
            symbols: Vec::new(),
            base_currency: "EUR".to_string(),
            max_concurrent_requests: 2,
        });

        let result = client.fetch_window(day(15), 2).await.unwrap();

        assert!(result.is_empty());
    }
}
