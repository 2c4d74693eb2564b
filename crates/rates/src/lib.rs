//! HTTP implementation of the core `RateFetcher` trait.
//!
//! Talks to an exchangerate-style endpoint (`GET {base_url}/{BASE}`) that
//! answers `{"base": "...", "rates": {"EUR": 0.9, ...}}`. The request
//! carries a hard timeout; a timeout or transport failure surfaces to the
//! engine as an upstream submission failure, never a retry loop.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use claimflow_core::fx::{RateFetchError, RateFetcher, RateTable};

pub struct HttpRateFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateFetcher {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

fn table_from_payload(base: &str, payload: RatesPayload) -> Result<RateTable, RateFetchError> {
    let mut rates = HashMap::with_capacity(payload.rates.len());
    for (code, value) in payload.rates {
        let rate = Decimal::try_from(value).map_err(|e| RateFetchError::Malformed {
            base: base.to_string(),
            detail: format!("rate {code}={value} is not representable: {e}"),
        })?;
        rates.insert(code.to_ascii_uppercase(), rate);
    }
    Ok(RateTable { base: base.to_ascii_uppercase(), rates })
}

#[async_trait::async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch(&self, base: &str) -> Result<RateTable, RateFetchError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), base);
        debug!(base = %base, url = %url, "fetching rate table");

        let response = self.client.get(&url).send().await.map_err(|error| {
            if error.is_timeout() {
                RateFetchError::Timeout { base: base.to_string() }
            } else {
                RateFetchError::Transport { base: base.to_string(), detail: error.to_string() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateFetchError::Transport {
                base: base.to_string(),
                detail: format!("unexpected status {status}"),
            });
        }

        let payload: RatesPayload = response.json().await.map_err(|error| {
            RateFetchError::Malformed { base: base.to_string(), detail: error.to_string() }
        })?;

        table_from_payload(base, payload)
    }
}
