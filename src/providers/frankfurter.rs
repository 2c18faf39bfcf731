use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use super::{RateProvider, ensure_not_empty, rebase, status_error, transport_error};
use crate::error::AdapterError;
use crate::exchange_rate::RateSnapshot;

pub const PROVIDER_ID: &str = "frankfurter";

const DEFAULT_BASE_URL: &str = "https://api.frankfurter.dev/v1";

#[derive(Debug, Deserialize)]
struct FrankfurterLatest {
    base: String,
    date: NaiveDate,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

pub struct FrankfurterProvider {
    client: Client,
    base_url: String,
}

impl FrankfurterProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

fn parse_latest(body: &str, base: &str) -> Result<RateSnapshot, AdapterError> {
    let latest: FrankfurterLatest = serde_json::from_str(body)
        .map_err(|e| AdapterError::bad_response(PROVIDER_ID, e.to_string()))?;

    ensure_not_empty(PROVIDER_ID, &latest.rates)?;
    let rates = rebase(PROVIDER_ID, &latest.base, base, &latest.rates)?;

    Ok(RateSnapshot {
        base: base.to_string(),
        date: latest.date,
        rates,
    })
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, base: &str) -> Result<RateSnapshot, AdapterError> {
        debug!("Fetching rates from Frankfurter: base={}", base);
        let url = format!("{}/latest", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("base", base)])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER_ID, e))?;

        if !resp.status().is_success() {
            return Err(status_error(PROVIDER_ID, resp.status()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER_ID, e))?;
        let snapshot = parse_latest(&body, base)?;

        info!(
            "Fetched Frankfurter rates: date={}, num_rates={}",
            snapshot.date,
            snapshot.rates.len()
        );
        Ok(snapshot)
    }
}
