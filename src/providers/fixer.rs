//! Fixer.io provider.
//!
//! Keyed API. The free tier only quotes against EUR, so the requested base is
//! reached by rebasing locally. Fixer reports most failures with HTTP 200 and
//! `success: false`, so the body's error code decides the failure kind.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use super::{RateProvider, SymbolProvider, ensure_not_empty, rebase, status_error, transport_error};
use crate::currency_symbols::SymbolsSnapshot;
use crate::error::AdapterError;
use crate::exchange_rate::RateSnapshot;

pub const PROVIDER_ID: &str = "fixer";

const DEFAULT_BASE_URL: &str = "http://data.fixer.io/api";

#[derive(Debug, Deserialize)]
struct FixerLatest {
    success: bool,
    base: Option<String>,
    date: Option<NaiveDate>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    error: Option<FixerError>,
}

#[derive(Debug, Deserialize)]
struct FixerSymbols {
    success: bool,
    #[serde(default)]
    symbols: BTreeMap<String, String>,
    error: Option<FixerError>,
}

#[derive(Debug, Deserialize)]
struct FixerError {
    code: u16,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl FixerError {
    fn into_adapter_error(self) -> AdapterError {
        let message = match &self.kind {
            Some(kind) => format!("error {}: {}", self.code, kind),
            None => format!("error {}", self.code),
        };
        match self.code {
            // invalid/missing key, inactive account, plan restriction
            101 | 102 | 105 => AdapterError::auth_rejected(PROVIDER_ID, message),
            104 | 429 => AdapterError::rate_limited(PROVIDER_ID, message),
            _ => AdapterError::bad_response(PROVIDER_ID, message),
        }
    }
}

fn unsuccessful(error: Option<FixerError>) -> AdapterError {
    match error {
        Some(error) => error.into_adapter_error(),
        None => AdapterError::bad_response(PROVIDER_ID, "unsuccessful response without error"),
    }
}

pub struct FixerProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FixerProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    async fn get(&self, endpoint: &str) -> Result<String, AdapterError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .client
            .get(&url)
            .query(&[("access_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER_ID, e))?;

        if !resp.status().is_success() {
            return Err(status_error(PROVIDER_ID, resp.status()));
        }

        resp.text()
            .await
            .map_err(|e| transport_error(PROVIDER_ID, e))
    }
}

fn parse_latest(body: &str, base: &str) -> Result<RateSnapshot, AdapterError> {
    let latest: FixerLatest = serde_json::from_str(body)
        .map_err(|e| AdapterError::bad_response(PROVIDER_ID, e.to_string()))?;

    if !latest.success {
        return Err(unsuccessful(latest.error));
    }

    let date = latest
        .date
        .ok_or_else(|| AdapterError::bad_response(PROVIDER_ID, "missing date"))?;
    ensure_not_empty(PROVIDER_ID, &latest.rates)?;

    let source_base = latest.base.as_deref().unwrap_or("EUR");
    let rates = rebase(PROVIDER_ID, source_base, base, &latest.rates)?;

    Ok(RateSnapshot {
        base: base.to_string(),
        date,
        rates,
    })
}

fn parse_symbols(body: &str) -> Result<SymbolsSnapshot, AdapterError> {
    let symbols: FixerSymbols = serde_json::from_str(body)
        .map_err(|e| AdapterError::bad_response(PROVIDER_ID, e.to_string()))?;

    if !symbols.success {
        return Err(unsuccessful(symbols.error));
    }
    if symbols.symbols.is_empty() {
        return Err(AdapterError::bad_response(PROVIDER_ID, "no symbols in response"));
    }

    Ok(SymbolsSnapshot {
        symbols: symbols.symbols,
    })
}

#[async_trait]
impl RateProvider for FixerProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, base: &str) -> Result<RateSnapshot, AdapterError> {
        debug!("Fetching rates from Fixer: base={}", base);
        let body = self.get("latest").await?;
        let snapshot = parse_latest(&body, base)?;
        info!(
            "Fetched Fixer rates: date={}, num_rates={}",
            snapshot.date,
            snapshot.rates.len()
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl SymbolProvider for FixerProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch_symbols(&self) -> Result<SymbolsSnapshot, AdapterError> {
        debug!("Fetching currency symbols from Fixer");
        let body = self.get("symbols").await?;
        let snapshot = parse_symbols(&body)?;
        info!("Fetched Fixer symbols: num_symbols={}", snapshot.symbols.len());
        Ok(snapshot)
    }
}
