//! Central Bank of Russia daily rates (XML, quoted in roubles). Keyless.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use super::{RateProvider, ensure_not_empty, rebase, status_error, transport_error};
use crate::error::AdapterError;
use crate::exchange_rate::RateSnapshot;

pub const PROVIDER_ID: &str = "cbr";

const DEFAULT_URL: &str = "https://cbr.ru/scripts/XML_daily.asp";

const QUOTE_CURRENCY: &str = "RUB";

/// Root `<ValCurs>` element of the daily feed.
#[derive(Debug, Deserialize)]
struct DailyFeed {
    /// Business date as `dd.mm.yyyy`.
    #[serde(rename = "@Date")]
    date: String,
    #[serde(rename = "Valute", default)]
    rows: Vec<FeedRow>,
}

/// One `<Valute>` row. Rates use a comma decimal separator.
#[derive(Debug, Deserialize)]
struct FeedRow {
    #[serde(rename = "CharCode")]
    code: String,
    /// Roubles per one unit of the currency.
    #[serde(rename = "VunitRate")]
    unit_rate: String,
}

pub struct CbrProvider {
    client: Client,
    url: String,
}

impl CbrProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    async fn load_xml(&self) -> Result<String, AdapterError> {
        let resp = self
            .client
            .get(&self.url)
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

fn normalize_decimal_string(s: &str) -> String {
    s.trim().replace(',', ".")
}

/// Units of each currency per one rouble, plus RUB itself.
fn get_curs_map(feed: &DailyFeed) -> Result<HashMap<String, f64>, AdapterError> {
    let mut map = HashMap::new();

    for row in &feed.rows {
        let normalized_string = normalize_decimal_string(&row.unit_rate);
        let roubles_per_unit = Decimal::from_str(&normalized_string).map_err(|e| {
            AdapterError::bad_response(
                PROVIDER_ID,
                format!("invalid rate for {}: {}", row.code, e),
            )
        })?;
        let units_per_rouble = Decimal::ONE
            .checked_div(roubles_per_unit)
            .and_then(|v| v.to_f64())
            .ok_or_else(|| {
                AdapterError::bad_response(
                    PROVIDER_ID,
                    format!("unusable rate for {}: {}", row.code, row.unit_rate),
                )
            })?;
        map.insert(row.code.clone(), units_per_rouble);
    }

    if !map.is_empty() {
        map.insert(QUOTE_CURRENCY.to_string(), 1.0);
    }

    Ok(map)
}

fn parse_daily(xml: &str, base: &str) -> Result<RateSnapshot, AdapterError> {
    let feed: DailyFeed = quick_xml::de::from_str(xml)
        .map_err(|e| AdapterError::bad_response(PROVIDER_ID, e.to_string()))?;

    let date = NaiveDate::parse_from_str(&feed.date, "%d.%m.%Y").map_err(|e| {
        AdapterError::bad_response(PROVIDER_ID, format!("invalid date {}: {}", feed.date, e))
    })?;

    let curs_map = get_curs_map(&feed)?;
    ensure_not_empty(PROVIDER_ID, &curs_map)?;
    let rates = rebase(PROVIDER_ID, QUOTE_CURRENCY, base, &curs_map)?;

    Ok(RateSnapshot {
        base: base.to_string(),
        date,
        rates,
    })
}

#[async_trait]
impl RateProvider for CbrProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, base: &str) -> Result<RateSnapshot, AdapterError> {
        debug!("Fetching rates from CBR: base={}", base);
        let text = self.load_xml().await?;
        let snapshot = parse_daily(&text, base)?;
        info!(
            "Fetched CBR rates: date={}, num_rates={}",
            snapshot.date,
            snapshot.rates.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    const DAILY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ValCurs Date="04.02.2024" name="Foreign Currency Market">
    <Valute ID="R01235">
        <NumCode>840</NumCode>
        <CharCode>USD</CharCode>
        <Nominal>1</Nominal>
        <Name>Доллар США</Name>
        <Value>90,0000</Value>
        <VunitRate>90,0000</VunitRate>
    </Valute>
    <Valute ID="R01239">
        <NumCode>978</NumCode>
        <CharCode>EUR</CharCode>
        <Nominal>1</Nominal>
        <Name>Евро</Name>
        <Value>100,0000</Value>
        <VunitRate>100,0000</VunitRate>
    </Valute>
    <Valute ID="R01820">
        <NumCode>392</NumCode>
        <CharCode>JPY</CharCode>
        <Nominal>100</Nominal>
        <Name>Японских иен</Name>
        <Value>62,5000</Value>
        <VunitRate>0,625</VunitRate>
    </Valute>
</ValCurs>"#;

    #[test]
    fn test_normalize_decimal_string() {
        assert_eq!(normalize_decimal_string("90,1234"), "90.1234");
        assert_eq!(normalize_decimal_string(" 1,5 "), "1.5");
    }

    #[test]
    fn test_parse_daily_rebases_to_eur() {
        let snapshot = parse_daily(DAILY, "EUR").unwrap();

        assert_eq!(snapshot.date, NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
        assert_eq!(snapshot.rates["EUR"], 1.0);
        assert!((snapshot.rates["USD"] - 100.0 / 90.0).abs() < 1e-9);
        assert!((snapshot.rates["RUB"] - 100.0).abs() < 1e-9);
        assert!((snapshot.rates["JPY"] - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_daily_bad_rate() {
        let xml = r#"<ValCurs Date="04.02.2024"><Valute><CharCode>USD</CharCode><VunitRate>n/a</VunitRate></Valute></ValCurs>"#;
        let err = parse_daily(xml, "EUR").unwrap_err();
        assert_eq!(err.kind(), FailureKind::AdapterBadResponse);
    }

    #[test]
    fn test_parse_daily_zero_rate() {
        let xml = r#"<ValCurs Date="04.02.2024"><Valute><CharCode>USD</CharCode><VunitRate>0,0</VunitRate></Valute></ValCurs>"#;
        let err = parse_daily(xml, "EUR").unwrap_err();
        assert!(err.message().contains("unusable rate"));
    }

    #[test]
    fn test_parse_daily_without_eur_cannot_rebase() {
        let xml = r#"<ValCurs Date="04.02.2024"><Valute><CharCode>USD</CharCode><VunitRate>90,0</VunitRate></Valute></ValCurs>"#;
        let err = parse_daily(xml, "EUR").unwrap_err();
        assert!(err.message().contains("EUR rate missing"));
    }

    #[test]
    fn test_parse_daily_empty_feed() {
        let xml = r#"<ValCurs Date="04.02.2024"></ValCurs>"#;
        let err = parse_daily(xml, "EUR").unwrap_err();
        assert_eq!(err.message(), "no rates in response");
    }
}
