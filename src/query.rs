use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::QueryError;
use crate::etag::Conditional;
use crate::exchange_rate::{RateRunWithEntries, STORAGE_BASE};
use crate::merge::merge;
use crate::store::RunStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestRates {
    pub base: String,
    /// Latest business date among the contributing runs.
    pub date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSymbols {
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub symbols: BTreeMap<String, String>,
}

pub struct QueryService {
    store: Arc<dyn RunStore>,
    priority: Vec<String>,
    default_symbols_provider: String,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn RunStore>,
        priority: Vec<String>,
        default_symbols_provider: impl Into<String>,
    ) -> Self {
        Self {
            store,
            priority,
            default_symbols_provider: default_symbols_provider.into(),
        }
    }

    /// Latest rates, merged by priority unless a single provider is named.
    ///
    /// A named provider is served even when it is not part of the priority
    /// order.
    pub async fn get_latest_rates(
        &self,
        provider: Option<&str>,
        client_token: Option<&str>,
    ) -> Result<Conditional<LatestRates>, QueryError> {
        let view = match provider {
            Some(provider) => {
                let run = self
                    .store
                    .latest_rate_run(provider)
                    .await?
                    .ok_or(QueryError::NoDataAvailable)?;
                build_view(&[provider], vec![run])?
            }
            None => {
                let runs: Vec<RateRunWithEntries> = self
                    .store
                    .latest_rate_runs()
                    .await?
                    .into_iter()
                    .filter(|r| self.priority.contains(&r.run.provider))
                    .collect();
                build_view(&self.priority, runs)?
            }
        };

        info!(
            "Serving rates: provider={}, date={}, num_rates={}",
            provider.unwrap_or("merged"),
            view.date,
            view.rates.len()
        );
        let result = Conditional::evaluate(view, client_token)?;
        debug!("Rates fingerprint: {}", result.etag());
        Ok(result)
    }

    pub async fn get_latest_symbols(
        &self,
        provider: Option<&str>,
        client_token: Option<&str>,
    ) -> Result<Conditional<LatestSymbols>, QueryError> {
        let provider = provider.unwrap_or(&self.default_symbols_provider);
        let run = self
            .store
            .latest_symbols_run(provider)
            .await?
            .ok_or_else(|| {
                warn!("No symbols available for provider={}", provider);
                QueryError::NoDataAvailable
            })?;

        debug!(
            "Serving symbols: provider={}, num_symbols={}",
            provider,
            run.symbols.len()
        );
        let view = LatestSymbols {
            provider: run.provider,
            fetched_at: run.fetched_at,
            symbols: run.symbols.0,
        };
        Ok(Conditional::evaluate(view, client_token)?)
    }
}

fn build_view<S: AsRef<str>>(
    priority: &[S],
    runs: Vec<RateRunWithEntries>,
) -> Result<LatestRates, QueryError> {
    let runs: Vec<RateRunWithEntries> = runs.into_iter().filter(|r| !r.rates.is_empty()).collect();

    let date = runs.iter().map(|r| r.run.date).max();
    let fetched_at = runs.iter().map(|r| r.run.fetched_at).max();
    let (Some(date), Some(fetched_at)) = (date, fetched_at) else {
        return Err(QueryError::NoDataAvailable);
    };

    let by_provider: HashMap<String, HashMap<String, f64>> = runs
        .into_iter()
        .map(|r| (r.run.provider, r.rates))
        .collect();

    Ok(LatestRates {
        base: STORAGE_BASE.to_string(),
        date,
        fetched_at,
        rates: merge(priority, &by_provider)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency_symbols::SymbolsSnapshot;
    use crate::exchange_rate::RateSnapshot;
    use crate::store::memory::MemoryRunStore;
    use chrono::{Duration, TimeZone};

    fn snapshot(day: u32, rates: &[(&str, f64)]) -> RateSnapshot {
        RateSnapshot {
            base: "EUR".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            rates: rates.iter().map(|(c, r)| (c.to_string(), *r)).collect(),
        }
    }

    fn service(store: Arc<MemoryRunStore>) -> QueryService {
        QueryService::new(
            store,
            vec!["fixer".to_string(), "frankfurter".to_string()],
            "fixer",
        )
    }

    fn payload<T>(result: Conditional<T>) -> T {
        match result {
            Conditional::Modified { payload, .. } => payload,
            Conditional::NotModified { .. } => panic!("expected a payload"),
        }
    }

    #[tokio::test]
    async fn test_no_runs_is_no_data() {
        let query = service(Arc::new(MemoryRunStore::new()));

        let err = query.get_latest_rates(None, None).await.unwrap_err();
        assert!(matches!(err, QueryError::NoDataAvailable));

        let err = query.get_latest_rates(Some("fixer"), None).await.unwrap_err();
        assert!(matches!(err, QueryError::NoDataAvailable));
    }

    #[tokio::test]
    async fn test_higher_priority_wins_with_newer_run() {
        let store = Arc::new(MemoryRunStore::new());
        let t0 = Utc.with_ymd_and_hms(2024, 2, 4, 12, 0, 0).unwrap();

        store.set_now(t0);
        store
            .insert_rate_run("frankfurter", &snapshot(2, &[("USD", 1.09), ("JPY", 161.0)]))
            .await
            .unwrap();
        store.set_now(t0 + Duration::hours(1));
        store
            .insert_rate_run("fixer", &snapshot(4, &[("USD", 1.08), ("EUR", 0.99)]))
            .await
            .unwrap();

        let view = payload(service(store).get_latest_rates(None, None).await.unwrap());

        assert_eq!(view.base, "EUR");
        assert_eq!(view.rates["USD"], 1.08);
        assert_eq!(view.rates["JPY"], 161.0);
        assert_eq!(view.rates["EUR"], 1.0);
        assert_eq!(view.date, NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
        assert_eq!(view.fetched_at, t0 + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_only_latest_run_per_provider_is_used() {
        let store = Arc::new(MemoryRunStore::new());
        let t0 = Utc.with_ymd_and_hms(2024, 2, 4, 12, 0, 0).unwrap();

        store.set_now(t0);
        store
            .insert_rate_run("fixer", &snapshot(3, &[("USD", 1.07), ("GBP", 0.85)]))
            .await
            .unwrap();
        store.set_now(t0 + Duration::days(1));
        store
            .insert_rate_run("fixer", &snapshot(4, &[("USD", 1.08)]))
            .await
            .unwrap();

        let view = payload(service(store).get_latest_rates(None, None).await.unwrap());
        assert_eq!(view.rates["USD"], 1.08);
        assert!(!view.rates.contains_key("GBP"));
    }

    #[tokio::test]
    async fn test_providers_outside_priority_excluded_from_default() {
        let store = Arc::new(MemoryRunStore::new());
        store
            .insert_rate_run("cbr", &snapshot(4, &[("RUB", 100.0)]))
            .await
            .unwrap();
        let query = service(store);

        let err = query.get_latest_rates(None, None).await.unwrap_err();
        assert!(matches!(err, QueryError::NoDataAvailable));

        let view = payload(query.get_latest_rates(Some("cbr"), None).await.unwrap());
        assert_eq!(view.rates["RUB"], 100.0);
        assert_eq!(view.rates["EUR"], 1.0);
    }

    #[tokio::test]
    async fn test_named_provider_ignores_priority_merge() {
        let store = Arc::new(MemoryRunStore::new());
        store
            .insert_rate_run("fixer", &snapshot(4, &[("USD", 1.08)]))
            .await
            .unwrap();
        store
            .insert_rate_run("frankfurter", &snapshot(4, &[("USD", 1.09), ("JPY", 161.0)]))
            .await
            .unwrap();

        let view = payload(
            service(store)
                .get_latest_rates(Some("frankfurter"), None)
                .await
                .unwrap(),
        );
        assert_eq!(view.rates["USD"], 1.09);
    }

    #[tokio::test]
    async fn test_matching_token_is_not_modified() {
        let store = Arc::new(MemoryRunStore::new());
        store
            .insert_rate_run("fixer", &snapshot(4, &[("USD", 1.08)]))
            .await
            .unwrap();
        let query = service(store.clone());

        let first = query.get_latest_rates(None, None).await.unwrap();
        let etag = first.etag().to_string();

        let second = query.get_latest_rates(None, Some(&etag)).await.unwrap();
        assert_eq!(second, Conditional::NotModified { etag: etag.clone() });

        store.set_now(Utc::now() + Duration::seconds(5));
        store
            .insert_rate_run("fixer", &snapshot(5, &[("USD", 1.10)]))
            .await
            .unwrap();
        let third = query.get_latest_rates(None, Some(&etag)).await.unwrap();
        assert!(matches!(third, Conditional::Modified { .. }));
        assert_ne!(third.etag(), etag);
    }

    #[tokio::test]
    async fn test_latest_symbols() {
        let store = Arc::new(MemoryRunStore::new());
        let query = service(store.clone());

        let err = query.get_latest_symbols(None, None).await.unwrap_err();
        assert!(matches!(err, QueryError::NoDataAvailable));

        let symbols = SymbolsSnapshot {
            symbols: BTreeMap::from([("USD".to_string(), "United States Dollar".to_string())]),
        };
        store.insert_symbols_run("fixer", &symbols).await.unwrap();

        let view = payload(query.get_latest_symbols(None, None).await.unwrap());
        assert_eq!(view.provider, "fixer");
        assert_eq!(view.symbols, symbols.symbols);

        let err = query
            .get_latest_symbols(Some("frankfurter"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NoDataAvailable));
    }
}
