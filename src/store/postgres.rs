use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::RunStore;
use crate::currency_symbols::{SymbolsRun, SymbolsSnapshot};
use crate::error::StoreError;
use crate::exchange_rate::{RateEntryRow, RateRun, RateRunWithEntries, RateSnapshot};

const LATEST_RATE_RUNS: &str = r#"
    SELECT DISTINCT ON (provider) id, provider, base, date, fetched_at
    FROM rates_runs
    ORDER BY provider, fetched_at DESC, seq DESC
"#;

const LATEST_RATE_FETCHES: &str = r#"
    SELECT provider, MAX(fetched_at) AS fetched_at
    FROM rates_runs
    GROUP BY provider
"#;

const LATEST_RATE_RUN: &str = r#"
    SELECT id, provider, base, date, fetched_at
    FROM rates_runs
    WHERE provider = $1
    ORDER BY fetched_at DESC, seq DESC
    LIMIT 1
"#;

const LATEST_SYMBOLS_RUN: &str = r#"
    SELECT id, provider, fetched_at, symbols
    FROM symbols_runs
    WHERE provider = $1
    ORDER BY fetched_at DESC, seq DESC
    LIMIT 1
"#;

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn entries_for(
        &self,
        run_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, HashMap<String, f64>>, StoreError> {
        let entries: Vec<RateEntryRow> = sqlx::query_as(
            "SELECT run_id, currency, rate FROM rates_entries WHERE run_id = ANY($1)",
        )
        .bind(run_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_run: HashMap<Uuid, HashMap<String, f64>> = HashMap::new();
        for entry in entries {
            let rate = entry.rate.to_f64().ok_or_else(|| StoreError::InvalidRate {
                currency: entry.currency.clone(),
                value: entry.rate.to_string(),
            })?;
            by_run
                .entry(entry.run_id)
                .or_default()
                .insert(entry.currency, rate);
        }
        Ok(by_run)
    }

    async fn with_entries(
        &self,
        runs: Vec<RateRun>,
    ) -> Result<Vec<RateRunWithEntries>, StoreError> {
        let ids: Vec<Uuid> = runs.iter().map(|r| r.id).collect();
        let mut entries = self.entries_for(&ids).await?;

        Ok(runs
            .into_iter()
            .map(|run| {
                let rates = entries.remove(&run.id).unwrap_or_default();
                RateRunWithEntries { run, rates }
            })
            .collect())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn insert_rate_run(
        &self,
        provider: &str,
        snapshot: &RateSnapshot,
    ) -> Result<RateRun, StoreError> {
        let run = RateRun {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            base: snapshot.base.clone(),
            date: snapshot.date,
            // timestamptz keeps microseconds
            fetched_at: Utc::now().trunc_subsecs(6),
        };

        let mut entries = Vec::with_capacity(snapshot.rates.len());
        for (currency, rate) in &snapshot.rates {
            let rate = Decimal::from_f64(*rate).ok_or_else(|| StoreError::InvalidRate {
                currency: currency.clone(),
                value: rate.to_string(),
            })?;
            entries.push((currency.as_str(), rate));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO rates_runs (id, provider, base, date, fetched_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run.id)
        .bind(&run.provider)
        .bind(&run.base)
        .bind(run.date)
        .bind(run.fetched_at)
        .execute(&mut *tx)
        .await?;

        if !entries.is_empty() {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO rates_entries (id, run_id, currency, rate) ");
            builder.push_values(entries.iter(), |mut row, (currency, rate)| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(run.id)
                    .push_bind(*currency)
                    .push_bind(*rate);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        info!(
            "Stored rates run: run_id={}, provider={}, date={}, num_rates={}",
            run.id,
            provider,
            run.date,
            entries.len()
        );
        Ok(run)
    }

    async fn latest_rate_fetches(&self) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(LATEST_RATE_FETCHES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn latest_rate_runs(&self) -> Result<Vec<RateRunWithEntries>, StoreError> {
        let runs: Vec<RateRun> = sqlx::query_as(LATEST_RATE_RUNS)
            .fetch_all(&self.pool)
            .await?;
        debug!("Latest rate runs: {} providers", runs.len());

        self.with_entries(runs).await
    }

    async fn latest_rate_run(
        &self,
        provider: &str,
    ) -> Result<Option<RateRunWithEntries>, StoreError> {
        let run: Option<RateRun> = sqlx::query_as(LATEST_RATE_RUN)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;

        match run {
            Some(run) => Ok(self.with_entries(vec![run]).await?.pop()),
            None => {
                debug!("No rates found for provider={}", provider);
                Ok(None)
            }
        }
    }

    async fn insert_symbols_run(
        &self,
        provider: &str,
        snapshot: &SymbolsSnapshot,
    ) -> Result<SymbolsRun, StoreError> {
        let run = SymbolsRun {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            fetched_at: Utc::now().trunc_subsecs(6),
            symbols: Json(snapshot.symbols.clone()),
        };

        sqlx::query(
            "INSERT INTO symbols_runs (id, provider, fetched_at, symbols) VALUES ($1, $2, $3, $4)",
        )
        .bind(run.id)
        .bind(&run.provider)
        .bind(run.fetched_at)
        .bind(&run.symbols)
        .execute(&self.pool)
        .await?;

        info!(
            "Stored symbols run: run_id={}, provider={}, num_symbols={}",
            run.id,
            provider,
            run.symbols.len()
        );
        Ok(run)
    }

    async fn latest_symbols_run(&self, provider: &str) -> Result<Option<SymbolsRun>, StoreError> {
        let run = sqlx::query_as(LATEST_SYMBOLS_RUN)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }
}
