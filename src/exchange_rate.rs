use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

/// Currency every stored run is expressed against.
pub const STORAGE_BASE: &str = "EUR";

/// Normalized output of one rate adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    pub base: String,
    pub date: NaiveDate,
    pub rates: HashMap<String, f64>,
}

/// One persisted fetch of a provider. Never updated after insert.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RateRun {
    pub id: Uuid,
    pub provider: String,
    pub base: String,
    pub date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

/// `rates_entries` row as read back, without its surrogate `id`.
#[derive(Debug, Clone, FromRow)]
pub struct RateEntryRow {
    pub run_id: Uuid,
    pub currency: String,
    pub rate: Decimal,
}

/// A run together with its entries, keyed by currency code.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRunWithEntries {
    pub run: RateRun,
    pub rates: HashMap<String, f64>,
}
