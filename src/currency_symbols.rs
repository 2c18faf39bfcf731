use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Normalized output of one symbol adapter call: currency code to display name.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolsSnapshot {
    pub symbols: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SymbolsRun {
    pub id: Uuid,
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub symbols: Json<BTreeMap<String, String>>,
}
