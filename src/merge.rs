//! Priority merge of per-provider rate maps.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::error::MergeError;
use crate::exchange_rate::STORAGE_BASE;

/// Merge provider rate maps into one EUR-anchored map.
///
/// Providers are visited in `priority` order and the first provider to supply
/// a currency wins it. Providers absent from `priority` are ignored. `EUR` is
/// always exactly 1.0 whatever the providers report. The result is ordered by
/// currency code.
pub fn merge<S: AsRef<str>>(
    priority: &[S],
    provider_rates: &HashMap<String, HashMap<String, f64>>,
) -> Result<BTreeMap<String, f64>, MergeError> {
    let mut merged = BTreeMap::new();
    let mut contributing = 0;

    for provider in priority {
        let provider = provider.as_ref();
        let Some(rates) = provider_rates.get(provider).filter(|r| !r.is_empty()) else {
            continue;
        };
        contributing += 1;

        let mut added = 0;
        for (code, rate) in rates {
            if !merged.contains_key(code) {
                merged.insert(code.clone(), *rate);
                added += 1;
            }
        }
        debug!("Added {} unique rates from provider={}", added, provider);
    }

    if contributing == 0 {
        return Err(MergeError::EmptyProviderSet);
    }

    merged.insert(STORAGE_BASE.to_string(), 1.0);
    Ok(merged)
}
