use cosmwasm_std::Decimal;
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One price report from an authorized source. The store key carries
/// `(pair, source_idx, height)`; last write per source and block wins.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct PriceSample {
    pub price: Decimal,
    pub timestamp: u64,
}

/// Aggregation of the latest non-stale sample of every reporting source.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AggregatedPrice {
    pub denom: String,
    pub base_denom: String,
    pub twap: Decimal,
    pub median: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub deviation_bps: u32,
    pub n_sources: u32,
    pub timestamp: u64,
    pub healthy: bool,
}

/// Per-block aggregation cache, refreshed at BeginBlock for the pairs the
/// burn/mint engine prices against.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct CachedPrice {
    pub height: u64,
    pub price: Option<AggregatedPrice>,
}

/// Liveness bookkeeping driving the stale-warning / staled / recovered
/// event lifecycle of a source.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SourceLiveness {
    pub last_height: u64,
    pub warned: bool,
    pub stale: bool,
}

pub const SAMPLES: Map<(&str, u32, u64), PriceSample> = Map::new("price_samples");
pub const PRICE_CACHE: Map<&str, CachedPrice> = Map::new("price_cache");
pub const SOURCE_LIVENESS: Map<(&str, u32), SourceLiveness> = Map::new("source_liveness");

pub fn pair_key(denom: &str, base_denom: &str) -> String {
    format!("{denom}:{base_denom}")
}
