use cosmwasm_std::{Addr, Api, Coin, Deps};
use cw_storage_plus::Item;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};
use crate::utils::{validate_bps, validate_denom};

/// Marketplace lifecycle parameters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct MarketParams {
    /// Minimum deployment escrow deposit, one acceptable denom per entry.
    pub min_deposit: Vec<Coin>,
    /// Minimum bid escrow deposit.
    pub bid_min_deposit: Vec<Coin>,
    /// Maximum simultaneously open bids per order.
    pub order_max_bids: u32,
    /// Match automatically once an order holds `order_max_bids` open bids.
    pub auto_match_bids: bool,
    /// Blocks an insufficient-funds lease survives before forced closure.
    pub lease_grace_blocks: u64,
    /// Require deployment owners to hold a valid certificate.
    pub require_certificate: bool,
}

impl MarketParams {
    pub fn validate(&self) -> ContractResult<()> {
        if self.min_deposit.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "market min_deposit".to_string(),
            });
        }
        for coin in self.min_deposit.iter().chain(self.bid_min_deposit.iter()) {
            validate_denom(&coin.denom)?;
        }
        if self.order_max_bids == 0 {
            return Err(ContractError::InvalidConfig {
                input: "order_max_bids".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Oracle aggregation parameters. `sources` is positional: the index of an
/// address in this list is its source_idx in sample keys.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OracleParams {
    pub sources: Vec<Addr>,
    pub twap_window: u64,
    pub max_price_staleness_blocks: u64,
    /// Emit a stale warning once a source is this close to going stale.
    pub stale_warning_blocks: u64,
    pub min_price_sources: u32,
    pub max_price_deviation_bps: u32,
}

impl OracleParams {
    pub fn validate(&self) -> ContractResult<()> {
        if self.sources.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "oracle sources".to_string(),
            });
        }
        if self.twap_window == 0 || self.max_price_staleness_blocks == 0 {
            return Err(ContractError::InvalidConfig {
                input: "oracle windows".to_string(),
                reason: "twap_window and max_price_staleness_blocks must be > 0".to_string(),
            });
        }
        if self.min_price_sources == 0 || self.min_price_sources as usize > self.sources.len() {
            return Err(ContractError::InvalidConfig {
                input: "min_price_sources".to_string(),
                reason: format!(
                    "must be between 1 and the number of sources ({})",
                    self.sources.len()
                ),
            });
        }
        Ok(())
    }

    pub fn source_idx(&self, address: &Addr) -> Option<u32> {
        self.sources
            .iter()
            .position(|s| s == address)
            .map(|idx| idx as u32)
    }
}

/// Burn/mint engine parameters. Thresholds are collateral ratios expressed
/// in basis points (9500 = 0.95).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BmeParams {
    /// Volatile collateral denom (AKT).
    pub collateral_denom: String,
    /// Subdenom of the stable credit token; the full factory denom is
    /// resolved when the contract creates it.
    pub stable_subdenom: String,
    /// Oracle quote denom the collateral is priced in.
    pub base_denom: String,
    pub warn_threshold_bps: u32,
    pub halt_threshold_bps: u32,
    pub mint_spread_bps: u32,
    pub settle_spread_bps: u32,
    /// Baseline number of blocks between permitted mint epochs.
    pub min_epoch_blocks: u64,
    /// Runway growth per bps of collateral-ratio drop below `warn`.
    pub epoch_blocks_backoff_bps: u32,
}

impl BmeParams {
    pub fn validate(&self) -> ContractResult<()> {
        validate_denom(&self.collateral_denom)?;
        validate_denom(&self.base_denom)?;
        if self.stable_subdenom.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "stable_subdenom".to_string(),
            });
        }
        validate_bps(self.mint_spread_bps, "mint_spread_bps")?;
        validate_bps(self.settle_spread_bps, "settle_spread_bps")?;
        if self.halt_threshold_bps >= self.warn_threshold_bps {
            return Err(ContractError::InvalidConfig {
                input: "circuit breaker thresholds".to_string(),
                reason: format!(
                    "halt ({}) must be below warn ({})",
                    self.halt_threshold_bps, self.warn_threshold_bps
                ),
            });
        }
        if self.min_epoch_blocks == 0 {
            return Err(ContractError::InvalidConfig {
                input: "min_epoch_blocks".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DenomTakeRate {
    pub denom: String,
    pub rate_bps: u32,
}

/// Platform take applied to outbound provider payments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct TakeParams {
    pub platform_address: Addr,
    pub default_rate_bps: u32,
    pub denom_rates: Vec<DenomTakeRate>,
}

impl TakeParams {
    pub fn validate(&self) -> ContractResult<()> {
        validate_bps(self.default_rate_bps, "default_rate_bps")?;
        for entry in &self.denom_rates {
            validate_denom(&entry.denom)?;
            validate_bps(entry.rate_bps, "denom take rate")?;
        }
        Ok(())
    }

    pub fn rate_for(&self, denom: &str) -> u32 {
        self.denom_rates
            .iter()
            .find(|r| r.denom == denom)
            .map(|r| r.rate_bps)
            .unwrap_or(self.default_rate_bps)
    }
}

/// Message filtering for wasm-originated traffic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct WasmGateParams {
    pub blocked_addresses: Vec<Addr>,
}

impl WasmGateParams {
    pub fn is_blocked(&self, address: &Addr) -> bool {
        self.blocked_addresses.contains(address)
    }
}

pub const AUTHORITY: Item<Addr> = Item::new("authority");
pub const MARKET_PARAMS: Item<MarketParams> = Item::new("market_params");
pub const ORACLE_PARAMS: Item<OracleParams> = Item::new("oracle_params");
pub const BME_PARAMS: Item<BmeParams> = Item::new("bme_params");
pub const TAKE_PARAMS: Item<TakeParams> = Item::new("take_params");
pub const WASM_GATE_PARAMS: Item<WasmGateParams> = Item::new("wasm_gate_params");

/// Governance gate shared by every UpdateParams handler.
pub fn assert_authority(deps: Deps, sender: &Addr) -> ContractResult<()> {
    let authority = AUTHORITY.load(deps.storage)?;
    if sender != authority {
        return Err(ContractError::NotAuthority);
    }
    Ok(())
}

pub fn validate_address_list(api: &dyn Api, input: &[String]) -> ContractResult<Vec<Addr>> {
    input
        .iter()
        .map(|addr| api.addr_validate(addr).map_err(ContractError::Std))
        .collect()
}
