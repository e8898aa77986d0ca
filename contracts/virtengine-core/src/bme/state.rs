use cosmwasm_std::{Addr, Coin};
use cw_storage_plus::{Item, Map};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BmeStatus {
    Healthy,
    Warning,
    HaltCr,
    HaltOracle,
}

impl BmeStatus {
    /// Stable-credit mints are blocked outside healthy/warning.
    pub fn blocks_mint(&self) -> bool {
        matches!(self, BmeStatus::HaltCr | BmeStatus::HaltOracle)
    }

    /// Refund burns stay allowed under a collateral-ratio halt.
    pub fn blocks_burn(&self) -> bool {
        matches!(self, BmeStatus::HaltOracle)
    }
}

impl std::fmt::Display for BmeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BmeStatus::Healthy => f.write_str("healthy"),
            BmeStatus::Warning => f.write_str("warning"),
            BmeStatus::HaltCr => f.write_str("halt_cr"),
            BmeStatus::HaltOracle => f.write_str("halt_oracle"),
        }
    }
}

/// Vault balances and cumulative flow totals, all ordered coin vectors.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct BmeState {
    pub vault: Vec<Coin>,
    pub burned: Vec<Coin>,
    pub minted: Vec<Coin>,
    pub remint_credits: Vec<Coin>,
}

/// Last published circuit-breaker evaluation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct StatusRecord {
    pub status: BmeStatus,
    pub previous_status: BmeStatus,
    pub cr_bps: u32,
    pub updated_at: u64,
    /// Runway applied at the last transition into warning.
    pub epoch_height_diff: u64,
}

impl Default for StatusRecord {
    fn default() -> Self {
        StatusRecord {
            status: BmeStatus::Healthy,
            previous_status: BmeStatus::Healthy,
            cr_bps: u32::MAX,
            updated_at: 0,
            epoch_height_diff: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Pending,
    Executed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// A user-requested burn/mint swap; direction follows the denoms.
    Swap,
    /// Conversion of a non-direct escrow deposit into stable credits.
    DepositConvert { account: AccountId },
}

/// One burn/mint operation, pending until the scheduler executes it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LedgerRecord {
    pub denom: String,
    pub to_denom: String,
    pub source: Addr,
    pub height: u64,
    pub seq: u64,
    pub owner: Addr,
    pub to: Addr,
    pub coins_to_burn: Coin,
    pub kind: LedgerKind,
    pub state: LedgerState,
    pub executed_at: Option<u64>,
    pub minted: Option<Coin>,
}

const HEIGHT_WIDTH: usize = 20;

impl LedgerRecord {
    /// Composite key; scheduler execution iterates these in ascending byte
    /// order.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}/{:0w$}/{:0w$}",
            self.denom,
            self.to_denom,
            self.source,
            self.height,
            self.seq,
            w = HEIGHT_WIDTH
        )
    }
}

pub const BME_STATE: Item<BmeState> = Item::new("bme_state");
pub const BME_STATUS: Item<StatusRecord> = Item::new("bme_status");
/// Resolved factory denom of the stable credit token.
pub const ACT_DENOM: Item<String> = Item::new("act_denom");
/// Next height a mint toward the keyed denom may execute.
pub const MINT_EPOCHS: Map<&str, u64> = Map::new("mint_epochs");
pub const PENDING_LEDGER: Map<&str, LedgerRecord> = Map::new("ledger_pending");
pub const LEDGER: Map<&str, LedgerRecord> = Map::new("ledger");
pub const LEDGER_SEQ: Item<u64> = Item::new("ledger_seq");

pub const CREATE_STABLE_DENOM_REPLY_ID: u64 = 1;
