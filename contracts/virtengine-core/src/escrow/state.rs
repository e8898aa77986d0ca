use cosmwasm_std::{Addr, Coin, Order, Storage};
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::coins::DecCoins;
use crate::error::{ContractError, ContractResult};
use crate::ids::AccountId;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Open,
    Overdrawn,
    Closed,
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountState::Open => f.write_str("open"),
            AccountState::Overdrawn => f.write_str("overdrawn"),
            AccountState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Open,
    Overdrawn,
    Closed,
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentState::Open => f.write_str("open"),
            PaymentState::Overdrawn => f.write_str("overdrawn"),
            PaymentState::Closed => f.write_str("closed"),
        }
    }
}

/// Origin of deposited funds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepositSource {
    Invalid,
    Balance,
    Grant,
}

/// One funding entry of an escrow account. Spend order is insertion order;
/// refunds run newest-first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Depositor {
    pub owner: Addr,
    pub height: u64,
    pub source: DepositSource,
    pub balance: DecCoins,
    pub direct: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EscrowAccount {
    pub id: AccountId,
    pub owner: Addr,
    pub state: AccountState,
    /// Aggregate spendable funds; equals the sum of depositor balances and
    /// is the signed quantity settlement drains.
    pub balance: DecCoins,
    /// Lifetime funds moved from depositors into payments.
    pub transferred: DecCoins,
    pub settled_at: u64,
    pub depositors: Vec<Depositor>,
}

impl EscrowAccount {
    /// Sanity mirror of the balance/depositor relation; settlement keeps
    /// these equal outside of the drain computation itself.
    pub fn depositor_total(&self) -> ContractResult<DecCoins> {
        let mut total = DecCoins::new();
        for depositor in &self.depositors {
            total = total.checked_add(&depositor.balance)?;
        }
        Ok(total)
    }
}

/// A rate-metered draw from an escrow account toward a provider.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Payment {
    pub account: AccountId,
    pub xid: String,
    pub owner: Addr,
    pub state: PaymentState,
    /// Per-block draw rate.
    pub rate: DecCoins,
    /// Accrued, not yet withdrawn, owed to the provider.
    pub balance: DecCoins,
    /// Owed but not drawable because the account ran dry.
    pub unsettled: DecCoins,
    /// Already moved to the bank.
    pub withdrawn: Vec<Coin>,
    pub created_at: u64,
}

pub const ACCOUNTS: Map<&str, EscrowAccount> = Map::new("escrow_accounts");
pub const PAYMENTS: Map<(&str, &str), Payment> = Map::new("escrow_payments");

pub fn load_account(storage: &dyn Storage, id: &AccountId) -> ContractResult<EscrowAccount> {
    ACCOUNTS
        .may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("escrow account", id.to_string()))
}

/// All payments of an account in ascending xid order.
pub fn load_payments(storage: &dyn Storage, id: &AccountId) -> ContractResult<Vec<Payment>> {
    PAYMENTS
        .prefix(id.key().as_str())
        .range(storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, payment)| payment).map_err(ContractError::Std))
        .collect()
}

pub fn save_payments(
    storage: &mut dyn Storage,
    id: &AccountId,
    payments: &[Payment],
) -> ContractResult<()> {
    let key = id.key();
    for payment in payments {
        PAYMENTS.save(storage, (key.as_str(), payment.xid.as_str()), payment)?;
    }
    Ok(())
}
