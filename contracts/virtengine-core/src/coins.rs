use cosmwasm_std::{Coin, Int256, SignedDecimal256, Uint128};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};

/// A single-denom decimal amount. Unlike the bank-facing `Coin` the amount is
/// a signed fixed-point decimal with 18 fractional digits, because escrow
/// balances must be able to go negative during settlement.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DecCoin {
    pub denom: String,
    pub amount: SignedDecimal256,
}

impl DecCoin {
    pub fn new(denom: impl Into<String>, amount: SignedDecimal256) -> Self {
        DecCoin {
            denom: denom.into(),
            amount,
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, SignedDecimal256::zero())
    }

    pub fn from_coin(coin: &Coin) -> ContractResult<Self> {
        Ok(Self::new(coin.denom.clone(), dec_from_uint(coin.amount)?))
    }

    pub fn is_positive(&self) -> bool {
        !self.amount.is_zero() && !self.amount.is_negative()
    }
}

impl std::fmt::Display for DecCoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// An ordered multi-denom decimal amount: entries are sorted by denom, unique,
/// and zero entries are dropped. Per-denom amounts are signed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct DecCoins(Vec<DecCoin>);

impl DecCoins {
    pub fn new() -> Self {
        DecCoins(Vec::new())
    }

    pub fn from_coins(coins: &[Coin]) -> ContractResult<Self> {
        let mut out = DecCoins::new();
        for coin in coins {
            out.add(&DecCoin::from_coin(coin)?)?;
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecCoin> {
        self.0.iter()
    }

    pub fn denoms(&self) -> Vec<String> {
        self.0.iter().map(|c| c.denom.clone()).collect()
    }

    /// Amount for `denom`, zero when absent.
    pub fn amount_of(&self, denom: &str) -> SignedDecimal256 {
        match self.0.binary_search_by(|c| c.denom.as_str().cmp(denom)) {
            Ok(idx) => self.0[idx].amount,
            Err(_) => SignedDecimal256::zero(),
        }
    }

    /// Add a single coin, keeping the set ordered and free of zero entries.
    pub fn add(&mut self, coin: &DecCoin) -> ContractResult<()> {
        if coin.amount.is_zero() {
            return Ok(());
        }
        match self
            .0
            .binary_search_by(|c| c.denom.as_str().cmp(&coin.denom))
        {
            Ok(idx) => {
                let sum = self.0[idx].amount.checked_add(coin.amount)?;
                if sum.is_zero() {
                    self.0.remove(idx);
                } else {
                    self.0[idx].amount = sum;
                }
            }
            Err(idx) => self.0.insert(idx, coin.clone()),
        }
        Ok(())
    }

    pub fn sub(&mut self, coin: &DecCoin) -> ContractResult<()> {
        let neg = DecCoin::new(
            coin.denom.clone(),
            SignedDecimal256::zero().checked_sub(coin.amount)?,
        );
        self.add(&neg)
    }

    pub fn checked_add(&self, other: &DecCoins) -> ContractResult<DecCoins> {
        let mut out = self.clone();
        for coin in other.iter() {
            out.add(coin)?;
        }
        Ok(out)
    }

    pub fn checked_sub(&self, other: &DecCoins) -> ContractResult<DecCoins> {
        let mut out = self.clone();
        for coin in other.iter() {
            out.sub(coin)?;
        }
        Ok(out)
    }

    pub fn neg(&self) -> ContractResult<DecCoins> {
        DecCoins::new().checked_sub(self)
    }

    /// Scale every entry by `factor`.
    pub fn checked_mul_dec(&self, factor: SignedDecimal256) -> ContractResult<DecCoins> {
        let mut out = DecCoins::new();
        for coin in self.iter() {
            out.add(&DecCoin::new(
                coin.denom.clone(),
                coin.amount.checked_mul(factor)?,
            ))?;
        }
        Ok(out)
    }

    /// Scale every entry by a block count. Overflow here is a consensus-fatal
    /// condition surfaced as an explicit error, never a wrapped value.
    pub fn checked_mul_blocks(&self, blocks: u64) -> ContractResult<DecCoins> {
        self.checked_mul_dec(dec_from_blocks(blocks)?)
    }

    /// True when, for every denom present in `other`, this set holds at least
    /// as much.
    pub fn is_all_gte(&self, other: &DecCoins) -> bool {
        other
            .iter()
            .all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    /// True when every denom present in `other` strictly exceeds this set.
    pub fn is_any_lt(&self, other: &DecCoins) -> bool {
        !self.is_all_gte(other)
    }

    pub fn has_negative(&self) -> bool {
        self.0.iter().any(|c| c.amount.is_negative())
    }

    /// Truncate to bank-legal integer coins. Fractional remainders stay
    /// behind; negative entries are rejected.
    pub fn floor_coins(&self) -> ContractResult<Vec<Coin>> {
        let mut out = Vec::new();
        for coin in self.iter() {
            let amount = floor_to_uint(coin.amount)?;
            if !amount.is_zero() {
                out.push(Coin {
                    denom: coin.denom.clone(),
                    amount,
                });
            }
        }
        Ok(out)
    }

    pub fn into_vec(self) -> Vec<DecCoin> {
        self.0
    }
}

impl From<Vec<DecCoin>> for DecCoins {
    fn from(mut coins: Vec<DecCoin>) -> Self {
        coins.sort_by(|a, b| a.denom.cmp(&b.denom));
        coins.retain(|c| !c.amount.is_zero());
        DecCoins(coins)
    }
}

impl std::fmt::Display for DecCoins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Convert a bank integer amount into the signed decimal domain.
pub fn dec_from_uint(amount: Uint128) -> ContractResult<SignedDecimal256> {
    SignedDecimal256::from_atomics(Int256::from(amount.u128()), 0)
        .map_err(|_| ContractError::DecimalRange)
}

pub fn dec_from_blocks(blocks: u64) -> ContractResult<SignedDecimal256> {
    SignedDecimal256::from_atomics(Int256::from(blocks), 0)
        .map_err(|_| ContractError::DecimalRange)
}

/// Floor a signed decimal into a bank `Uint128`. Negative input is an error;
/// callers only floor amounts owed outward.
pub fn floor_to_uint(amount: SignedDecimal256) -> ContractResult<Uint128> {
    let floored = amount.to_int_floor();
    if floored.is_negative() {
        return Err(ContractError::InsufficientFunds {
            available: amount.to_string(),
            required: "0".to_string(),
        });
    }
    Uint128::try_from(floored.unsigned_abs()).map_err(|_| ContractError::DecimalRange)
}

/// Add into an ordered `Vec<Coin>` (sorted by denom, no zero entries).
pub fn coin_vec_add(coins: &mut Vec<Coin>, add: &Coin) {
    if add.amount.is_zero() {
        return;
    }
    match coins.binary_search_by(|c| c.denom.as_str().cmp(&add.denom)) {
        Ok(idx) => coins[idx].amount += add.amount,
        Err(idx) => coins.insert(idx, add.clone()),
    }
}

/// Subtract from an ordered `Vec<Coin>`; underflow is an explicit error.
pub fn coin_vec_sub(coins: &mut Vec<Coin>, sub: &Coin) -> ContractResult<()> {
    if sub.amount.is_zero() {
        return Ok(());
    }
    match coins.binary_search_by(|c| c.denom.as_str().cmp(&sub.denom)) {
        Ok(idx) => {
            let held = coins[idx].amount;
            if held < sub.amount {
                return Err(ContractError::InsufficientFunds {
                    available: held.to_string(),
                    required: sub.amount.to_string(),
                });
            }
            coins[idx].amount = held - sub.amount;
            if coins[idx].amount.is_zero() {
                coins.remove(idx);
            }
            Ok(())
        }
        Err(_) => Err(ContractError::InsufficientFunds {
            available: "0".to_string(),
            required: sub.amount.to_string(),
        }),
    }
}

pub fn coin_vec_amount(coins: &[Coin], denom: &str) -> Uint128 {
    coins
        .iter()
        .find(|c| c.denom == denom)
        .map(|c| c.amount)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn dec(s: &str) -> SignedDecimal256 {
        s.parse().unwrap()
    }

    #[test]
    fn add_keeps_denoms_ordered_and_nonzero() {
        let mut coins = DecCoins::new();
        coins.add(&DecCoin::new("uakt", dec("5"))).unwrap();
        coins.add(&DecCoin::new("uact", dec("3"))).unwrap();
        coins.add(&DecCoin::new("uakt", dec("-5"))).unwrap();
        assert_eq!(coins.denoms(), vec!["uact".to_string()]);
        assert_eq!(coins.amount_of("uact"), dec("3"));
        assert_eq!(coins.amount_of("uakt"), SignedDecimal256::zero());
    }

    #[test]
    fn sub_goes_negative_without_clamping() {
        let mut coins = DecCoins::from_coins(&[Coin::new(10u128, "uact")]).unwrap();
        coins.sub(&DecCoin::new("uact", dec("25.5"))).unwrap();
        assert_eq!(coins.amount_of("uact"), dec("-15.5"));
        assert!(coins.has_negative());
    }

    #[test_case(10, "1.5", "15"; "whole blocks")]
    #[test_case(7, "0.1", "0.7"; "fractional rate")]
    #[test_case(0, "3.25", "0"; "zero span")]
    fn mul_blocks(blocks: u64, rate: &str, want: &str) {
        let coins = DecCoins::from(vec![DecCoin::new("uact", dec(rate))]);
        let got = coins.checked_mul_blocks(blocks).unwrap();
        assert_eq!(got.amount_of("uact"), dec(want));
    }

    #[test]
    fn all_gte_compares_per_denom() {
        let have = DecCoins::from(vec![
            DecCoin::new("uact", dec("10")),
            DecCoin::new("uakt", dec("2")),
        ]);
        let need = DecCoins::from(vec![
            DecCoin::new("uact", dec("10")),
            DecCoin::new("uakt", dec("2.000000000000000001")),
        ]);
        assert!(!have.is_all_gte(&need));
        assert!(have.is_all_gte(&DecCoins::from(vec![DecCoin::new("uact", dec("10"))])));
    }

    #[test]
    fn floor_truncates_and_skips_zero() {
        let coins = DecCoins::from(vec![
            DecCoin::new("uact", dec("12.999999")),
            DecCoin::new("uakt", dec("0.5")),
        ]);
        let floored = coins.floor_coins().unwrap();
        assert_eq!(floored, vec![Coin::new(12u128, "uact")]);
    }

    #[test]
    fn floor_rejects_negative() {
        let coins = DecCoins::from(vec![DecCoin::new("uact", dec("-1"))]);
        assert!(coins.floor_coins().is_err());
    }

    #[test]
    fn coin_vec_roundtrip() {
        let mut vec = Vec::new();
        coin_vec_add(&mut vec, &Coin::new(7u128, "uakt"));
        coin_vec_add(&mut vec, &Coin::new(3u128, "uact"));
        coin_vec_add(&mut vec, &Coin::new(1u128, "uakt"));
        assert_eq!(coin_vec_amount(&vec, "uakt"), Uint128::new(8));
        coin_vec_sub(&mut vec, &Coin::new(8u128, "uakt")).unwrap();
        assert_eq!(coin_vec_amount(&vec, "uakt"), Uint128::zero());
        assert!(coin_vec_sub(&mut vec, &Coin::new(4u128, "uact")).is_err());
    }
}
