use cosmwasm_std::{SignedDecimal256, Uint128};

use crate::coins::{DecCoin, DecCoins};
use crate::error::{ContractError, ContractResult};
use crate::escrow::state::{AccountState, EscrowAccount, Payment, PaymentState};

/// Result of one settlement run over an account and its payments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SettleOutcome {
    /// The account entered `overdrawn` during this run.
    pub overdrawn: bool,
    /// The account left `overdrawn` during this run.
    pub reopened: bool,
}

/// Settle an account and its payments up to `height`.
///
/// This is a pure mutation of the passed values; the store-writing wrappers
/// persist the deltas. The algorithm: draw every active payment at full rate
/// for as many whole blocks as the account covers, accrue the uncovered
/// remainder into `unsettled`, then absorb outstanding `unsettled` from any
/// remaining funds (deposit catch-up), oldest payment first.
pub fn settle(
    account: &mut EscrowAccount,
    payments: &mut [Payment],
    height: u64,
) -> ContractResult<SettleOutcome> {
    if account.state == AccountState::Closed {
        return Err(ContractError::invalid_state(
            "escrow account",
            account.id.to_string(),
            account.state,
        ));
    }

    let was_overdrawn = account.state == AccountState::Overdrawn;
    let delta = height.saturating_sub(account.settled_at);

    let mut rate_total = DecCoins::new();
    for payment in payments.iter().filter(|p| p.state != PaymentState::Closed) {
        rate_total = rate_total.checked_add(&payment.rate)?;
    }

    if delta > 0 && !rate_total.is_empty() {
        let need = rate_total.checked_mul_blocks(delta)?;
        if account.balance.is_all_gte(&need) {
            transfer_full_rate(account, payments, delta)?;
        } else {
            // the account cannot cover the whole span: find the drain point,
            // draw fully up to it, accrue the rest as unsettled debt
            let covered = blocks_coverable(&account.balance, &rate_total, delta)?;
            transfer_full_rate(account, payments, covered)?;
            let short = delta - covered;
            for payment in payments
                .iter_mut()
                .filter(|p| p.state != PaymentState::Closed)
            {
                let missed = payment.rate.checked_mul_blocks(short)?;
                payment.unsettled = payment.unsettled.checked_add(&missed)?;
            }
        }
    }
    account.settled_at = height;

    absorb_unsettled(account, payments)?;

    let mut any_unsettled = false;
    for payment in payments
        .iter_mut()
        .filter(|p| p.state != PaymentState::Closed)
    {
        if payment.unsettled.is_empty() {
            payment.state = PaymentState::Open;
        } else {
            payment.state = PaymentState::Overdrawn;
            any_unsettled = true;
        }
    }

    let mut outcome = SettleOutcome::default();
    if any_unsettled {
        account.state = AccountState::Overdrawn;
        outcome.overdrawn = !was_overdrawn;
    } else {
        account.state = AccountState::Open;
        outcome.reopened = was_overdrawn;
    }
    Ok(outcome)
}

/// Whole blocks the balance can fund at the combined rate, capped at `delta`.
/// Overdraw in any single denom caps the whole account.
fn blocks_coverable(
    balance: &DecCoins,
    rate_total: &DecCoins,
    delta: u64,
) -> ContractResult<u64> {
    let mut covered = delta;
    for rate in rate_total.iter() {
        if !rate.is_positive() {
            continue;
        }
        let available = balance.amount_of(&rate.denom);
        let blocks = if available.is_negative() || available.is_zero() {
            0
        } else {
            let quotient = available.checked_div(rate.amount)?;
            if quotient >= crate::coins::dec_from_blocks(delta)? {
                delta
            } else {
                floor_to_blocks(quotient)?
            }
        };
        covered = covered.min(blocks);
    }
    Ok(covered)
}

fn floor_to_blocks(value: SignedDecimal256) -> ContractResult<u64> {
    let floored = value.to_int_floor();
    if floored.is_negative() {
        return Ok(0);
    }
    let unsigned =
        Uint128::try_from(floored.unsigned_abs()).map_err(|_| ContractError::DecimalRange)?;
    u64::try_from(unsigned.u128()).map_err(|_| ContractError::DecimalRange)
}

/// Draw every active payment at full rate for `blocks`, debiting depositors
/// in insertion order.
fn transfer_full_rate(
    account: &mut EscrowAccount,
    payments: &mut [Payment],
    blocks: u64,
) -> ContractResult<()> {
    if blocks == 0 {
        return Ok(());
    }
    for payment in payments
        .iter_mut()
        .filter(|p| p.state != PaymentState::Closed)
    {
        let amount = payment.rate.checked_mul_blocks(blocks)?;
        debit_depositors(account, &amount)?;
        payment.balance = payment.balance.checked_add(&amount)?;
        account.transferred = account.transferred.checked_add(&amount)?;
    }
    Ok(())
}

/// Absorb outstanding `unsettled` debt from remaining funds, oldest payment
/// first, ties broken by xid.
fn absorb_unsettled(account: &mut EscrowAccount, payments: &mut [Payment]) -> ContractResult<()> {
    let mut order: Vec<usize> = (0..payments.len())
        .filter(|&i| payments[i].state != PaymentState::Closed && !payments[i].unsettled.is_empty())
        .collect();
    order.sort_by(|&a, &b| {
        payments[a]
            .created_at
            .cmp(&payments[b].created_at)
            .then_with(|| payments[a].xid.cmp(&payments[b].xid))
    });

    for idx in order {
        let payment = &mut payments[idx];
        let mut absorbed = DecCoins::new();
        for owed in payment.unsettled.iter() {
            let available = account.balance.amount_of(&owed.denom);
            if available.is_negative() || available.is_zero() {
                continue;
            }
            let take = if available >= owed.amount {
                owed.amount
            } else {
                available
            };
            absorbed.add(&DecCoin::new(owed.denom.clone(), take))?;
        }
        if absorbed.is_empty() {
            continue;
        }
        debit_depositors(account, &absorbed)?;
        payment.balance = payment.balance.checked_add(&absorbed)?;
        payment.unsettled = payment.unsettled.checked_sub(&absorbed)?;
        account.transferred = account.transferred.checked_add(&absorbed)?;
    }
    Ok(())
}

/// Debit `amount` from depositors oldest-first and from the aggregate
/// balance. Callers only request amounts the account covers.
fn debit_depositors(account: &mut EscrowAccount, amount: &DecCoins) -> ContractResult<()> {
    let mut remaining = amount.clone();
    for depositor in account.depositors.iter_mut() {
        if remaining.is_empty() {
            break;
        }
        let mut taken = DecCoins::new();
        for need in remaining.iter() {
            let held = depositor.balance.amount_of(&need.denom);
            if held.is_zero() || held.is_negative() {
                continue;
            }
            let take = if held >= need.amount { need.amount } else { held };
            taken.add(&DecCoin::new(need.denom.clone(), take))?;
        }
        depositor.balance = depositor.balance.checked_sub(&taken)?;
        remaining = remaining.checked_sub(&taken)?;
    }
    if !remaining.is_empty() {
        return Err(ContractError::InsufficientFunds {
            available: account.balance.to_string(),
            required: amount.to_string(),
        });
    }
    account.balance = account.balance.checked_sub(amount)?;
    Ok(())
}

/// Refund residual payment balance into the newest depositor (and the
/// aggregate), used when a payment closes.
pub fn refund_to_account(account: &mut EscrowAccount, residual: &DecCoins) -> ContractResult<()> {
    if residual.is_empty() {
        return Ok(());
    }
    account.balance = account.balance.checked_add(residual)?;
    let newest = account
        .depositors
        .last_mut()
        .ok_or_else(|| ContractError::not_found("depositor", account.id.to_string()))?;
    newest.balance = newest.balance.checked_add(residual)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AccountId, AccountScope};
    use cosmwasm_std::{Addr, Coin};

    fn dec_coins(amount: &str, denom: &str) -> DecCoins {
        DecCoins::from(vec![DecCoin::new(denom, amount.parse().unwrap())])
    }

    fn test_account(deposit: u128) -> EscrowAccount {
        let owner = Addr::unchecked("virt1owner");
        let balance = DecCoins::from_coins(&[Coin::new(deposit, "uact")]).unwrap();
        EscrowAccount {
            id: AccountId {
                scope: AccountScope::Deployment,
                xid: "virt1owner/1".to_string(),
            },
            owner: owner.clone(),
            state: AccountState::Open,
            balance: balance.clone(),
            transferred: DecCoins::new(),
            settled_at: 1,
            depositors: vec![super::super::state::Depositor {
                owner,
                height: 1,
                source: super::super::state::DepositSource::Balance,
                balance,
                direct: true,
            }],
        }
    }

    fn test_payment(rate: &str) -> Payment {
        Payment {
            account: AccountId {
                scope: AccountScope::Deployment,
                xid: "virt1owner/1".to_string(),
            },
            xid: "p1".to_string(),
            owner: Addr::unchecked("virt1provider"),
            state: PaymentState::Open,
            rate: dec_coins(rate, "uact"),
            balance: DecCoins::new(),
            unsettled: DecCoins::new(),
            withdrawn: vec![],
            created_at: 1,
        }
    }

    #[test]
    fn full_rate_settlement() {
        let mut account = test_account(1000);
        let mut payments = vec![test_payment("10")];
        let outcome = settle(&mut account, &mut payments, 101).unwrap();
        assert_eq!(outcome, SettleOutcome::default());
        assert_eq!(payments[0].balance, dec_coins("1000", "uact"));
        assert!(account.balance.is_empty());
        assert_eq!(account.settled_at, 101);
        assert_eq!(account.state, AccountState::Open);
    }

    #[test]
    fn settlement_is_idempotent_at_same_height() {
        let mut account = test_account(1000);
        let mut payments = vec![test_payment("10")];
        settle(&mut account, &mut payments, 50).unwrap();
        let snapshot = (account.clone(), payments.clone());
        settle(&mut account, &mut payments, 50).unwrap();
        assert_eq!(account, snapshot.0);
        assert_eq!(payments, snapshot.1);
    }

    #[test]
    fn split_settlement_composes() {
        let mut a1 = test_account(1000);
        let mut p1 = vec![test_payment("7.5")];
        settle(&mut a1, &mut p1, 40).unwrap();
        settle(&mut a1, &mut p1, 101).unwrap();

        let mut a2 = test_account(1000);
        let mut p2 = vec![test_payment("7.5")];
        settle(&mut a2, &mut p2, 101).unwrap();

        assert_eq!(a1, a2);
        assert_eq!(p1, p2);
    }

    #[test]
    fn overdraw_accrues_unsettled() {
        let mut account = test_account(50);
        let mut payments = vec![test_payment("10")];
        // 10 blocks wanted, only 5 covered
        let outcome = settle(&mut account, &mut payments, 11).unwrap();
        assert!(outcome.overdrawn);
        assert_eq!(account.state, AccountState::Overdrawn);
        assert_eq!(payments[0].state, PaymentState::Overdrawn);
        assert_eq!(payments[0].balance, dec_coins("50", "uact"));
        assert_eq!(payments[0].unsettled, dec_coins("50", "uact"));
        assert!(account.balance.is_empty());
    }

    #[test]
    fn deposit_catchup_absorbs_oldest_first() {
        let mut account = test_account(50);
        let older = test_payment("10");
        let mut newer = test_payment("10");
        newer.xid = "p2".to_string();
        newer.created_at = 2;
        let mut payments = vec![older, newer];
        settle(&mut account, &mut payments, 11).unwrap();
        // each short by 10·(11-settleable span); combined unsettled is 150
        let unsettled_total = payments[0]
            .unsettled
            .checked_add(&payments[1].unsettled)
            .unwrap();
        assert_eq!(unsettled_total, dec_coins("150", "uact"));

        // top up enough for the older payment only
        let top_up = dec_coins("75", "uact");
        account.balance = account.balance.checked_add(&top_up).unwrap();
        account.depositors[0].balance =
            account.depositors[0].balance.checked_add(&top_up).unwrap();
        let outcome = settle(&mut account, &mut payments, 11).unwrap();
        assert!(!outcome.reopened);
        assert!(payments[0].unsettled.is_empty());
        assert_eq!(payments[0].state, PaymentState::Open);
        assert_eq!(payments[1].state, PaymentState::Overdrawn);
        assert_eq!(
            payments[1].unsettled,
            dec_coins("75", "uact"),
            "remaining top-up flows to the newer payment"
        );
    }

    #[test]
    fn multi_denom_overdraw_in_one_denom_overdraws_account() {
        let mut account = test_account(1000);
        let akt = DecCoins::from_coins(&[Coin::new(5u128, "uakt")]).unwrap();
        account.balance = account.balance.checked_add(&akt).unwrap();
        account.depositors[0].balance = account.depositors[0].balance.checked_add(&akt).unwrap();

        let mut payment = test_payment("1");
        payment.rate = DecCoins::from(vec![
            DecCoin::new("uact", "1".parse().unwrap()),
            DecCoin::new("uakt", "1".parse().unwrap()),
        ]);
        let mut payments = vec![payment];
        let outcome = settle(&mut account, &mut payments, 11).unwrap();
        assert!(outcome.overdrawn);
        // uakt ran out after 5 of 10 blocks; the uact arrears are absorbed
        // from the remaining uact balance, the uakt arrears stay unsettled
        assert_eq!(payments[0].balance.amount_of("uakt"), "5".parse::<SignedDecimal256>().unwrap());
        assert_eq!(payments[0].balance.amount_of("uact"), "10".parse::<SignedDecimal256>().unwrap());
        assert!(payments[0].unsettled.amount_of("uact").is_zero());
        assert_eq!(
            payments[0].unsettled.amount_of("uakt"),
            "5".parse::<SignedDecimal256>().unwrap()
        );
        assert_eq!(account.state, AccountState::Overdrawn);
    }
}
