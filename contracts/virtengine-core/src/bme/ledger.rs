use cosmwasm_std::{
    Addr, BankMsg, Coin, CosmosMsg, Decimal, Event, Order, Storage, Uint128,
};
use neutron_std::types::osmosis::tokenfactory::v1beta1::{MsgBurn, MsgMint};

use crate::bme::state::{
    BmeState, BmeStatus, LedgerKind, LedgerRecord, LedgerState, StatusRecord, ACT_DENOM,
    BME_STATE, BME_STATUS, LEDGER, MINT_EPOCHS, PENDING_LEDGER,
};
use crate::coins::{coin_vec_add, coin_vec_amount, coin_vec_sub};
use crate::error::{ContractError, ContractResult};
use crate::escrow;
use crate::events;
use crate::oracle::aggregate::current_price;
use crate::oracle::state::AggregatedPrice;
use crate::params::{BmeParams, BME_PARAMS, ORACLE_PARAMS};
use crate::utils::dec_to_bps;

/// Collateral ratio in basis points. Undefined (no outstanding credit) and
/// out-of-range ratios both read as maximally collateralized.
pub fn collateral_ratio_bps(
    state: &BmeState,
    params: &BmeParams,
    act_denom: &str,
    price: Decimal,
) -> ContractResult<u32> {
    let outstanding = outstanding_stable(state, act_denom);
    if outstanding.is_zero() {
        return Ok(u32::MAX);
    }
    let vault = coin_vec_amount(&state.vault, &params.collateral_denom);
    let value = vault.checked_mul_floor(price)?;
    match Decimal::checked_from_ratio(value, outstanding) {
        Ok(cr) => Ok(dec_to_bps(cr)),
        Err(_) => Ok(u32::MAX),
    }
}

/// BeginBlock evaluation: recompute the collateral ratio against the cached
/// oracle view, publish status transitions, and grow the mint runway while
/// in warning.
pub fn evaluate_status(storage: &mut dyn Storage, height: u64) -> ContractResult<Vec<Event>> {
    let params = BME_PARAMS.load(storage)?;
    let oracle_params = ORACLE_PARAMS.load(storage)?;
    let state = BME_STATE.may_load(storage)?.unwrap_or_default();
    let act = ACT_DENOM.may_load(storage)?.unwrap_or_default();
    let mut record = BME_STATUS.may_load(storage)?.unwrap_or_default();

    let price = current_price(
        storage,
        &oracle_params,
        &params.collateral_denom,
        &params.base_denom,
        height,
    )?;
    let healthy_price = price.filter(|p| p.healthy);

    let (status, cr_bps) = match &healthy_price {
        None => (BmeStatus::HaltOracle, record.cr_bps),
        Some(price) => {
            let cr_bps = collateral_ratio_bps(&state, &params, &act, price.twap)?;
            let status = if cr_bps >= params.warn_threshold_bps {
                BmeStatus::Healthy
            } else if cr_bps >= params.halt_threshold_bps {
                BmeStatus::Warning
            } else {
                BmeStatus::HaltCr
            };
            (status, cr_bps)
        }
    };

    let mut epoch_height_diff = record.epoch_height_diff;
    if status == BmeStatus::Warning && !act.is_empty() {
        let runway = warning_runway(&params, cr_bps);
        epoch_height_diff = runway;
        let next = height.saturating_add(runway);
        let current = MINT_EPOCHS.may_load(storage, act.as_str())?.unwrap_or(0);
        if next > current {
            MINT_EPOCHS.save(storage, act.as_str(), &next)?;
        }
    }

    let mut out = Vec::new();
    if status != record.status {
        out.push(events::mint_status_change(
            &record.status.to_string(),
            &status.to_string(),
            cr_bps,
        ));
        record = StatusRecord {
            status,
            previous_status: record.status,
            cr_bps,
            updated_at: height,
            epoch_height_diff,
        };
    } else {
        record.cr_bps = cr_bps;
        record.epoch_height_diff = epoch_height_diff;
    }
    BME_STATUS.save(storage, &record)?;
    Ok(out)
}

/// Runway grows cumulatively from the baseline: one extra
/// `epoch_blocks_backoff` share per bps the ratio sits below `warn`.
fn warning_runway(params: &BmeParams, cr_bps: u32) -> u64 {
    let drop_bps = params.warn_threshold_bps.saturating_sub(cr_bps) as u128;
    let scale = 100_000_000u128;
    let grown = (params.min_epoch_blocks as u128)
        .saturating_mul(scale + params.epoch_blocks_backoff_bps as u128 * drop_bps)
        / scale;
    u64::try_from(grown).unwrap_or(u64::MAX)
}

enum ExecOutcome {
    Executed {
        msgs: Vec<CosmosMsg>,
        minted: Coin,
        burned: Coin,
    },
    Blocked(ContractError),
}

/// EndBlock pass: walk pending records in ascending key order; execute what
/// status, epoch, and vault permit; leave the rest pending. A failing record
/// never stalls the block.
pub fn execute_pending(
    storage: &mut dyn Storage,
    contract: &Addr,
    height: u64,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let params = BME_PARAMS.load(storage)?;
    let oracle_params = ORACLE_PARAMS.load(storage)?;
    let act = ACT_DENOM.may_load(storage)?.unwrap_or_default();
    let status = BME_STATUS.may_load(storage)?.unwrap_or_default();
    let price = current_price(
        storage,
        &oracle_params,
        &params.collateral_denom,
        &params.base_denom,
        height,
    )?;

    let keys: Result<Vec<String>, _> = PENDING_LEDGER
        .keys(storage, None, None, Order::Ascending)
        .collect();
    let keys = keys?;

    let mut msgs = Vec::new();
    let mut out = Vec::new();
    for key in keys {
        let mut record = PENDING_LEDGER.load(storage, key.as_str())?;
        let next_epoch = MINT_EPOCHS
            .may_load(storage, record.to_denom.as_str())?
            .unwrap_or(0);
        let result = try_execute(
            storage,
            &params,
            &act,
            &status,
            price.as_ref(),
            next_epoch,
            contract,
            height,
            &record,
        );
        match result {
            Ok(ExecOutcome::Executed {
                msgs: record_msgs,
                minted,
                burned,
            }) => {
                record.state = LedgerState::Executed;
                record.executed_at = Some(height);
                record.minted = Some(minted.clone());
                PENDING_LEDGER.remove(storage, key.as_str());
                LEDGER.save(storage, key.as_str(), &record)?;
                msgs.extend(record_msgs);
                out.push(events::ledger_record_executed(&key, &burned, &minted));
            }
            Ok(ExecOutcome::Blocked(reason)) => {
                out.push(
                    Event::new("ledger_record_blocked")
                        .add_attribute("record", key.clone())
                        .add_attribute("reason", reason.to_string()),
                );
            }
            Err(err) => {
                out.push(
                    Event::new("ledger_record_error")
                        .add_attribute("record", key.clone())
                        .add_attribute("error", err.to_string()),
                );
            }
        }
    }
    Ok((msgs, out))
}

#[allow(clippy::too_many_arguments)]
fn try_execute(
    storage: &mut dyn Storage,
    params: &BmeParams,
    act: &str,
    status: &StatusRecord,
    price: Option<&AggregatedPrice>,
    next_epoch: u64,
    contract: &Addr,
    height: u64,
    record: &LedgerRecord,
) -> ContractResult<ExecOutcome> {
    let minting_stable = record.to_denom == act;
    if minting_stable {
        if status.status.blocks_mint() {
            return Ok(ExecOutcome::Blocked(ContractError::CircuitBreaker {
                status: status.status.to_string(),
            }));
        }
        if height < next_epoch {
            return Ok(ExecOutcome::Blocked(ContractError::EpochNotReached {
                next_epoch,
            }));
        }
    } else if status.status.blocks_burn() {
        return Ok(ExecOutcome::Blocked(ContractError::CircuitBreaker {
            status: status.status.to_string(),
        }));
    }

    let price = match price {
        None => {
            return Ok(ExecOutcome::Blocked(ContractError::PriceNotAvailable {
                denom: params.collateral_denom.clone(),
                base_denom: params.base_denom.clone(),
            }))
        }
        Some(price) if !price.healthy => {
            return Ok(ExecOutcome::Blocked(ContractError::OracleUnhealthy {
                denom: params.collateral_denom.clone(),
                base_denom: params.base_denom.clone(),
            }))
        }
        Some(price) => price,
    };

    if minting_stable {
        execute_stable_mint(storage, params, act, price, contract, record)
    } else {
        execute_collateral_payout(storage, params, act, price, contract, record)
    }
}

/// Burn collateral, mint stable credits at price minus the mint spread.
fn execute_stable_mint(
    storage: &mut dyn Storage,
    params: &BmeParams,
    act: &str,
    price: &AggregatedPrice,
    contract: &Addr,
    record: &LedgerRecord,
) -> ContractResult<ExecOutcome> {
    let mut burn_amount = record.coins_to_burn.amount;
    let convert_account = match &record.kind {
        LedgerKind::DepositConvert { account } => {
            burn_amount = escrow::execute::convertible_amount(
                storage,
                account,
                &record.owner,
                &params.collateral_denom,
                burn_amount,
            )?;
            Some(account.clone())
        }
        LedgerKind::Swap => None,
    };

    let gross = burn_amount.checked_mul_floor(price.twap)?;
    let minted_amount = gross.checked_mul_floor(one_minus_bps(params.mint_spread_bps))?;
    let burned = Coin::new(burn_amount.u128(), params.collateral_denom.clone());
    let minted = Coin::new(minted_amount.u128(), act.to_string());

    let mut state = BME_STATE.may_load(storage)?.unwrap_or_default();
    coin_vec_add(&mut state.vault, &burned);
    coin_vec_add(&mut state.burned, &burned);
    coin_vec_add(&mut state.minted, &minted);
    coin_vec_add(&mut state.remint_credits, &burned);
    BME_STATE.save(storage, &state)?;

    let mut msgs: Vec<CosmosMsg> = Vec::new();
    if !minted.amount.is_zero() {
        let mint_to = match &convert_account {
            // converted deposits stay in contract custody for their account
            Some(account) => {
                escrow::execute::apply_deposit_convert(
                    storage,
                    account,
                    &record.owner,
                    &burned,
                    &minted,
                )?;
                contract.to_string()
            }
            None => record.to.to_string(),
        };
        msgs.push(
            MsgMint {
                sender: contract.to_string(),
                amount: Some(minted.clone().into()),
                mint_to_address: mint_to,
            }
            .into(),
        );
    }

    Ok(ExecOutcome::Executed {
        msgs,
        minted,
        burned,
    })
}

/// Burn stable credits, pay collateral from the vault, remint credits first.
fn execute_collateral_payout(
    storage: &mut dyn Storage,
    params: &BmeParams,
    act: &str,
    price: &AggregatedPrice,
    contract: &Addr,
    record: &LedgerRecord,
) -> ContractResult<ExecOutcome> {
    let burn = &record.coins_to_burn;
    let gross = burn.amount.checked_div_floor(price.twap)?;
    let payout_amount = gross.checked_mul_floor(one_minus_bps(params.settle_spread_bps))?;
    let payout = Coin::new(payout_amount.u128(), params.collateral_denom.clone());

    let mut state = BME_STATE.may_load(storage)?.unwrap_or_default();
    let vault_held = coin_vec_amount(&state.vault, &params.collateral_denom);
    if vault_held < payout.amount {
        return Ok(ExecOutcome::Blocked(ContractError::VaultInsufficient {
            denom: params.collateral_denom.clone(),
            available: vault_held.to_string(),
            required: payout.amount.to_string(),
        }));
    }

    let credits = coin_vec_amount(&state.remint_credits, &params.collateral_denom);
    let credits_used = credits.min(payout.amount);
    if !credits_used.is_zero() {
        coin_vec_sub(
            &mut state.remint_credits,
            &Coin::new(credits_used.u128(), params.collateral_denom.clone()),
        )?;
    }
    coin_vec_sub(&mut state.vault, &payout)?;
    coin_vec_add(&mut state.burned, &Coin::new(burn.amount.u128(), act));
    coin_vec_add(&mut state.minted, &payout);
    BME_STATE.save(storage, &state)?;

    let mut msgs: Vec<CosmosMsg> = vec![MsgBurn {
        sender: contract.to_string(),
        amount: Some(burn.clone().into()),
        burn_from_address: contract.to_string(),
    }
    .into()];
    if !payout.amount.is_zero() {
        msgs.push(
            BankMsg::Send {
                to_address: record.to.to_string(),
                amount: vec![payout.clone()],
            }
            .into(),
        );
    }

    Ok(ExecOutcome::Executed {
        msgs,
        minted: payout,
        burned: Coin::new(burn.amount.u128(), act),
    })
}

fn one_minus_bps(bps: u32) -> Decimal {
    Decimal::from_ratio(10_000u128.saturating_sub(bps as u128), 10_000u128)
}

/// Helper used by queries and invariant checks.
pub fn outstanding_stable(state: &BmeState, act_denom: &str) -> Uint128 {
    coin_vec_amount(&state.minted, act_denom)
        .checked_sub(coin_vec_amount(&state.burned, act_denom))
        .unwrap_or_default()
}
