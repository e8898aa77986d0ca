use cosmwasm_std::{DepsMut, Env, Order, Response};

use crate::bme;
use crate::epochs;
use crate::error::ContractResult;
use crate::escrow::execute as escrow_ops;
use crate::escrow::state::{AccountState, PaymentState, ACCOUNTS};
use crate::events;
use crate::market;
use crate::oracle;
use crate::params::{BME_PARAMS, MARKET_PARAMS, ORACLE_PARAMS, TAKE_PARAMS};

/// BeginBlock: refresh the oracle view the block will trade against, then
/// re-evaluate the burn/mint circuit breaker on it.
pub fn begin_block(deps: DepsMut, env: &Env) -> ContractResult<Response> {
    let height = env.block.height;
    let oracle_params = ORACLE_PARAMS.load(deps.storage)?;
    let bme_params = BME_PARAMS.load(deps.storage)?;

    let mut response = Response::new().add_attribute("action", "begin_block");

    let liveness_events = oracle::aggregate::sweep_liveness(
        deps.storage,
        &oracle_params,
        &bme_params.collateral_denom,
        &bme_params.base_denom,
        height,
    )?;
    response = response.add_events(liveness_events);

    oracle::aggregate::refresh_cache(
        deps.storage,
        &oracle_params,
        &bme_params.collateral_denom,
        &bme_params.base_denom,
        height,
    )?;

    let status_events = bme::ledger::evaluate_status(deps.storage, height)?;
    Ok(response.add_events(status_events))
}

/// EndBlock, fixed order: execute the pending burn/mint ledger, settle every
/// live escrow account (firing marketplace hooks on state changes), close
/// what outlived its insufficient-funds grace, then tick epochs.
pub fn end_block(deps: DepsMut, env: &Env) -> ContractResult<Response> {
    let height = env.block.height;
    let mut response = Response::new().add_attribute("action", "end_block");

    // 1. burn/mint ledger
    let (bme_msgs, bme_events) =
        bme::ledger::execute_pending(deps.storage, &env.contract.address, height)?;
    response = response.add_messages(bme_msgs).add_events(bme_events);

    // 2. escrow settlement
    let account_keys: Vec<String> = ACCOUNTS
        .keys(deps.storage, None, None, Order::Ascending)
        .collect::<Result<_, _>>()?;
    for key in account_keys {
        let account = ACCOUNTS.load(deps.storage, key.as_str())?;
        if account.state == AccountState::Closed {
            continue;
        }
        let payments = crate::escrow::state::load_payments(deps.storage, &account.id)?;
        if !payments.iter().any(|p| p.state != PaymentState::Closed) {
            continue;
        }
        let outcome = escrow_ops::settle_account(deps.storage, &account.id, height)?;
        if outcome.overdrawn {
            let paused = market::execute::on_account_overdrawn(deps.storage, &account.id, height)?;
            response = response.add_events(paused);
        }
        if outcome.reopened {
            let resumed = market::execute::on_account_reopened(deps.storage, &account.id, height)?;
            response = response.add_events(resumed);
            response = response.add_event(events::account_reopened(&account.id));
        }
    }

    // 3. marketplace grace progression
    let market_params = MARKET_PARAMS.load(deps.storage)?;
    let take = TAKE_PARAMS.load(deps.storage)?;
    let (grace_msgs, grace_events) = market::execute::close_expired_grace(
        deps.storage,
        &take,
        market_params.lease_grace_blocks,
        height,
    )?;
    response = response.add_messages(grace_msgs).add_events(grace_events);

    // 4. epoch tick
    let epoch_events = epochs::tick_all(deps.storage, env.block.time)?;
    Ok(response.add_events(epoch_events))
}
