use cosmwasm_std::{
    Addr, Coin, DepsMut, Env, Event, MessageInfo, Response, Storage, SubMsg, SubMsgResult,
};
use neutron_std::types::osmosis::tokenfactory::v1beta1::MsgCreateDenom;

use crate::coins::coin_vec_add;
use crate::error::{ContractError, ContractResult};
use crate::events;
use crate::ids::AccountId;
use crate::params::{assert_authority, BME_PARAMS};
use crate::bme::state::{
    LedgerKind, LedgerRecord, LedgerState, ACT_DENOM, BME_STATE, CREATE_STABLE_DENOM_REPLY_ID,
    LEDGER_SEQ, PENDING_LEDGER,
};
use crate::utils::extract_denom;

fn single_coin<'a>(funds: &'a [Coin], denom: &str) -> ContractResult<&'a Coin> {
    if funds.is_empty() {
        return Err(ContractError::NoFundsSent);
    }
    if funds.len() != 1 || funds[0].denom != denom {
        return Err(ContractError::InvalidDenom {
            denom: funds
                .iter()
                .find(|c| c.denom != denom)
                .map(|c| c.denom.clone())
                .unwrap_or_default(),
            reason: format!("expected a single deposit of {denom}"),
        });
    }
    if funds[0].amount.is_zero() {
        return Err(ContractError::NonPositiveAmount {
            kind: "burn amount".to_string(),
        });
    }
    Ok(&funds[0])
}

fn act_denom(storage: &dyn Storage) -> ContractResult<String> {
    let denom = ACT_DENOM.load(storage)?;
    if denom.is_empty() {
        return Err(ContractError::TokenNotCreated);
    }
    Ok(denom)
}

/// Append a pending ledger record; the per-block scheduler executes it once
/// status and epoch permit.
fn enqueue(
    storage: &mut dyn Storage,
    denom: &str,
    to_denom: &str,
    owner: &Addr,
    to: &Addr,
    coins_to_burn: &Coin,
    kind: LedgerKind,
    height: u64,
) -> ContractResult<LedgerRecord> {
    let seq = LEDGER_SEQ.may_load(storage)?.unwrap_or_default();
    LEDGER_SEQ.save(storage, &(seq + 1))?;

    let record = LedgerRecord {
        denom: denom.to_string(),
        to_denom: to_denom.to_string(),
        source: owner.clone(),
        height,
        seq,
        owner: owner.clone(),
        to: to.clone(),
        coins_to_burn: coins_to_burn.clone(),
        kind,
        state: LedgerState::Pending,
        executed_at: None,
        minted: None,
    };
    PENDING_LEDGER.save(storage, record.key().as_str(), &record)?;
    Ok(record)
}

/// Burn collateral for stable credits at the oracle price.
pub fn execute_mint_act(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    to: Option<String>,
) -> ContractResult<Response> {
    let params = BME_PARAMS.load(deps.storage)?;
    let act = act_denom(deps.storage)?;
    let burn = single_coin(&info.funds, &params.collateral_denom)?;
    let to = match to {
        Some(addr) => deps.api.addr_validate(&addr)?,
        None => info.sender.clone(),
    };

    let record = enqueue(
        deps.storage,
        &params.collateral_denom,
        &act,
        &info.sender,
        &to,
        burn,
        LedgerKind::Swap,
        env.block.height,
    )?;

    Ok(Response::new()
        .add_attribute("action", "mint_act")
        .add_attribute("record", record.key()))
}

/// Burn stable credits back into collateral.
pub fn execute_burn_act(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    to: Option<String>,
) -> ContractResult<Response> {
    let params = BME_PARAMS.load(deps.storage)?;
    let act = act_denom(deps.storage)?;
    let burn = single_coin(&info.funds, &act)?;
    let to = match to {
        Some(addr) => deps.api.addr_validate(&addr)?,
        None => info.sender.clone(),
    };

    let record = enqueue(
        deps.storage,
        &act,
        &params.collateral_denom,
        &info.sender,
        &to,
        burn,
        LedgerKind::Swap,
        env.block.height,
    )?;

    Ok(Response::new()
        .add_attribute("action", "burn_act")
        .add_attribute("record", record.key()))
}

/// The general swap: declared source and destination denoms, restricted to
/// the registered collateral/stable pair.
pub fn execute_burn_mint(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    denom_to_mint: String,
    to: Option<String>,
) -> ContractResult<Response> {
    let params = BME_PARAMS.load(deps.storage)?;
    let act = act_denom(deps.storage)?;

    let expected_burn = if denom_to_mint == act {
        params.collateral_denom.clone()
    } else if denom_to_mint == params.collateral_denom {
        act.clone()
    } else {
        return Err(ContractError::InvalidDenom {
            denom: denom_to_mint,
            reason: "not a registered mint destination".to_string(),
        });
    };

    let burn = single_coin(&info.funds, &expected_burn)?;
    let to = match to {
        Some(addr) => deps.api.addr_validate(&addr)?,
        None => info.sender.clone(),
    };

    let record = enqueue(
        deps.storage,
        &expected_burn,
        &denom_to_mint,
        &info.sender,
        &to,
        burn,
        LedgerKind::Swap,
        env.block.height,
    )?;

    Ok(Response::new()
        .add_attribute("action", "burn_mint")
        .add_attribute("record", record.key()))
}

/// Governance-only collateral injection; raises the collateral ratio at the
/// next evaluation.
pub fn execute_seed_vault(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    source: String,
) -> ContractResult<Response> {
    assert_authority(deps.as_ref(), &info.sender)?;
    let params = BME_PARAMS.load(deps.storage)?;
    let seed = single_coin(&info.funds, &params.collateral_denom)?.clone();

    let mut state = BME_STATE.may_load(deps.storage)?.unwrap_or_default();
    coin_vec_add(&mut state.vault, &seed);
    BME_STATE.save(deps.storage, &state)?;

    Ok(Response::new()
        .add_attribute("action", "seed_vault")
        .add_event(events::vault_seeded(&seed, &source)))
}

/// Queue the conversion of a non-direct collateral deposit into stable
/// credits for its escrow account.
pub fn enqueue_deposit_convert(
    storage: &mut dyn Storage,
    depositor: &Addr,
    account: &AccountId,
    coin: &Coin,
    height: u64,
) -> ContractResult<Event> {
    let params = BME_PARAMS.load(storage)?;
    let act = act_denom(storage)?;
    let record = enqueue(
        storage,
        &params.collateral_denom,
        &act,
        depositor,
        depositor,
        coin,
        LedgerKind::DepositConvert {
            account: account.clone(),
        },
        height,
    )?;
    Ok(Event::new("deposit_convert_queued")
        .add_attribute("account", account.to_string())
        .add_attribute("record", record.key()))
}

/// Submessage creating the stable factory denom; issued at instantiation.
pub fn create_stable_denom_submsg(env: &Env, subdenom: &str) -> SubMsg {
    SubMsg::reply_on_success(
        MsgCreateDenom {
            sender: env.contract.address.to_string(),
            subdenom: subdenom.to_string(),
        },
        CREATE_STABLE_DENOM_REPLY_ID,
    )
}

pub fn handle_create_stable_denom_reply(
    deps: DepsMut,
    result: SubMsgResult,
) -> ContractResult<Response> {
    match result {
        SubMsgResult::Ok(response) => {
            let denom = extract_denom(&response)?;
            let existing = ACT_DENOM.may_load(deps.storage)?.unwrap_or_default();
            if !existing.is_empty() {
                return Err(ContractError::TokenAlreadyCreated);
            }
            ACT_DENOM.save(deps.storage, &denom)?;
            Ok(Response::new()
                .add_attribute("action", "create_stable_denom_reply_success")
                .add_attribute("new_token_denom", denom))
        }
        SubMsgResult::Err(err) => Ok(Response::new()
            .add_attribute("action", "create_stable_denom_reply_error")
            .add_attribute("error", err)),
    }
}
