use cosmwasm_std::{
    entry_point, Binary, Deps, DepsMut, Env, MessageInfo, Reply, Response,
};
use cw2::set_contract_version;

use crate::bme;
use crate::bme::state::{
    StatusRecord, ACT_DENOM, BME_STATE, BME_STATUS, CREATE_STABLE_DENOM_REPLY_ID, LEDGER_SEQ,
};
use crate::epochs;
use crate::error::{ContractError, ContractResult};
use crate::escrow;
use crate::gates::audit::{AuditedAttributes, AUDITED_ATTRIBUTES};
use crate::gates::cert::{Certificate, CertificateState, CERTIFICATES};
use crate::gates::provider::{Provider, PROVIDERS};
use crate::gates::{audit, cert, provider};
use crate::market;
use crate::msg::{ExecuteMsg, InstantiateMsg, MigrateMsg, QueryMsg, SudoMsg};
use crate::oracle;
use crate::params::{
    assert_authority, AUTHORITY, BME_PARAMS, MARKET_PARAMS, ORACLE_PARAMS, TAKE_PARAMS,
    WASM_GATE_PARAMS,
};
use crate::query;
use crate::scheduler;

const CONTRACT_NAME: &str = concat!("crates.io:virtengine__", env!("CARGO_PKG_NAME"));
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

///////////////////
/// INSTANTIATE ///
///////////////////

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> ContractResult<Response> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;
    msg.validate()?;

    let authority = deps.api.addr_validate(&msg.authority)?;
    AUTHORITY.save(deps.storage, &authority)?;

    MARKET_PARAMS.save(deps.storage, &msg.market)?;
    let oracle_params = msg.oracle.into_params(deps.api)?;
    ORACLE_PARAMS.save(deps.storage, &oracle_params)?;
    BME_PARAMS.save(deps.storage, &msg.bme)?;
    let take_params = msg.take.into_params(deps.api)?;
    TAKE_PARAMS.save(deps.storage, &take_params)?;
    let gate_params = msg.wasm_gate.into_params(deps.api)?;
    WASM_GATE_PARAMS.save(deps.storage, &gate_params)?;

    BME_STATE.save(deps.storage, &Default::default())?;
    BME_STATUS.save(deps.storage, &StatusRecord::default())?;
    ACT_DENOM.save(deps.storage, &String::new())?;
    LEDGER_SEQ.save(deps.storage, &0u64)?;

    for epoch in msg.epochs {
        epochs::register_epoch(deps.storage, &epoch.into_info())?;
    }

    for entry in msg.providers {
        let owner = deps.api.addr_validate(&entry.owner)?;
        let record = Provider {
            owner: owner.clone(),
            host_uri: entry.host_uri,
            attributes: entry.attributes,
            info: entry.info,
        };
        PROVIDERS.save(deps.storage, &owner, &record)?;
    }
    for entry in msg.certificates {
        let owner = deps.api.addr_validate(&entry.owner)?;
        let record = Certificate {
            serial: entry.serial.clone(),
            state: CertificateState::Valid,
            cert: entry.cert,
            pubkey: entry.pubkey,
        };
        CERTIFICATES.save(deps.storage, (&owner, entry.serial.as_str()), &record)?;
    }
    for entry in msg.audited_attributes {
        let owner = deps.api.addr_validate(&entry.owner)?;
        let auditor = deps.api.addr_validate(&entry.auditor)?;
        let record = AuditedAttributes {
            owner: owner.clone(),
            auditor: auditor.clone(),
            attributes: entry.attributes,
        };
        AUDITED_ATTRIBUTES.save(deps.storage, (&owner, &auditor), &record)?;
    }

    let create_denom = bme::execute::create_stable_denom_submsg(&env, &msg.bme.stable_subdenom);

    Ok(Response::new()
        .add_submessage(create_denom)
        .add_attribute("action", "instantiate")
        .add_attribute("authority", authority.to_string())
        .add_attribute("collateral_denom", msg.bme.collateral_denom)
        .add_attribute("stable_subdenom", msg.bme.stable_subdenom))
}

///////////////
/// EXECUTE ///
///////////////

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    // wasm-origin gate: filtered addresses are rejected before any routing
    let gate = WASM_GATE_PARAMS.load(deps.storage)?;
    if gate.is_blocked(&info.sender) {
        return Err(ContractError::BlockedAddress {
            address: info.sender.to_string(),
        });
    }

    match msg {
        ExecuteMsg::CreateDeployment { dseq, groups, hash } => {
            market::execute::execute_create_deployment(deps, env, info, dseq, groups, hash)
        }
        ExecuteMsg::UpdateDeployment { dseq, hash } => {
            reject_funds(&info)?;
            market::execute::execute_update_deployment(deps, info, dseq, hash)
        }
        ExecuteMsg::CloseDeployment { dseq } => {
            reject_funds(&info)?;
            market::execute::execute_close_deployment(deps, env, info, dseq)
        }
        ExecuteMsg::PauseGroup { dseq, gseq } => {
            reject_funds(&info)?;
            market::execute::execute_pause_group(deps, env, info, dseq, gseq)
        }
        ExecuteMsg::StartGroup { dseq, gseq } => {
            reject_funds(&info)?;
            market::execute::execute_start_group(deps, env, info, dseq, gseq)
        }
        ExecuteMsg::CloseGroup { dseq, gseq } => {
            reject_funds(&info)?;
            market::execute::execute_close_group(deps, env, info, dseq, gseq)
        }
        ExecuteMsg::CreateBid {
            order,
            price,
            resources_offer,
        } => {
            let order_id = order.to_id(deps.api)?;
            market::execute::execute_create_bid(deps, env, info, order_id, price, resources_offer)
        }
        ExecuteMsg::CloseBid { order, bseq } => {
            reject_funds(&info)?;
            let order_id = order.to_id(deps.api)?;
            market::execute::execute_close_bid(deps, env, info, order_id, bseq)
        }
        ExecuteMsg::CreateLease { bid } => {
            reject_funds(&info)?;
            let bid_id = bid.to_id(deps.api)?;
            market::execute::execute_create_lease(deps, env, info, bid_id)
        }
        ExecuteMsg::CloseLease { lease, reason } => {
            reject_funds(&info)?;
            let lease_id = lease.to_id(deps.api)?;
            market::execute::execute_close_lease(deps, env, info, lease_id, reason)
        }
        ExecuteMsg::WithdrawLease { lease } => {
            reject_funds(&info)?;
            let lease_id = lease.to_id(deps.api)?;
            market::execute::execute_withdraw_lease(deps, env, info, lease_id)
        }
        ExecuteMsg::AccountDeposit {
            account,
            source,
            direct,
        } => {
            let id = account.to_id(deps.api)?;
            escrow::execute::execute_account_deposit(deps, env, info, id, source, direct)
        }
        ExecuteMsg::MintAct { to } => bme::execute::execute_mint_act(deps, env, info, to),
        ExecuteMsg::BurnAct { to } => bme::execute::execute_burn_act(deps, env, info, to),
        ExecuteMsg::BurnMint { denom_to_mint, to } => {
            bme::execute::execute_burn_mint(deps, env, info, denom_to_mint, to)
        }
        ExecuteMsg::SeedVault { source } => {
            bme::execute::execute_seed_vault(deps, env, info, source)
        }
        ExecuteMsg::AddPriceEntry {
            denom,
            base_denom,
            price,
            timestamp,
        } => {
            reject_funds(&info)?;
            oracle::execute::execute_add_price_entry(
                deps, env, info, denom, base_denom, price, timestamp,
            )
        }
        ExecuteMsg::CreateCertificate {
            serial,
            cert,
            pubkey,
        } => {
            reject_funds(&info)?;
            cert::execute_create_certificate(deps, info, serial, cert, pubkey)
        }
        ExecuteMsg::RevokeCertificate { serial } => {
            reject_funds(&info)?;
            cert::execute_revoke_certificate(deps, info, serial)
        }
        ExecuteMsg::CreateProvider {
            host_uri,
            attributes,
            info: provider_info,
        } => {
            reject_funds(&info)?;
            provider::execute_create_provider(deps, info, host_uri, attributes, provider_info)
        }
        ExecuteMsg::UpdateProvider {
            host_uri,
            attributes,
            info: provider_info,
        } => {
            reject_funds(&info)?;
            provider::execute_update_provider(deps, info, host_uri, attributes, provider_info)
        }
        ExecuteMsg::DeleteProvider {} => {
            reject_funds(&info)?;
            if !market::execute::provider_is_quiescent(deps.storage, &info.sender)? {
                return Err(ContractError::invalid_state(
                    "provider",
                    info.sender.as_str(),
                    "participating",
                ));
            }
            provider::delete_provider(deps, &info.sender)
        }
        ExecuteMsg::SignProviderAttributes { owner, attributes } => {
            reject_funds(&info)?;
            audit::execute_sign_provider_attributes(deps, info, owner, attributes)
        }
        ExecuteMsg::DeleteProviderAttributes { owner, keys } => {
            reject_funds(&info)?;
            audit::execute_delete_provider_attributes(deps, info, owner, keys)
        }
        ExecuteMsg::UpdateMarketParams { params } => {
            reject_funds(&info)?;
            assert_authority(deps.as_ref(), &info.sender)?;
            params.validate()?;
            MARKET_PARAMS.save(deps.storage, &params)?;
            Ok(Response::new().add_attribute("action", "update_market_params"))
        }
        ExecuteMsg::UpdateOracleParams { params } => {
            reject_funds(&info)?;
            assert_authority(deps.as_ref(), &info.sender)?;
            let params = params.into_params(deps.api)?;
            ORACLE_PARAMS.save(deps.storage, &params)?;
            Ok(Response::new().add_attribute("action", "update_oracle_params"))
        }
        ExecuteMsg::UpdateBmeParams { params } => {
            reject_funds(&info)?;
            assert_authority(deps.as_ref(), &info.sender)?;
            params.validate()?;
            BME_PARAMS.save(deps.storage, &params)?;
            Ok(Response::new().add_attribute("action", "update_bme_params"))
        }
        ExecuteMsg::UpdateTakeParams { params } => {
            reject_funds(&info)?;
            assert_authority(deps.as_ref(), &info.sender)?;
            let params = params.into_params(deps.api)?;
            TAKE_PARAMS.save(deps.storage, &params)?;
            Ok(Response::new().add_attribute("action", "update_take_params"))
        }
        ExecuteMsg::UpdateWasmGateParams { params } => {
            reject_funds(&info)?;
            assert_authority(deps.as_ref(), &info.sender)?;
            let params = params.into_params(deps.api)?;
            WASM_GATE_PARAMS.save(deps.storage, &params)?;
            Ok(Response::new().add_attribute("action", "update_wasm_gate_params"))
        }
    }
}

fn reject_funds(info: &MessageInfo) -> ContractResult<()> {
    if !info.funds.is_empty() {
        return Err(ContractError::FundsNotAllowed);
    }
    Ok(())
}

////////////
/// SUDO ///
////////////

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn sudo(deps: DepsMut, env: Env, msg: SudoMsg) -> Result<Response, ContractError> {
    match msg {
        SudoMsg::BeginBlock {} => scheduler::begin_block(deps, &env),
        SudoMsg::EndBlock {} => scheduler::end_block(deps, &env),
    }
}

/////////////
/// REPLY ///
/////////////

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn reply(deps: DepsMut, _env: Env, msg: Reply) -> Result<Response, ContractError> {
    match msg.id {
        CREATE_STABLE_DENOM_REPLY_ID => {
            bme::execute::handle_create_stable_denom_reply(deps, msg.result)
        }
        id => Err(ContractError::UnknownReplyId { id }),
    }
}

/////////////
/// QUERY ///
/////////////

#[entry_point]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> ContractResult<Binary> {
    match msg {
        QueryMsg::Deployment { owner, dseq } => query::query_deployment(deps, owner, dseq),
        QueryMsg::Deployments {
            owner,
            state,
            start_after,
            limit,
        } => query::query_deployments(deps, owner, state, start_after, limit),
        QueryMsg::Group { owner, dseq, gseq } => query::query_group(deps, owner, dseq, gseq),
        QueryMsg::Groups { owner, dseq } => query::query_groups(deps, owner, dseq),
        QueryMsg::Order { order } => query::query_order(deps, order),
        QueryMsg::Orders {
            owner,
            state,
            start_after,
            limit,
        } => query::query_orders(deps, owner, state, start_after, limit),
        QueryMsg::Bid { bid } => query::query_bid(deps, bid),
        QueryMsg::Bids {
            owner,
            provider,
            state,
            start_after,
            limit,
        } => query::query_bids(deps, owner, provider, state, start_after, limit),
        QueryMsg::Lease { lease } => query::query_lease(deps, lease),
        QueryMsg::Leases {
            owner,
            provider,
            state,
            start_after,
            limit,
        } => query::query_leases(deps, owner, provider, state, start_after, limit),
        QueryMsg::EscrowAccount { account } => query::query_escrow_account(deps, account),
        QueryMsg::EscrowAccounts {
            scope,
            state,
            start_after,
            limit,
        } => query::query_escrow_accounts(deps, scope, state, start_after, limit),
        QueryMsg::Payments { account, state } => query::query_payments(deps, account, state),
        QueryMsg::Params {} => query::query_params(deps),
        QueryMsg::VaultState {} => query::query_vault_state(deps),
        QueryMsg::BmeStatus {} => query::query_bme_status(deps),
        QueryMsg::LedgerRecords {
            executed,
            start_after,
            limit,
        } => query::query_ledger_records(deps, executed, start_after, limit),
        QueryMsg::AggregatedPrice { denom, base_denom } => {
            query::query_aggregated_price(deps, env, denom, base_denom)
        }
        QueryMsg::PriceFeedConfig {} => query::query_price_feed_config(deps),
        QueryMsg::Prices {
            denom,
            base_denom,
            source_idx,
            limit,
        } => query::query_prices(deps, denom, base_denom, source_idx, limit),
        QueryMsg::CurrentEpoch { identifier } => query::query_current_epoch(deps, identifier),
        QueryMsg::EpochInfos {} => query::query_epoch_infos(deps),
        QueryMsg::Certificates { owner } => query::query_certificates(deps, owner),
        QueryMsg::Provider { owner } => query::query_provider(deps, owner),
        QueryMsg::Providers { start_after, limit } => {
            query::query_providers(deps, start_after, limit)
        }
        QueryMsg::AuditedProviders { owner, auditor } => {
            query::query_audited_providers(deps, owner, auditor)
        }
    }
}

///////////////
/// MIGRATE ///
///////////////

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn migrate(deps: DepsMut, _env: Env, _msg: MigrateMsg) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    Ok(Response::new()
        .add_attribute("action", "migrate")
        .add_attribute("contract", CONTRACT_NAME)
        .add_attribute("version", CONTRACT_VERSION))
}
