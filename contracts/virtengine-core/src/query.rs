use cosmwasm_std::{to_json_binary, Binary, Deps, Env, Order, Storage};
use cw_storage_plus::{Bound, Map};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::to_vec;

use crate::bme::ledger::outstanding_stable;
use crate::bme::state::{ACT_DENOM, BME_STATE, BME_STATUS, LEDGER, MINT_EPOCHS, PENDING_LEDGER};
use crate::epochs::{load_epoch, EPOCHS};
use crate::error::{ContractError, ContractResult};
use crate::escrow::state::{AccountState, PaymentState, ACCOUNTS, PAYMENTS};
use crate::gates::audit::AUDITED_ATTRIBUTES;
use crate::gates::cert::CERTIFICATES;
use crate::gates::provider::PROVIDERS;
use crate::ids::{prefix_bounds, AccountScope, DeploymentId, GroupId};
use crate::market::state::{
    load_deployment, load_group, BidState, DeploymentState, LeaseState, OrderState, BIDS,
    DEPLOYMENTS, LEASES, ORDERS,
};
use crate::msg::{
    AccountRef, AggregatedPriceResponse, AllParamsResponse, BidRef, BidsResponse,
    BmeStatusResponse, CertificatesResponse, DeploymentsResponse, EpochInfosResponse,
    EscrowAccountsResponse, GroupsResponse, LeasesResponse, LedgerRecordsResponse, OrderRef,
    OrdersResponse, PaymentsResponse, PriceEntry, PriceFeedConfigResponse, PricesResponse,
    ProvidersResponse, AuditedProvidersResponse, VaultStateResponse,
};
use crate::oracle::aggregate::current_price;
use crate::oracle::state::{pair_key, SAMPLES};
use crate::params::{
    AUTHORITY, BME_PARAMS, MARKET_PARAMS, ORACLE_PARAMS, TAKE_PARAMS, WASM_GATE_PARAMS,
};

const DEFAULT_LIMIT: u32 = 30;
const MAX_LIMIT: u32 = 100;

fn page_limit(limit: Option<u32>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize
}

/// Ascending page over a string-keyed map, optionally under a prefix,
/// filtered before the limit applies.
fn range_page<T, F>(
    storage: &dyn Storage,
    map: &Map<&str, T>,
    prefix: Option<String>,
    start_after: Option<String>,
    limit: usize,
    keep: F,
) -> ContractResult<Vec<T>>
where
    T: Serialize + DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let bounds = prefix.map(|p| prefix_bounds(&p));
    let mut min_key = bounds.as_ref().map(|(lo, _)| lo.clone());
    let mut min_exclusive = false;
    if let Some(start_after) = start_after {
        let past_prefix = min_key
            .as_deref()
            .map(|lo| start_after.as_str() >= lo)
            .unwrap_or(true);
        if past_prefix {
            min_key = Some(start_after);
            min_exclusive = true;
        }
    }

    let min = min_key.map(|s| {
        if min_exclusive {
            Bound::ExclusiveRaw(s.into_bytes())
        } else {
            Bound::InclusiveRaw(s.into_bytes())
        }
    });
    let max = bounds.map(|(_, hi)| Bound::ExclusiveRaw(hi.into_bytes()));

    let mut out = Vec::new();
    for item in map.range(storage, min, max, Order::Ascending) {
        let (_, value) = item?;
        if keep(&value) {
            out.push(value);
            if out.len() >= limit {
                break;
            }
        }
    }
    Ok(out)
}

fn owner_prefix(owner: &Option<String>) -> Option<String> {
    owner.as_ref().map(|o| format!("{o}/"))
}

pub fn query_deployment(deps: Deps, owner: String, dseq: u64) -> ContractResult<Binary> {
    let id = DeploymentId::new(deps.api.addr_validate(&owner)?, dseq);
    Ok(to_json_binary(&load_deployment(deps.storage, &id)?)?)
}

pub fn query_deployments(
    deps: Deps,
    owner: Option<String>,
    state: Option<DeploymentState>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let deployments = range_page(
        deps.storage,
        &DEPLOYMENTS,
        owner_prefix(&owner),
        start_after,
        page_limit(limit),
        |d| state.map(|s| d.state == s).unwrap_or(true),
    )?;
    Ok(to_json_binary(&DeploymentsResponse { deployments })?)
}

pub fn query_group(deps: Deps, owner: String, dseq: u64, gseq: u32) -> ContractResult<Binary> {
    let id = GroupId {
        owner: deps.api.addr_validate(&owner)?,
        dseq,
        gseq,
    };
    Ok(to_json_binary(&load_group(deps.storage, &id)?)?)
}

pub fn query_groups(deps: Deps, owner: String, dseq: u64) -> ContractResult<Binary> {
    let id = DeploymentId::new(deps.api.addr_validate(&owner)?, dseq);
    let groups = crate::market::state::groups_of(deps.storage, &id)?;
    Ok(to_json_binary(&GroupsResponse { groups })?)
}

pub fn query_order(deps: Deps, order: OrderRef) -> ContractResult<Binary> {
    let id = order.to_id(deps.api)?;
    Ok(to_json_binary(&crate::market::state::load_order(
        deps.storage,
        &id,
    )?)?)
}

pub fn query_orders(
    deps: Deps,
    owner: Option<String>,
    state: Option<OrderState>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let orders = range_page(
        deps.storage,
        &ORDERS,
        owner_prefix(&owner),
        start_after,
        page_limit(limit),
        |o| state.map(|s| o.state == s).unwrap_or(true),
    )?;
    Ok(to_json_binary(&OrdersResponse { orders })?)
}

pub fn query_bid(deps: Deps, bid: BidRef) -> ContractResult<Binary> {
    let id = bid.to_id(deps.api)?;
    Ok(to_json_binary(&crate::market::state::load_bid(
        deps.storage,
        &id,
    )?)?)
}

pub fn query_bids(
    deps: Deps,
    owner: Option<String>,
    provider: Option<String>,
    state: Option<BidState>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let bids = range_page(
        deps.storage,
        &BIDS,
        owner_prefix(&owner),
        start_after,
        page_limit(limit),
        |b| {
            state.map(|s| b.state == s).unwrap_or(true)
                && provider
                    .as_ref()
                    .map(|p| b.id.provider.as_str() == p)
                    .unwrap_or(true)
        },
    )?;
    Ok(to_json_binary(&BidsResponse { bids })?)
}

pub fn query_lease(deps: Deps, lease: BidRef) -> ContractResult<Binary> {
    let id = lease.to_id(deps.api)?;
    Ok(to_json_binary(&crate::market::state::load_lease(
        deps.storage,
        &id,
    )?)?)
}

pub fn query_leases(
    deps: Deps,
    owner: Option<String>,
    provider: Option<String>,
    state: Option<LeaseState>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let leases = range_page(
        deps.storage,
        &LEASES,
        owner_prefix(&owner),
        start_after,
        page_limit(limit),
        |l| {
            state.map(|s| l.state == s).unwrap_or(true)
                && provider
                    .as_ref()
                    .map(|p| l.id.provider.as_str() == p)
                    .unwrap_or(true)
        },
    )?;
    Ok(to_json_binary(&LeasesResponse { leases })?)
}

pub fn query_escrow_account(deps: Deps, account: AccountRef) -> ContractResult<Binary> {
    let id = account.to_id(deps.api)?;
    Ok(to_json_binary(&crate::escrow::state::load_account(
        deps.storage,
        &id,
    )?)?)
}

pub fn query_escrow_accounts(
    deps: Deps,
    scope: Option<AccountScope>,
    state: Option<AccountState>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let prefix = scope.map(|s| format!("{s}/"));
    let accounts = range_page(
        deps.storage,
        &ACCOUNTS,
        prefix,
        start_after,
        page_limit(limit),
        |a| state.map(|s| a.state == s).unwrap_or(true),
    )?;
    Ok(to_json_binary(&EscrowAccountsResponse { accounts })?)
}

pub fn query_payments(
    deps: Deps,
    account: AccountRef,
    state: Option<PaymentState>,
) -> ContractResult<Binary> {
    let id = account.to_id(deps.api)?;
    let payments = PAYMENTS
        .prefix(id.key().as_str())
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, p)| p).map_err(ContractError::Std))
        .collect::<ContractResult<Vec<_>>>()?
        .into_iter()
        .filter(|p| state.map(|s| p.state == s).unwrap_or(true))
        .collect();
    Ok(to_json_binary(&PaymentsResponse { payments })?)
}

pub fn query_params(deps: Deps) -> ContractResult<Binary> {
    let response = AllParamsResponse {
        authority: AUTHORITY.load(deps.storage)?,
        market: MARKET_PARAMS.load(deps.storage)?,
        oracle: ORACLE_PARAMS.load(deps.storage)?,
        bme: BME_PARAMS.load(deps.storage)?,
        take: TAKE_PARAMS.load(deps.storage)?,
        wasm_gate: WASM_GATE_PARAMS.load(deps.storage)?,
    };
    let serialized = to_vec(&response).map_err(|_| ContractError::SerializationError)?;
    Ok(Binary::from(serialized))
}

pub fn query_vault_state(deps: Deps) -> ContractResult<Binary> {
    let state = BME_STATE.may_load(deps.storage)?.unwrap_or_default();
    let stable_denom = ACT_DENOM.may_load(deps.storage)?.unwrap_or_default();
    let outstanding_stable = outstanding_stable(&state, &stable_denom);
    let response = VaultStateResponse {
        state,
        stable_denom,
        outstanding_stable,
    };
    let serialized = to_vec(&response).map_err(|_| ContractError::SerializationError)?;
    Ok(Binary::from(serialized))
}

pub fn query_bme_status(deps: Deps) -> ContractResult<Binary> {
    let record = BME_STATUS.may_load(deps.storage)?.unwrap_or_default();
    let stable_denom = ACT_DENOM.may_load(deps.storage)?.unwrap_or_default();
    let next_mint_epoch = MINT_EPOCHS
        .may_load(deps.storage, stable_denom.as_str())?
        .unwrap_or(0);
    Ok(to_json_binary(&BmeStatusResponse {
        record,
        next_mint_epoch,
    })?)
}

pub fn query_ledger_records(
    deps: Deps,
    executed: Option<bool>,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let limit = page_limit(limit);
    let mut records = Vec::new();
    if executed != Some(true) {
        records.extend(range_page(
            deps.storage,
            &PENDING_LEDGER,
            None,
            start_after.clone(),
            limit,
            |_| true,
        )?);
    }
    if executed != Some(false) {
        records.extend(range_page(
            deps.storage,
            &LEDGER,
            None,
            start_after,
            limit.saturating_sub(records.len()).max(1),
            |_| true,
        )?);
    }
    records.truncate(limit);
    Ok(to_json_binary(&LedgerRecordsResponse { records })?)
}

pub fn query_aggregated_price(
    deps: Deps,
    env: Env,
    denom: String,
    base_denom: String,
) -> ContractResult<Binary> {
    let params = ORACLE_PARAMS.load(deps.storage)?;
    let price = current_price(deps.storage, &params, &denom, &base_denom, env.block.height)?;
    Ok(to_json_binary(&AggregatedPriceResponse { price })?)
}

pub fn query_price_feed_config(deps: Deps) -> ContractResult<Binary> {
    let params = ORACLE_PARAMS.load(deps.storage)?;
    let bme = BME_PARAMS.load(deps.storage)?;
    Ok(to_json_binary(&PriceFeedConfigResponse {
        params,
        tracked_pair: (bme.collateral_denom, bme.base_denom),
    })?)
}

pub fn query_prices(
    deps: Deps,
    denom: String,
    base_denom: String,
    source_idx: Option<u32>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let params = ORACLE_PARAMS.load(deps.storage)?;
    let pair = pair_key(&denom, &base_denom);
    let limit = page_limit(limit);
    let indices: Vec<u32> = match source_idx {
        Some(idx) => vec![idx],
        None => (0..params.sources.len() as u32).collect(),
    };

    let mut entries = Vec::new();
    for idx in indices {
        for item in SAMPLES
            .prefix((pair.as_str(), idx))
            .range(deps.storage, None, None, Order::Descending)
            .take(limit)
        {
            let (height, sample) = item?;
            entries.push(PriceEntry {
                source_idx: idx,
                height,
                sample,
            });
        }
    }
    entries.sort_by(|a, b| {
        b.height
            .cmp(&a.height)
            .then_with(|| a.source_idx.cmp(&b.source_idx))
    });
    entries.truncate(limit);
    Ok(to_json_binary(&PricesResponse { entries })?)
}

pub fn query_current_epoch(deps: Deps, identifier: String) -> ContractResult<Binary> {
    Ok(to_json_binary(&load_epoch(deps.storage, &identifier)?)?)
}

pub fn query_epoch_infos(deps: Deps) -> ContractResult<Binary> {
    let epochs = EPOCHS
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, e)| e).map_err(ContractError::Std))
        .collect::<ContractResult<Vec<_>>>()?;
    Ok(to_json_binary(&EpochInfosResponse { epochs })?)
}

pub fn query_certificates(deps: Deps, owner: String) -> ContractResult<Binary> {
    let owner = deps.api.addr_validate(&owner)?;
    let certificates = CERTIFICATES
        .prefix(&owner)
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, c)| c).map_err(ContractError::Std))
        .collect::<ContractResult<Vec<_>>>()?;
    Ok(to_json_binary(&CertificatesResponse { certificates })?)
}

pub fn query_provider(deps: Deps, owner: String) -> ContractResult<Binary> {
    let owner = deps.api.addr_validate(&owner)?;
    let provider = PROVIDERS
        .may_load(deps.storage, &owner)?
        .ok_or_else(|| ContractError::not_found("provider", owner.as_str()))?;
    Ok(to_json_binary(&provider)?)
}

pub fn query_providers(
    deps: Deps,
    start_after: Option<String>,
    limit: Option<u32>,
) -> ContractResult<Binary> {
    let start = start_after
        .map(|s| deps.api.addr_validate(&s))
        .transpose()?;
    let providers = PROVIDERS
        .range(
            deps.storage,
            start.map(|a| Bound::ExclusiveRaw(a.as_bytes().to_vec())),
            None,
            Order::Ascending,
        )
        .take(page_limit(limit))
        .map(|item| item.map(|(_, p)| p).map_err(ContractError::Std))
        .collect::<ContractResult<Vec<_>>>()?;
    Ok(to_json_binary(&ProvidersResponse { providers })?)
}

pub fn query_audited_providers(
    deps: Deps,
    owner: String,
    auditor: Option<String>,
) -> ContractResult<Binary> {
    let owner = deps.api.addr_validate(&owner)?;
    let records = match auditor {
        Some(auditor) => {
            let auditor = deps.api.addr_validate(&auditor)?;
            AUDITED_ATTRIBUTES
                .may_load(deps.storage, (&owner, &auditor))?
                .into_iter()
                .collect()
        }
        None => AUDITED_ATTRIBUTES
            .prefix(&owner)
            .range(deps.storage, None, None, Order::Ascending)
            .map(|item| item.map(|(_, r)| r).map_err(ContractError::Std))
            .collect::<ContractResult<Vec<_>>>()?,
    };
    Ok(to_json_binary(&AuditedProvidersResponse { records })?)
}
