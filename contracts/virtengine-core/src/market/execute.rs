use cosmwasm_std::{
    Addr, Binary, Coin, CosmosMsg, DepsMut, Env, Event, MessageInfo, Response, Storage,
};

use crate::coins::{DecCoin, DecCoins};
use crate::error::{ContractError, ContractResult};
use crate::escrow::execute as escrow_ops;
use crate::escrow::state::DepositSource;
use crate::events;
use crate::gates::cert::has_valid_certificate;
use crate::gates::provider::PROVIDERS;
use crate::ids::{AccountId, AccountScope, BidId, DeploymentId, GroupId, LeaseId, OrderId};
use crate::market::matching::{pick_winner, provider_matches};
use crate::market::state::{
    bids_on_order, groups_of, live_lease_of_group, load_bid, load_deployment, load_group,
    load_lease, load_order, open_order_of_group, Bid, BidState, Deployment, DeploymentState,
    Group, GroupSpec, GroupState, Lease, LeaseClosedReason, LeaseState, Order, OrderState,
    ResourceOffer, BIDS, DEPLOYMENTS, GROUPS, LEASES, NEXT_BSEQ, ORDERS,
};
use crate::params::{TakeParams, MARKET_PARAMS, TAKE_PARAMS};

/// Deposit check shared by deployments and bids: all denoms must be
/// acceptable and at least one must meet its configured minimum.
fn check_deposit(funds: &[Coin], minimums: &[Coin]) -> ContractResult<()> {
    if funds.is_empty() {
        return Err(ContractError::NoFundsSent);
    }
    for coin in funds {
        if !minimums.iter().any(|m| m.denom == coin.denom) {
            return Err(ContractError::InvalidDenom {
                denom: coin.denom.clone(),
                reason: "not an accepted deposit denom".to_string(),
            });
        }
    }
    let satisfied = funds
        .iter()
        .any(|c| minimums.iter().any(|m| m.denom == c.denom && c.amount >= m.amount));
    if !satisfied {
        let fmt = |coins: &[Coin]| {
            coins
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        return Err(ContractError::InsufficientDeposit {
            required: fmt(minimums),
            provided: fmt(funds),
        });
    }
    Ok(())
}

/// Spawn the group's next order; its oseq is the count of leases ever
/// closed on the group plus one.
fn spawn_order(storage: &mut dyn Storage, group: &Group, height: u64) -> ContractResult<Event> {
    let id = OrderId::new(&group.id, group.leases_closed + 1);
    let order = Order {
        id: id.clone(),
        state: OrderState::Open,
        created_at: height,
    };
    ORDERS.save(storage, id.key().as_str(), &order)?;
    Ok(events::order_created(&id))
}

pub fn execute_create_deployment(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    dseq: u64,
    groups: Vec<GroupSpec>,
    hash: Binary,
) -> ContractResult<Response> {
    let params = MARKET_PARAMS.load(deps.storage)?;
    let id = DeploymentId::new(info.sender.clone(), dseq);
    if DEPLOYMENTS
        .may_load(deps.storage, id.key().as_str())?
        .is_some()
    {
        return Err(ContractError::already_exists("deployment", id.to_string()));
    }
    if groups.is_empty() {
        return Err(ContractError::EmptyValue {
            kind: "groups".to_string(),
        });
    }
    for spec in &groups {
        spec.validate()?;
    }
    if params.require_certificate && !has_valid_certificate(deps.storage, &info.sender)? {
        return Err(ContractError::CertificateRequired);
    }
    check_deposit(&info.funds, &params.min_deposit)?;

    let height = env.block.height;
    let deployment = Deployment {
        id: id.clone(),
        state: DeploymentState::Active,
        hash,
        created_at: height,
    };
    DEPLOYMENTS.save(deps.storage, id.key().as_str(), &deployment)?;

    let mut response = Response::new()
        .add_attribute("action", "create_deployment")
        .add_event(events::deployment_created(&id));

    for (idx, spec) in groups.into_iter().enumerate() {
        let group_id = GroupId::new(&id, idx as u32 + 1);
        let group = Group {
            id: group_id.clone(),
            state: GroupState::Open,
            spec,
            created_at: height,
            paused_at: None,
            leases_closed: 0,
        };
        GROUPS.save(deps.storage, group_id.key().as_str(), &group)?;
        response = response.add_event(events::group_started(&group_id));
        let order_event = spawn_order(deps.storage, &group, height)?;
        response = response.add_event(order_event);
    }

    let account = AccountId::for_deployment(&id);
    escrow_ops::account_create(
        deps.storage,
        &account,
        &info.sender,
        &info.sender,
        &info.funds,
        DepositSource::Balance,
        true,
        height,
    )?;
    let deposit = DecCoins::from_coins(&info.funds)?;
    Ok(response.add_event(events::account_created(&account, &deposit)))
}

pub fn execute_update_deployment(
    deps: DepsMut,
    info: MessageInfo,
    dseq: u64,
    hash: Binary,
) -> ContractResult<Response> {
    let id = DeploymentId::new(info.sender.clone(), dseq);
    let mut deployment = load_deployment(deps.storage, &id)?;
    if deployment.state != DeploymentState::Active {
        return Err(ContractError::invalid_state(
            "deployment",
            id.to_string(),
            deployment.state,
        ));
    }
    deployment.hash = hash;
    DEPLOYMENTS.save(deps.storage, id.key().as_str(), &deployment)?;

    Ok(Response::new()
        .add_attribute("action", "update_deployment")
        .add_event(events::deployment_updated(&id)))
}

/// Close one group: its open order (refunding open bids) or its live lease,
/// then the group record itself.
fn close_group_internal(
    storage: &mut dyn Storage,
    take: &TakeParams,
    group: &mut Group,
    reason: LeaseClosedReason,
    height: u64,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let mut msgs = Vec::new();
    let mut out = Vec::new();

    if let Some(lease) = live_lease_of_group(storage, &group.id)? {
        let (lease_msgs, lease_events) =
            close_lease_internal(storage, take, &lease.id, reason, height, false)?;
        msgs.extend(lease_msgs);
        out.extend(lease_events);
    } else if let Some(mut order) = open_order_of_group(storage, &group.id)? {
        let (bid_msgs, bid_events) =
            close_open_bids(storage, take, &order.id, BidState::Closed, None, height)?;
        msgs.extend(bid_msgs);
        out.extend(bid_events);
        order.state = OrderState::Closed;
        ORDERS.save(storage, order.id.key().as_str(), &order)?;
        out.push(events::order_closed(&order.id));
    }

    // closing the lease above already rewrote the group record
    let mut fresh = load_group(storage, &group.id)?;
    fresh.state = GroupState::Closed;
    fresh.paused_at = None;
    GROUPS.save(storage, fresh.id.key().as_str(), &fresh)?;
    out.push(events::group_closed(&fresh.id));
    *group = fresh;
    Ok((msgs, out))
}

pub fn execute_close_deployment(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    dseq: u64,
) -> ContractResult<Response> {
    let take = TAKE_PARAMS.load(deps.storage)?;
    let id = DeploymentId::new(info.sender.clone(), dseq);
    let mut deployment = load_deployment(deps.storage, &id)?;
    if deployment.state != DeploymentState::Active {
        return Err(ContractError::invalid_state(
            "deployment",
            id.to_string(),
            deployment.state,
        ));
    }
    let height = env.block.height;

    let mut response = Response::new().add_attribute("action", "close_deployment");
    for mut group in groups_of(deps.storage, &id)? {
        if group.state == GroupState::Closed {
            continue;
        }
        let (msgs, group_events) = close_group_internal(
            deps.storage,
            &take,
            &mut group,
            LeaseClosedReason::Owner,
            height,
        )?;
        response = response.add_messages(msgs).add_events(group_events);
    }

    let account = AccountId::for_deployment(&id);
    let closed = escrow_ops::account_close(deps.storage, &take, &account, height)?;
    response = response.add_messages(closed.msgs).add_events(closed.events);

    deployment.state = DeploymentState::Closed;
    DEPLOYMENTS.save(deps.storage, id.key().as_str(), &deployment)?;
    Ok(response.add_event(events::deployment_closed(&id)))
}

pub fn execute_pause_group(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    dseq: u64,
    gseq: u32,
) -> ContractResult<Response> {
    let take = TAKE_PARAMS.load(deps.storage)?;
    let id = GroupId {
        owner: info.sender.clone(),
        dseq,
        gseq,
    };
    let mut group = load_group(deps.storage, &id)?;
    if group.state != GroupState::Open {
        return Err(ContractError::invalid_state(
            "group",
            id.to_string(),
            group.state,
        ));
    }
    if live_lease_of_group(deps.storage, &id)?.is_some() {
        return Err(ContractError::invalid_state("group", id.to_string(), "leased"));
    }

    let mut response = Response::new().add_attribute("action", "pause_group");
    if let Some(mut order) = open_order_of_group(deps.storage, &id)? {
        let (msgs, bid_events) = close_open_bids(
            deps.storage,
            &take,
            &order.id,
            BidState::Closed,
            None,
            env.block.height,
        )?;
        response = response.add_messages(msgs).add_events(bid_events);
        order.state = OrderState::Closed;
        ORDERS.save(deps.storage, order.id.key().as_str(), &order)?;
        response = response.add_event(events::order_closed(&order.id));
    }

    group.state = GroupState::Paused;
    GROUPS.save(deps.storage, id.key().as_str(), &group)?;
    Ok(response.add_event(events::group_paused(&id, "owner")))
}

pub fn execute_start_group(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    dseq: u64,
    gseq: u32,
) -> ContractResult<Response> {
    let id = GroupId {
        owner: info.sender.clone(),
        dseq,
        gseq,
    };
    let mut group = load_group(deps.storage, &id)?;
    if group.state != GroupState::Paused {
        return Err(ContractError::invalid_state(
            "group",
            id.to_string(),
            group.state,
        ));
    }

    group.state = GroupState::Open;
    let order_event = spawn_order(deps.storage, &group, env.block.height)?;
    GROUPS.save(deps.storage, id.key().as_str(), &group)?;

    Ok(Response::new()
        .add_attribute("action", "start_group")
        .add_event(events::group_started(&id))
        .add_event(order_event))
}

pub fn execute_close_group(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    dseq: u64,
    gseq: u32,
) -> ContractResult<Response> {
    let take = TAKE_PARAMS.load(deps.storage)?;
    let id = GroupId {
        owner: info.sender.clone(),
        dseq,
        gseq,
    };
    let mut group = load_group(deps.storage, &id)?;
    if group.state == GroupState::Closed {
        return Err(ContractError::invalid_state(
            "group",
            id.to_string(),
            group.state,
        ));
    }

    let (msgs, group_events) = close_group_internal(
        deps.storage,
        &take,
        &mut group,
        LeaseClosedReason::Owner,
        env.block.height,
    )?;
    Ok(Response::new()
        .add_attribute("action", "close_group")
        .add_messages(msgs)
        .add_events(group_events))
}

pub fn execute_create_bid(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    order_id: OrderId,
    price: DecCoin,
    resources_offer: Vec<ResourceOffer>,
) -> ContractResult<Response> {
    let params = MARKET_PARAMS.load(deps.storage)?;
    let order = load_order(deps.storage, &order_id)?;
    if order.state != OrderState::Open {
        return Err(ContractError::invalid_state(
            "order",
            order_id.to_string(),
            order.state,
        ));
    }

    let provider = PROVIDERS
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| ContractError::not_found("provider", info.sender.as_str()))?;
    let group = load_group(deps.storage, &order_id.group())?;
    if !provider_matches(deps.storage, &provider, &group.spec.requirements)? {
        return Err(ContractError::AttributesNotSatisfied {
            provider: info.sender.to_string(),
        });
    }

    if !price.is_positive() {
        return Err(ContractError::NonPositiveAmount {
            kind: "bid price".to_string(),
        });
    }
    let group_rate = group.spec.rate()?;
    let ceiling = group_rate.amount_of(&price.denom);
    if ceiling.is_zero() || price.amount > ceiling {
        return Err(ContractError::InvalidConfig {
            input: "bid price".to_string(),
            reason: format!("exceeds the group price of {ceiling}{}", price.denom),
        });
    }

    check_deposit(&info.funds, &params.bid_min_deposit)?;

    let open_bids = bids_on_order(deps.storage, &order_id)?
        .into_iter()
        .filter(|b| b.state == BidState::Open)
        .count() as u32;
    if open_bids >= params.order_max_bids {
        return Err(ContractError::BidLimitReached {
            max: params.order_max_bids,
        });
    }

    let bseq_key = format!("{}/{}", order_id.key(), info.sender);
    let bseq = NEXT_BSEQ
        .may_load(deps.storage, bseq_key.as_str())?
        .unwrap_or(1);
    NEXT_BSEQ.save(deps.storage, bseq_key.as_str(), &(bseq + 1))?;

    let height = env.block.height;
    let bid_id = BidId::new(&order_id, info.sender.clone(), bseq);
    let bid = Bid {
        id: bid_id.clone(),
        state: BidState::Open,
        price: price.clone(),
        resources_offer,
        created_at: height,
    };
    BIDS.save(deps.storage, bid_id.key().as_str(), &bid)?;

    let account = AccountId::for_bid(&bid_id);
    escrow_ops::account_create(
        deps.storage,
        &account,
        &info.sender,
        &info.sender,
        &info.funds,
        DepositSource::Balance,
        true,
        height,
    )?;

    let mut response = Response::new()
        .add_attribute("action", "create_bid")
        .add_event(events::bid_created(&bid_id, &price.to_string()));

    // optional auto-match once the collection window saturates
    if params.auto_match_bids && open_bids + 1 == params.order_max_bids {
        let bids = bids_on_order(deps.storage, &order_id)?;
        let winner = pick_winner(&bids).map(|w| w.id.clone());
        if let Some(winner_id) = winner {
            let take = TAKE_PARAMS.load(deps.storage)?;
            let (msgs, match_events) =
                create_lease_internal(deps.storage, &take, &winner_id, height)?;
            response = response.add_messages(msgs).add_events(match_events);
        }
    }
    Ok(response)
}

pub fn execute_close_bid(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    order_id: OrderId,
    bseq: u32,
) -> ContractResult<Response> {
    let take = TAKE_PARAMS.load(deps.storage)?;
    let bid_id = BidId::new(&order_id, info.sender.clone(), bseq);
    let bid = load_bid(deps.storage, &bid_id)?;
    let height = env.block.height;

    match bid.state {
        BidState::Open => {
            let mut bid = bid;
            bid.state = BidState::Closed;
            BIDS.save(deps.storage, bid_id.key().as_str(), &bid)?;
            let account = AccountId::for_bid(&bid_id);
            let closed = escrow_ops::account_close(deps.storage, &take, &account, height)?;
            Ok(Response::new()
                .add_attribute("action", "close_bid")
                .add_messages(closed.msgs)
                .add_events(closed.events)
                .add_event(events::bid_closed(&bid_id, "closed")))
        }
        BidState::Active => {
            let (msgs, lease_events) = close_lease_internal(
                deps.storage,
                &take,
                &bid_id,
                LeaseClosedReason::Decommission,
                height,
                true,
            )?;
            Ok(Response::new()
                .add_attribute("action", "close_bid")
                .add_messages(msgs)
                .add_events(lease_events))
        }
        state => Err(ContractError::invalid_state(
            "bid",
            bid_id.to_string(),
            state,
        )),
    }
}

pub fn execute_create_lease(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    bid_id: BidId,
) -> ContractResult<Response> {
    if bid_id.owner != info.sender {
        return Err(ContractError::Unauthorized);
    }
    let take = TAKE_PARAMS.load(deps.storage)?;
    let (msgs, lease_events) =
        create_lease_internal(deps.storage, &take, &bid_id, env.block.height)?;
    Ok(Response::new()
        .add_attribute("action", "create_lease")
        .add_messages(msgs)
        .add_events(lease_events))
}

/// Match a bid: the chosen bid becomes the lease, every other open bid on
/// the order is lost and refunded, the order turns active, and a payment at
/// the bid price starts drawing from the deployment's escrow account.
fn create_lease_internal(
    storage: &mut dyn Storage,
    take: &TakeParams,
    bid_id: &BidId,
    height: u64,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let mut bid = load_bid(storage, bid_id)?;
    if bid.state != BidState::Open {
        return Err(ContractError::invalid_state(
            "bid",
            bid_id.to_string(),
            bid.state,
        ));
    }
    let order_id = bid_id.order();
    let mut order = load_order(storage, &order_id)?;
    if order.state != OrderState::Open {
        return Err(ContractError::invalid_state(
            "order",
            order_id.to_string(),
            order.state,
        ));
    }
    let group = load_group(storage, &order_id.group())?;
    if group.state != GroupState::Open {
        return Err(ContractError::invalid_state(
            "group",
            group.id.to_string(),
            group.state,
        ));
    }

    let account = AccountId::for_deployment(&bid_id.deployment());
    let rate = DecCoins::from(vec![bid.price.clone()]);
    escrow_ops::payment_create(
        storage,
        &account,
        &bid_id.payment_xid(),
        &bid_id.provider,
        rate,
        height,
    )?;

    bid.state = BidState::Active;
    BIDS.save(storage, bid_id.key().as_str(), &bid)?;
    order.state = OrderState::Active;
    ORDERS.save(storage, order_id.key().as_str(), &order)?;

    let (mut msgs, mut out) = close_open_bids(
        storage,
        take,
        &order_id,
        BidState::Lost,
        Some(bid_id),
        height,
    )?;

    let lease = Lease {
        id: bid_id.clone(),
        state: LeaseState::Active,
        price: bid.price.clone(),
        created_at: height,
        closed_on: None,
        reason: None,
    };
    LEASES.save(storage, bid_id.key().as_str(), &lease)?;
    out.push(events::lease_created(bid_id, &bid.price.to_string()));

    Ok((msgs, out))
}

/// Transition every open bid on the order (except `keep`) to `to_state`,
/// closing and refunding its escrow account.
fn close_open_bids(
    storage: &mut dyn Storage,
    take: &TakeParams,
    order_id: &OrderId,
    to_state: BidState,
    keep: Option<&BidId>,
    height: u64,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let mut msgs = Vec::new();
    let mut out = Vec::new();
    for mut bid in bids_on_order(storage, order_id)? {
        if bid.state != BidState::Open {
            continue;
        }
        if keep.map(|k| k == &bid.id).unwrap_or(false) {
            continue;
        }
        bid.state = to_state;
        BIDS.save(storage, bid.id.key().as_str(), &bid)?;
        let account = AccountId::for_bid(&bid.id);
        let closed = escrow_ops::account_close(storage, take, &account, height)?;
        msgs.extend(closed.msgs);
        out.extend(closed.events);
        out.push(events::bid_closed(&bid.id, &to_state.to_string()));
    }
    Ok((msgs, out))
}

pub fn execute_close_lease(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    lease_id: LeaseId,
    reason: Option<LeaseClosedReason>,
) -> ContractResult<Response> {
    let reason = if info.sender == lease_id.owner {
        reason.unwrap_or(LeaseClosedReason::Owner)
    } else if info.sender == lease_id.provider {
        match reason {
            None => LeaseClosedReason::Decommission,
            Some(
                r @ (LeaseClosedReason::Decommission
                | LeaseClosedReason::Unstable
                | LeaseClosedReason::ManifestTimeout),
            ) => r,
            Some(_) => return Err(ContractError::Unauthorized),
        }
    } else {
        return Err(ContractError::Unauthorized);
    };

    let take = TAKE_PARAMS.load(deps.storage)?;
    let (msgs, lease_events) = close_lease_internal(
        deps.storage,
        &take,
        &lease_id,
        reason,
        env.block.height,
        true,
    )?;
    Ok(Response::new()
        .add_attribute("action", "close_lease")
        .add_messages(msgs)
        .add_events(lease_events))
}

pub fn execute_withdraw_lease(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    lease_id: LeaseId,
) -> ContractResult<Response> {
    if info.sender != lease_id.provider {
        return Err(ContractError::Unauthorized);
    }
    let lease = load_lease(deps.storage, &lease_id)?;
    if lease.state == LeaseState::Closed {
        return Err(ContractError::invalid_state(
            "lease",
            lease_id.to_string(),
            lease.state,
        ));
    }

    let take = TAKE_PARAMS.load(deps.storage)?;
    let account = AccountId::for_deployment(&lease_id.deployment());
    let outcome = escrow_ops::payment_withdraw(
        deps.storage,
        &take,
        &account,
        &lease_id.payment_xid(),
        env.block.height,
    )?;

    Ok(Response::new()
        .add_attribute("action", "withdraw_lease")
        .add_messages(outcome.msgs)
        .add_event(events::payment_withdrawn(
            &account,
            &lease_id.payment_xid(),
            &outcome.withdrawn,
            &outcome.take,
        )))
}

/// Close a lease and its payment, bid, and order. When the group stays open
/// and `respawn` is set, the next order spawns in the same transition.
pub fn close_lease_internal(
    storage: &mut dyn Storage,
    take: &TakeParams,
    lease_id: &LeaseId,
    reason: LeaseClosedReason,
    height: u64,
    respawn: bool,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let mut lease = load_lease(storage, lease_id)?;
    if lease.state == LeaseState::Closed {
        return Err(ContractError::invalid_state(
            "lease",
            lease_id.to_string(),
            lease.state,
        ));
    }

    let mut msgs = Vec::new();
    let mut out = Vec::new();

    let account = AccountId::for_deployment(&lease_id.deployment());
    let payout = escrow_ops::payment_payout_and_close(
        storage,
        take,
        &account,
        &lease_id.payment_xid(),
        height,
    )?;
    if !payout.withdrawn.is_empty() {
        out.push(events::payment_withdrawn(
            &account,
            &lease_id.payment_xid(),
            &payout.withdrawn,
            &payout.take,
        ));
    }
    msgs.extend(payout.msgs);

    lease.state = LeaseState::Closed;
    lease.closed_on = Some(height);
    lease.reason = Some(reason);
    LEASES.save(storage, lease_id.key().as_str(), &lease)?;
    out.push(events::lease_closed(lease_id, &reason.to_string()));

    let mut bid = load_bid(storage, lease_id)?;
    bid.state = BidState::Closed;
    BIDS.save(storage, lease_id.key().as_str(), &bid)?;
    let bid_account = AccountId::for_bid(lease_id);
    let closed = escrow_ops::account_close(storage, take, &bid_account, height)?;
    msgs.extend(closed.msgs);
    out.extend(closed.events);
    out.push(events::bid_closed(lease_id, "closed"));

    let order_id = lease_id.order();
    let mut order = load_order(storage, &order_id)?;
    order.state = OrderState::Closed;
    ORDERS.save(storage, order_id.key().as_str(), &order)?;
    out.push(events::order_closed(&order_id));

    let mut group = load_group(storage, &order_id.group())?;
    group.leases_closed += 1;
    if respawn && group.state == GroupState::Open {
        out.push(spawn_order(storage, &group, height)?);
    }
    GROUPS.save(storage, group.id.key().as_str(), &group)?;

    Ok((msgs, out))
}

/// Escrow hook: the deployment account ran dry. Pause its groups and mark
/// its live leases insufficient-funds until a deposit reopens the account
/// or the grace elapses.
pub fn on_account_overdrawn(
    storage: &mut dyn Storage,
    account: &AccountId,
    height: u64,
) -> ContractResult<Vec<Event>> {
    let AccountScope::Deployment = account.scope else {
        return Ok(vec![]);
    };
    let Some(deployment_id) = DeploymentId::from_key(&account.xid) else {
        return Ok(vec![]);
    };

    let mut out = vec![events::account_overdrawn(account)];
    for mut lease in leases_live(storage, &deployment_id)? {
        if lease.state != LeaseState::Active {
            continue;
        }
        lease.state = LeaseState::InsufficientFunds;
        LEASES.save(storage, lease.id.key().as_str(), &lease)?;

        let mut group = load_group(storage, &lease.id.group())?;
        if group.state == GroupState::Open {
            group.state = GroupState::InsufficientFunds;
            group.paused_at = Some(height);
            GROUPS.save(storage, group.id.key().as_str(), &group)?;
            out.push(events::group_paused(&group.id, "insufficient_funds"));
        }
    }
    Ok(out)
}

/// Escrow hook: a deposit brought the account back to open. Resume what the
/// overdraw paused.
pub fn on_account_reopened(
    storage: &mut dyn Storage,
    account: &AccountId,
    _height: u64,
) -> ContractResult<Vec<Event>> {
    let AccountScope::Deployment = account.scope else {
        return Ok(vec![]);
    };
    let Some(deployment_id) = DeploymentId::from_key(&account.xid) else {
        return Ok(vec![]);
    };

    let mut out = Vec::new();
    for mut lease in leases_live(storage, &deployment_id)? {
        if lease.state != LeaseState::InsufficientFunds {
            continue;
        }
        lease.state = LeaseState::Active;
        LEASES.save(storage, lease.id.key().as_str(), &lease)?;

        let mut group = load_group(storage, &lease.id.group())?;
        if group.state == GroupState::InsufficientFunds {
            group.state = GroupState::Open;
            group.paused_at = None;
            GROUPS.save(storage, group.id.key().as_str(), &group)?;
            out.push(events::group_started(&group.id));
        }
    }
    Ok(out)
}

fn leases_live(
    storage: &dyn Storage,
    deployment: &DeploymentId,
) -> ContractResult<Vec<Lease>> {
    Ok(
        crate::market::state::leases_of_deployment(storage, deployment)?
            .into_iter()
            .filter(|l| l.state != LeaseState::Closed)
            .collect(),
    )
}

/// Scheduler pass: force-close leases whose insufficient-funds grace has
/// elapsed, closing their group (and the deployment once all groups are
/// closed).
pub fn close_expired_grace(
    storage: &mut dyn Storage,
    take: &TakeParams,
    grace_blocks: u64,
    height: u64,
) -> ContractResult<(Vec<CosmosMsg>, Vec<Event>)> {
    let expired: Vec<Group> = GROUPS
        .range(storage, None, None, cosmwasm_std::Order::Ascending)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(_, g)| g)
        .filter(|g| {
            g.state == GroupState::InsufficientFunds
                && g.paused_at
                    .map(|p| height.saturating_sub(p) > grace_blocks)
                    .unwrap_or(false)
        })
        .collect();

    let mut msgs = Vec::new();
    let mut out = Vec::new();
    for mut group in expired {
        let (group_msgs, group_events) = close_group_internal(
            storage,
            take,
            &mut group,
            LeaseClosedReason::InsufficientFunds,
            height,
        )?;
        msgs.extend(group_msgs);
        out.extend(group_events);

        // a deployment whose groups have all closed closes too, escrow included
        let deployment_id = group.id.deployment();
        let all_closed = groups_of(storage, &deployment_id)?
            .iter()
            .all(|g| g.state == GroupState::Closed);
        if all_closed {
            let mut deployment = load_deployment(storage, &deployment_id)?;
            if deployment.state == DeploymentState::Active {
                let account = AccountId::for_deployment(&deployment_id);
                let closed = escrow_ops::account_close(storage, take, &account, height)?;
                msgs.extend(closed.msgs);
                out.extend(closed.events);
                deployment.state = DeploymentState::Closed;
                DEPLOYMENTS.save(storage, deployment_id.key().as_str(), &deployment)?;
                out.push(events::deployment_closed(&deployment_id));
            }
        }
    }
    Ok((msgs, out))
}

/// Provider deletion is gated on marketplace quiescence: no live bids or
/// leases may reference the provider.
pub fn provider_is_quiescent(storage: &dyn Storage, provider: &Addr) -> ContractResult<bool> {
    for item in BIDS.range(storage, None, None, cosmwasm_std::Order::Ascending) {
        let (_, bid) = item?;
        if &bid.id.provider == provider
            && matches!(bid.state, BidState::Open | BidState::Active)
        {
            return Ok(false);
        }
    }
    Ok(true)
}
