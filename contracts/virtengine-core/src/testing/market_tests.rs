use cosmwasm_std::testing::message_info;
use cosmwasm_std::{from_json, Binary, Coin};

use crate::contract::{execute, query};
use crate::error::ContractError;
use crate::escrow::state::{AccountState, ACCOUNTS};
use crate::gates::Attribute;
use crate::ids::{AccountId, DeploymentId};
use crate::market::state::{
    BidState, GroupState, LeaseState, OrderState, PlacementRequirements, SignedBy,
};
use crate::msg::{BidsResponse, ExecuteMsg, GroupsResponse, OrdersResponse, QueryMsg};
use crate::params::MARKET_PARAMS;
use crate::testing::helpers::*;

#[test]
fn create_deployment_spawns_groups_orders_and_escrow() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");

    let response = create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    assert!(has_event(&response, "deployment_created"));
    assert!(has_event(&response, "group_started"));
    assert!(has_event(&response, "order_created"));
    assert!(has_event(&response, "escrow_account_created"));

    let groups: GroupsResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Groups {
                owner: owner.to_string(),
                dseq: 1,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(groups.groups.len(), 1);
    assert_eq!(groups.groups[0].state, GroupState::Open);

    let orders: OrdersResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Orders {
                owner: Some(owner.to_string()),
                state: Some(OrderState::Open),
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(orders.orders.len(), 1);
    assert_eq!(orders.orders[0].id.oseq, 1);

    let account = AccountId::for_deployment(&DeploymentId::new(owner.clone(), 1));
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Open);

    // duplicate dseq rejected
    let err = create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap_err();
    assert!(matches!(err, ContractError::AlreadyExists { .. }));
}

#[test]
fn deployment_deposit_must_meet_minimum() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let err = create_deployment(&mut deps, &env, &owner, 1, "10", 99).unwrap_err();
    assert!(matches!(err, ContractError::InsufficientDeposit { .. }));
}

#[test]
fn bid_requires_registered_matching_provider() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");

    // the order demands an audited region attribute
    let auditor = deps.api.addr_make("auditor");
    let mut spec = group_spec("10");
    spec.requirements = PlacementRequirements {
        signed_by: SignedBy {
            all_of: vec![auditor.to_string()],
            any_of: vec![],
        },
        attributes: vec![Attribute::new("region", "eu-west")],
    };
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[Coin::new(1_000u128, MARKET_DENOM)]),
        ExecuteMsg::CreateDeployment {
            dseq: 1,
            groups: vec![spec],
            hash: Binary::default(),
        },
    )
    .unwrap();

    // unregistered provider
    let err = place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap_err();
    assert!(matches!(err, ContractError::NotFound { .. }));

    // registered but unaudited
    register_provider_with(
        &mut deps,
        &env,
        &provider,
        vec![Attribute::new("region", "eu-west")],
    );
    let err = place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap_err();
    assert!(matches!(err, ContractError::AttributesNotSatisfied { .. }));

    // audited by the required auditor
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&auditor, &[]),
        ExecuteMsg::SignProviderAttributes {
            owner: provider.to_string(),
            attributes: vec![Attribute::new("region", "eu-west")],
        },
    )
    .unwrap();
    let response = place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    assert!(has_event(&response, "bid_created"));
}

#[test]
fn bid_price_cannot_exceed_group_rate() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);

    let err = place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10.5", 50).unwrap_err();
    assert!(matches!(err, ContractError::InvalidConfig { .. }));
}

#[test]
fn order_holds_up_to_max_bids() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();

    for i in 0..3 {
        let provider = deps.api.addr_make(&format!("provider{i}"));
        register_provider(&mut deps, &env, &provider);
        place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    }
    let overflow = deps.api.addr_make("provider-late");
    register_provider(&mut deps, &env, &overflow);
    let err = place_bid(&mut deps, &env, order_ref(&owner, 1), &overflow, "8", 50).unwrap_err();
    assert_eq!(err, ContractError::BidLimitReached { max: 3 });
}

#[test]
fn bseq_increments_per_provider() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);

    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "8", 50).unwrap();

    let bids: BidsResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Bids {
                owner: Some(owner.to_string()),
                provider: Some(provider.to_string()),
                state: None,
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    let bseqs: Vec<u32> = bids.bids.iter().map(|b| b.id.bseq).collect();
    assert_eq!(bseqs, vec![1, 2]);
}

#[test]
fn lease_matching_closes_losing_bids_with_refunds() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();

    let winner = deps.api.addr_make("winner");
    let loser = deps.api.addr_make("loser");
    for provider in [&winner, &loser] {
        register_provider(&mut deps, &env, provider);
        place_bid(&mut deps, &env, order_ref(&owner, 1), provider, "9", 50).unwrap();
    }

    let response = make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &winner, 1)).unwrap();
    assert!(has_event(&response, "lease_created"));
    // the loser's escrow refund rides on the same transition
    assert!(!response.messages.is_empty());

    let bids: BidsResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Bids {
                owner: Some(owner.to_string()),
                provider: None,
                state: None,
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    let mut states: Vec<BidState> = bids.bids.iter().map(|b| b.state).collect();
    states.sort_by_key(|s| format!("{s}"));
    assert_eq!(states, vec![BidState::Active, BidState::Lost]);

    // only the order owner may match
    let err = make_lease(&mut deps, &env, &loser, bid_ref(&owner, 1, 1, &winner, 1)).unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);
}

#[test]
fn closing_a_lease_spawns_the_next_order() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CloseLease {
            lease: bid_ref(&owner, 1, 1, &provider, 1),
            reason: None,
        },
    )
    .unwrap();
    assert_eq!(
        event_attr(&response, "lease_closed", "reason"),
        Some("owner")
    );
    assert!(has_event(&response, "order_created"));

    let orders: OrdersResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Orders {
                owner: Some(owner.to_string()),
                state: Some(OrderState::Open),
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(orders.orders.len(), 1);
    assert_eq!(orders.orders[0].id.oseq, 2, "oseq = closed leases + 1");
}

#[test]
fn provider_closes_via_close_bid() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&provider, &[]),
        ExecuteMsg::CloseBid {
            order: order_ref(&owner, 1),
            bseq: 1,
        },
    )
    .unwrap();
    assert_eq!(
        event_attr(&response, "lease_closed", "reason"),
        Some("decommission")
    );
}

#[test]
fn pause_and_start_group() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();

    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::PauseGroup { dseq: 1, gseq: 1 },
    )
    .unwrap();
    assert!(has_event(&response, "group_paused"));
    assert!(has_event(&response, "order_closed"));

    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::StartGroup { dseq: 1, gseq: 1 },
    )
    .unwrap();
    assert!(has_event(&response, "group_started"));
    assert!(has_event(&response, "order_created"));
}

#[test]
fn pausing_a_leased_group_is_rejected() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    let err = execute(
        deps.as_mut(),
        env,
        message_info(&owner, &[]),
        ExecuteMsg::PauseGroup { dseq: 1, gseq: 1 },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InvalidState { .. }));
}

#[test]
fn close_deployment_cascades_and_closes_escrow() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "9", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CloseDeployment { dseq: 1 },
    )
    .unwrap();
    assert!(has_event(&response, "deployment_closed"));
    assert!(has_event(&response, "lease_closed"));
    assert!(has_event(&response, "group_closed"));
    assert!(has_event(&response, "escrow_account_closed"));
    // deposit refund goes back to the owner
    assert!(!response.messages.is_empty());

    let account = AccountId::for_deployment(&DeploymentId::new(owner.clone(), 1));
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Closed);

    // leases are gone too
    let lease = crate::market::state::load_lease(
        &deps.storage,
        &bid_ref(&owner, 1, 1, &provider, 1).to_id(&deps.api).unwrap(),
    )
    .unwrap();
    assert_eq!(lease.state, LeaseState::Closed);
}

#[test]
fn certificate_gate_applies_when_required() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");

    let mut params = MARKET_PARAMS.load(&deps.storage).unwrap();
    params.require_certificate = true;
    execute_as_authority(
        &mut deps,
        &env,
        &[],
        ExecuteMsg::UpdateMarketParams { params },
    )
    .unwrap();

    let err = create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap_err();
    assert_eq!(err, ContractError::CertificateRequired);

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CreateCertificate {
            serial: "1".to_string(),
            cert: Binary::from(b"cert".as_slice()),
            pubkey: Binary::from(b"key".as_slice()),
        },
    )
    .unwrap();
    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
}
