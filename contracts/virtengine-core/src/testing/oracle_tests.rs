use cosmwasm_std::testing::message_info;
use cosmwasm_std::{from_json, Decimal};

use crate::contract::{execute, query};
use crate::error::ContractError;
use crate::msg::{AggregatedPriceResponse, ExecuteMsg, PricesResponse, QueryMsg};
use crate::oracle::aggregate;
use crate::params::ORACLE_PARAMS;
use crate::testing::helpers::*;

fn aggregated(deps: &TestDeps, env: &cosmwasm_std::Env) -> Option<crate::oracle::state::AggregatedPrice> {
    let response: AggregatedPriceResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::AggregatedPrice {
                denom: COLLATERAL.to_string(),
                base_denom: BASE.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    response.price
}

#[test]
fn unauthorized_source_is_rejected() {
    let (mut deps, env) = setup();
    let outsider = deps.api.addr_make("outsider");
    let err = execute(
        deps.as_mut(),
        env,
        message_info(&outsider, &[]),
        ExecuteMsg::AddPriceEntry {
            denom: COLLATERAL.to_string(),
            base_denom: BASE.to_string(),
            price: Decimal::one(),
            timestamp: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::UnknownPriceSource { .. }));
}

#[test]
fn zero_price_is_rejected() {
    let (mut deps, env) = setup();
    let err = feed_price(&mut deps, &env, 0, "0").unwrap_err();
    assert!(matches!(err, ContractError::NonPositiveAmount { .. }));
}

#[test]
fn aggregation_needs_min_sources() {
    let (mut deps, env) = setup();
    assert!(aggregated(&deps, &env).is_none());

    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    assert!(aggregated(&deps, &env).is_none(), "one source is below the minimum");

    feed_price(&mut deps, &env, 1, "1.1").unwrap();
    let price = aggregated(&deps, &env).expect("two sources satisfy the minimum");
    assert_eq!(price.n_sources, 2);
    assert_eq!(price.min, "1".parse::<Decimal>().unwrap());
    assert_eq!(price.max, "1.1".parse::<Decimal>().unwrap());
    // (1.1 - 1.0) / 1.0 in bps
    assert_eq!(price.deviation_bps, 1_000);
    assert!(price.healthy, "deviation sits exactly on the bound");
}

#[test]
fn median_of_three_sources() {
    let (mut deps, env) = setup();
    feed_price(&mut deps, &env, 0, "0.98").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();
    feed_price(&mut deps, &env, 2, "1.01").unwrap();

    let price = aggregated(&deps, &env).unwrap();
    assert_eq!(price.median, "1".parse::<Decimal>().unwrap());
    assert_eq!(price.n_sources, 3);
}

#[test]
fn excessive_deviation_is_unhealthy() {
    let (mut deps, env) = setup();
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.5").unwrap();

    let price = aggregated(&deps, &env).unwrap();
    assert_eq!(price.deviation_bps, 5_000);
    assert!(!price.healthy, "50% spread exceeds the 10% bound");
}

#[test]
fn twap_is_block_weighted_and_bounded() {
    let (mut deps, mut env) = setup();
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();

    env.block.height += 10;
    feed_price(&mut deps, &env, 0, "2.0").unwrap();
    feed_price(&mut deps, &env, 1, "2.0").unwrap();

    env.block.height += 9;
    let price = aggregated(&deps, &env).unwrap();
    // 10 blocks at 1.0, then 10 blocks (inclusive) at 2.0 over a 20 block span
    assert_eq!(price.twap, "1.5".parse::<Decimal>().unwrap());
    // bounded by the prices that fed it
    assert!(price.twap >= "1".parse().unwrap() && price.twap <= "2".parse().unwrap());
}

#[test]
fn last_write_wins_within_a_block() {
    let (mut deps, env) = setup();
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 0, "1.2").unwrap();
    feed_price(&mut deps, &env, 1, "1.2").unwrap();

    let price = aggregated(&deps, &env).unwrap();
    assert_eq!(price.min, "1.2".parse::<Decimal>().unwrap());
    assert_eq!(price.max, "1.2".parse::<Decimal>().unwrap());

    let history: PricesResponse = from_json(
        query(
            deps.as_ref(),
            env,
            QueryMsg::Prices {
                denom: COLLATERAL.to_string(),
                base_denom: BASE.to_string(),
                source_idx: Some(0),
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(history.entries.len(), 1, "same source and block overwrites");
}

#[test]
fn stale_sources_fall_out_of_the_window() {
    let (mut deps, mut env) = setup();
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();
    feed_price(&mut deps, &env, 2, "1.0").unwrap();

    // source 2 goes silent; the others keep reporting
    env.block.height += 21;
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();

    let price = aggregated(&deps, &env).unwrap();
    assert_eq!(price.n_sources, 2, "stale source dropped");

    let params = ORACLE_PARAMS.load(&deps.storage).unwrap();
    let events =
        aggregate::sweep_liveness(&mut deps.storage, &params, COLLATERAL, BASE, env.block.height)
            .unwrap();
    assert!(events.iter().any(|e| e.ty == "price_staled"));

    // a fresh sample recovers the source
    let response = feed_price(&mut deps, &env, 2, "1.0").unwrap();
    assert!(has_event(&response, "price_recovered"));
    let price = aggregated(&deps, &env).unwrap();
    assert_eq!(price.n_sources, 3);
}

#[test]
fn stale_warning_fires_before_the_cutoff() {
    let (mut deps, mut env) = setup();
    feed_price(&mut deps, &env, 0, "1.0").unwrap();

    // staleness bound 20, warning window 5: warn from 15 silent blocks on
    env.block.height += 16;
    let params = ORACLE_PARAMS.load(&deps.storage).unwrap();
    let events =
        aggregate::sweep_liveness(&mut deps.storage, &params, COLLATERAL, BASE, env.block.height)
            .unwrap();
    assert!(events.iter().any(|e| e.ty == "price_stale_warning"));

    // warning fires once
    let events =
        aggregate::sweep_liveness(&mut deps.storage, &params, COLLATERAL, BASE, env.block.height)
            .unwrap();
    assert!(events.is_empty());
}
