use cosmwasm_std::testing::message_info;
use cosmwasm_std::{Coin, Order, SignedDecimal256, Uint128};

use crate::bme::state::{BmeStatus, BME_STATUS, MINT_EPOCHS, PENDING_LEDGER};
use crate::contract::execute;
use crate::epochs::load_epoch;
use crate::escrow::state::{AccountState, DepositSource, ACCOUNTS, PAYMENTS};
use crate::ids::{AccountId, AccountScope, DeploymentId};
use crate::market::state::{load_group, load_lease, GroupState, LeaseClosedReason, LeaseState};
use crate::msg::{AccountRef, ExecuteMsg, OracleParamsMsg, TakeParamsMsg};
use crate::params::{DenomTakeRate, BME_PARAMS, ORACLE_PARAMS};
use crate::testing::helpers::*;

fn deployment_account(owner: &cosmwasm_std::Addr, dseq: u64) -> AccountId {
    AccountId::for_deployment(&DeploymentId::new(owner.clone(), dseq))
}

fn deposit_msg(owner: &cosmwasm_std::Addr, dseq: u64) -> ExecuteMsg {
    ExecuteMsg::AccountDeposit {
        account: AccountRef {
            scope: AccountScope::Deployment,
            owner: owner.to_string(),
            dseq,
            gseq: None,
            oseq: None,
            provider: None,
            bseq: None,
        },
        source: DepositSource::Balance,
        direct: true,
    }
}

/// Narrow the TWAP window so a freshly fed price is the effective price.
fn use_spot_prices(deps: &mut TestDeps, env: &cosmwasm_std::Env) {
    let params = ORACLE_PARAMS.load(&deps.storage).unwrap();
    execute_as_authority(
        deps,
        env,
        &[],
        ExecuteMsg::UpdateOracleParams {
            params: OracleParamsMsg {
                sources: params.sources.iter().map(|s| s.to_string()).collect(),
                twap_window: 1,
                max_price_staleness_blocks: params.max_price_staleness_blocks,
                stale_warning_blocks: params.stale_warning_blocks,
                min_price_sources: params.min_price_sources,
                max_price_deviation_bps: params.max_price_deviation_bps,
            },
        },
    )
    .unwrap();
}

fn feed_both(deps: &mut TestDeps, env: &cosmwasm_std::Env, price: &str) {
    feed_price(deps, env, 0, price).unwrap();
    feed_price(deps, env, 1, price).unwrap();
}

// A fully funded lease drains its deposit exactly over its lifetime.
#[test]
fn single_lease_full_drain() {
    let (mut deps, mut env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");
    let platform = deps.api.addr_make("platform");

    // 4% take so the outbound split is visible
    execute_as_authority(
        &mut deps,
        &env,
        &[],
        ExecuteMsg::UpdateTakeParams {
            params: TakeParamsMsg {
                platform_address: platform.to_string(),
                default_rate_bps: 0,
                denom_rates: vec![DenomTakeRate {
                    denom: MARKET_DENOM.to_string(),
                    rate_bps: 400,
                }],
            },
        },
    )
    .unwrap();

    create_deployment(&mut deps, &env, &owner, 1, "10", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    env.block.height += 100;
    end_block(&mut deps, &env).unwrap();

    let account = deployment_account(&owner, 1);
    let xid = bid_ref(&owner, 1, 1, &provider, 1)
        .to_id(&deps.api)
        .unwrap()
        .payment_xid();
    let payment = PAYMENTS
        .load(&deps.storage, (account.key().as_str(), xid.as_str()))
        .unwrap();
    assert_eq!(payment.balance.amount_of(MARKET_DENOM), "1000".parse::<SignedDecimal256>().unwrap());

    let withdraw = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&provider, &[]),
        ExecuteMsg::WithdrawLease {
            lease: bid_ref(&owner, 1, 1, &provider, 1),
        },
    )
    .unwrap();
    assert_eq!(
        send_amount(&withdraw.messages, &provider, MARKET_DENOM),
        Uint128::new(960)
    );
    assert_eq!(
        send_amount(&withdraw.messages, &platform, MARKET_DENOM),
        Uint128::new(40)
    );

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CloseLease {
            lease: bid_ref(&owner, 1, 1, &provider, 1),
            reason: None,
        },
    )
    .unwrap();
    let close = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CloseDeployment { dseq: 1 },
    )
    .unwrap();

    // account fully drained: no residual refund to the owner
    assert_eq!(
        send_amount(&close.messages, &owner, MARKET_DENOM),
        Uint128::zero()
    );
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Closed);
    assert!(stored.balance.is_empty());
}

// An underfunded account overdraws, pauses its group, and recovers on deposit.
#[test]
fn overdraw_pause_deposit_recovery() {
    let (mut deps, mut env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");

    create_deployment(&mut deps, &env, &owner, 1, "10", 100).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    let account = deployment_account(&owner, 1);
    let lease_id = bid_ref(&owner, 1, 1, &provider, 1).to_id(&deps.api).unwrap();

    // exactly drained, not yet overdrawn
    env.block.height += 10;
    end_block(&mut deps, &env).unwrap();
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Open);
    assert!(stored.balance.is_empty());

    // one block further: overdraw, group pauses
    env.block.height += 1;
    let response = end_block(&mut deps, &env).unwrap();
    assert!(has_event(&response, "escrow_account_overdrawn"));
    assert!(has_event(&response, "group_paused"));
    let lease = load_lease(&deps.storage, &lease_id).unwrap();
    assert_eq!(lease.state, LeaseState::InsufficientFunds);
    let group = load_group(&deps.storage, &lease_id.group()).unwrap();
    assert_eq!(group.state, GroupState::InsufficientFunds);

    // arrears keep growing
    env.block.height += 3;
    end_block(&mut deps, &env).unwrap();
    let xid = lease_id.payment_xid();
    let payment = PAYMENTS
        .load(&deps.storage, (account.key().as_str(), xid.as_str()))
        .unwrap();
    assert_eq!(payment.unsettled.amount_of(MARKET_DENOM), "40".parse::<SignedDecimal256>().unwrap());

    // a deposit absorbs the arrears first and resumes the group
    let response = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[Coin::new(100u128, MARKET_DENOM)]),
        deposit_msg(&owner, 1),
    )
    .unwrap();
    assert!(has_event(&response, "escrow_account_reopened"));
    assert!(has_event(&response, "group_started"));

    let payment = PAYMENTS
        .load(&deps.storage, (account.key().as_str(), xid.as_str()))
        .unwrap();
    assert!(payment.unsettled.is_empty());
    assert_eq!(payment.balance.amount_of(MARKET_DENOM), "140".parse::<SignedDecimal256>().unwrap());
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Open);
    assert_eq!(stored.balance.amount_of(MARKET_DENOM), "60".parse::<SignedDecimal256>().unwrap());
    let lease = load_lease(&deps.storage, &lease_id).unwrap();
    assert_eq!(lease.state, LeaseState::Active);
}

// Grace expiry closes the lease with reason insufficient_funds.
#[test]
fn grace_expiry_forces_closure() {
    let (mut deps, mut env) = setup();
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");

    create_deployment(&mut deps, &env, &owner, 1, "10", 100).unwrap();
    register_provider(&mut deps, &env, &provider);
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10", 50).unwrap();
    make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();

    // overdraw
    env.block.height += 11;
    end_block(&mut deps, &env).unwrap();

    // grace is 10 blocks; cross it
    env.block.height += 11;
    let response = end_block(&mut deps, &env).unwrap();
    assert!(has_event(&response, "lease_closed"));
    assert_eq!(
        event_attr(&response, "lease_closed", "reason"),
        Some("insufficient_funds")
    );
    assert!(has_event(&response, "deployment_closed"));

    let lease_id = bid_ref(&owner, 1, 1, &provider, 1).to_id(&deps.api).unwrap();
    let lease = load_lease(&deps.storage, &lease_id).unwrap();
    assert_eq!(lease.state, LeaseState::Closed);
    assert_eq!(lease.reason, Some(LeaseClosedReason::InsufficientFunds));

    let account = deployment_account(&owner, 1);
    let stored = ACCOUNTS
        .load(&deps.storage, account.key().as_str())
        .unwrap();
    assert_eq!(stored.state, AccountState::Closed);
}

// Auto-matching settles price ties on the lowest bseq.
#[test]
fn auto_match_tie_break() {
    let (mut deps, env) = setup_with(|deps| {
        let mut msg = default_instantiate_msg(deps);
        msg.market.auto_match_bids = true;
        msg
    });
    let owner = deps.api.addr_make("tenant");
    let provider = deps.api.addr_make("provider");

    create_deployment(&mut deps, &env, &owner, 1, "12", 1_000).unwrap();
    register_provider(&mut deps, &env, &provider);

    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "12", 50).unwrap();
    place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10", 50).unwrap();
    // the third bid saturates the window and triggers the match
    let response =
        place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "10", 50).unwrap();
    assert!(has_event(&response, "lease_created"));

    // price tie between bseq 2 and 3: lowest bseq wins
    let winner = bid_ref(&owner, 1, 1, &provider, 2).to_id(&deps.api).unwrap();
    let lease = load_lease(&deps.storage, &winner).unwrap();
    assert_eq!(lease.state, LeaseState::Active);
    assert_eq!(lease.price.amount, "10".parse::<SignedDecimal256>().unwrap());

    // losing bids were refunded in the same transition
    assert_eq!(
        send_amount(&response.messages, &provider, MARKET_DENOM),
        Uint128::new(100)
    );
}

// A falling collateral ratio grows the mint runway, then halts mints outright.
#[test]
fn bme_warning_backoff_and_halt() {
    let (mut deps, mut env) = setup();
    let user = deps.api.addr_make("user");
    use_spot_prices(&mut deps, &env);

    // steeper thresholds and a visible backoff for this scenario
    let mut bme = BME_PARAMS.load(&deps.storage).unwrap();
    bme.warn_threshold_bps = 10_000;
    bme.halt_threshold_bps = 9_000;
    bme.epoch_blocks_backoff_bps = 1_000_000;
    execute_as_authority(&mut deps, &env, &[], ExecuteMsg::UpdateBmeParams { params: bme })
        .unwrap();

    // vault 1000, outstanding 950 at price 1.00: ratio well above water
    feed_both(&mut deps, &env, "1.0");
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&user, &[Coin::new(950u128, COLLATERAL)]),
        ExecuteMsg::MintAct { to: None },
    )
    .unwrap();
    begin_block(&mut deps, &env).unwrap();
    end_block(&mut deps, &env).unwrap();
    execute_as_authority(
        &mut deps,
        &env,
        &[Coin::new(50u128, COLLATERAL)],
        ExecuteMsg::SeedVault {
            source: "community_pool".to_string(),
        },
    )
    .unwrap();
    assert_eq!(
        BME_STATUS.load(&deps.storage).unwrap().status,
        BmeStatus::Healthy
    );

    // price drops, the ratio lands between halt and warn: warning status,
    // and the runway grows past the baseline.
    // the 1-block TWAP window still spans two heights, so feed twice to
    // flush the old price out of it
    env.block.height += 1;
    feed_both(&mut deps, &env, "0.94");
    env.block.height += 1;
    feed_both(&mut deps, &env, "0.94");
    let response = begin_block(&mut deps, &env).unwrap();
    assert_eq!(
        event_attr(&response, "mint_status_change", "new"),
        Some("warning")
    );
    let status = BME_STATUS.load(&deps.storage).unwrap();
    assert_eq!(status.status, BmeStatus::Warning);
    assert!(status.epoch_height_diff > 10, "runway grew past the baseline");

    let next_epoch = MINT_EPOCHS
        .load(&deps.storage, act_denom(&env).as_str())
        .unwrap();
    assert!(next_epoch > env.block.height);

    // a mint enqueued now stays pending until the epoch opens
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&user, &[Coin::new(10u128, COLLATERAL)]),
        ExecuteMsg::MintAct { to: None },
    )
    .unwrap();
    let response = end_block(&mut deps, &env).unwrap();
    assert!(has_event(&response, "ledger_record_blocked"));
    assert_eq!(
        PENDING_LEDGER
            .range(&deps.storage, None, None, Order::Ascending)
            .count(),
        1
    );

    // deeper drop below the halt threshold: mints blocked, refund burns execute
    env.block.height += 1;
    feed_both(&mut deps, &env, "0.85");
    env.block.height += 1;
    feed_both(&mut deps, &env, "0.85");
    let response = begin_block(&mut deps, &env).unwrap();
    assert_eq!(
        event_attr(&response, "mint_status_change", "new"),
        Some("halt_cr")
    );

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&user, &[Coin::new(100u128, act_denom(&env))]),
        ExecuteMsg::BurnAct { to: None },
    )
    .unwrap();
    let response = end_block(&mut deps, &env).unwrap();
    // the pending mint is still blocked, the burn went through
    assert!(has_event(&response, "ledger_record_blocked"));
    assert!(has_event(&response, "ledger_record_executed"));
    assert_eq!(
        send_amount(&response.messages, &user, COLLATERAL),
        Uint128::new(117),
        "100 act at 0.85 pays floor(117.6) collateral"
    );
}

// A stale price source can darken the feed and halt mints.
#[test]
fn oracle_staleness_halts_mints() {
    let (mut deps, mut env) = setup_with(|deps| {
        let mut msg = default_instantiate_msg(deps);
        msg.oracle.min_price_sources = 3;
        msg
    });
    let user = deps.api.addr_make("user");

    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();
    feed_price(&mut deps, &env, 2, "1.0").unwrap();
    begin_block(&mut deps, &env).unwrap();
    assert_eq!(
        BME_STATUS.load(&deps.storage).unwrap().status,
        BmeStatus::Healthy
    );

    // source 2 goes silent past the staleness bound
    env.block.height += 21;
    feed_price(&mut deps, &env, 0, "1.0").unwrap();
    feed_price(&mut deps, &env, 1, "1.0").unwrap();
    let response = begin_block(&mut deps, &env).unwrap();
    assert!(has_event(&response, "price_staled"));
    assert_eq!(
        event_attr(&response, "mint_status_change", "new"),
        Some("halt_oracle")
    );

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&user, &[Coin::new(100u128, COLLATERAL)]),
        ExecuteMsg::MintAct { to: None },
    )
    .unwrap();
    let response = end_block(&mut deps, &env).unwrap();
    assert!(has_event(&response, "ledger_record_blocked"));
}

// A governance threshold change flips the breaker without a price move.
#[test]
fn governance_threshold_update_flips_status() {
    let (mut deps, mut env) = setup();
    let user = deps.api.addr_make("user");
    use_spot_prices(&mut deps, &env);

    // outstanding 1000 at price 1.0, then a drop to 0.91 puts the ratio in warning
    feed_both(&mut deps, &env, "1.0");
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&user, &[Coin::new(1_000u128, COLLATERAL)]),
        ExecuteMsg::MintAct { to: None },
    )
    .unwrap();
    begin_block(&mut deps, &env).unwrap();
    end_block(&mut deps, &env).unwrap();

    env.block.height += 1;
    feed_both(&mut deps, &env, "0.91");
    env.block.height += 1;
    feed_both(&mut deps, &env, "0.91");
    begin_block(&mut deps, &env).unwrap();
    assert_eq!(
        BME_STATUS.load(&deps.storage).unwrap().status,
        BmeStatus::Warning
    );

    // raise the halt threshold from 9000 to 9200
    let mut bme = BME_PARAMS.load(&deps.storage).unwrap();
    bme.halt_threshold_bps = 9_200;
    execute_as_authority(&mut deps, &env, &[], ExecuteMsg::UpdateBmeParams { params: bme })
        .unwrap();

    env.block.height += 1;
    feed_both(&mut deps, &env, "0.91");
    let response = begin_block(&mut deps, &env).unwrap();
    assert_eq!(
        event_attr(&response, "mint_status_change", "new"),
        Some("halt_cr")
    );
}

// The epoch identifier ticks once per block even across long gaps.
#[test]
fn epochs_tick_with_the_scheduler() {
    let (mut deps, mut env) = setup();

    run_block(&mut deps, &mut env);
    let info = load_epoch(&deps.storage, "day").unwrap();
    assert!(info.epoch_counting_started);
    assert_eq!(info.current_epoch, 1);

    // jump far ahead: still at most one tick per block
    env.block.time = env.block.time.plus_seconds(10 * 86_400);
    run_block(&mut deps, &mut env);
    let info = load_epoch(&deps.storage, "day").unwrap();
    assert_eq!(info.current_epoch, 2);
}

// Settlement composition: one jump equals many small steps.
#[test]
fn settlement_composes_across_blocks() {
    let run = |steps: &[u64]| {
        let (mut deps, mut env) = setup();
        let owner = deps.api.addr_make("tenant");
        let provider = deps.api.addr_make("provider");
        create_deployment(&mut deps, &env, &owner, 1, "7", 1_000).unwrap();
        register_provider(&mut deps, &env, &provider);
        place_bid(&mut deps, &env, order_ref(&owner, 1), &provider, "7", 50).unwrap();
        make_lease(&mut deps, &env, &owner, bid_ref(&owner, 1, 1, &provider, 1)).unwrap();
        for step in steps {
            env.block.height += step;
            end_block(&mut deps, &env).unwrap();
        }
        let account = deployment_account(&owner, 1);
        ACCOUNTS
            .load(&deps.storage, account.key().as_str())
            .unwrap()
    };

    let jumped = run(&[60]);
    let stepped = run(&[13, 17, 9, 21]);
    assert_eq!(jumped.balance, stepped.balance);
    assert_eq!(jumped.transferred, stepped.transferred);
    assert_eq!(jumped.settled_at, stepped.settled_at);
    // the aggregate balance always mirrors the depositor entries
    assert_eq!(jumped.balance, jumped.depositor_total().unwrap());
}
