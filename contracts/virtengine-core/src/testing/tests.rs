use cosmwasm_std::testing::message_info;
use cosmwasm_std::{from_json, Binary, Coin};

use crate::bme::state::ACT_DENOM;
use crate::contract::{execute, query};
use crate::error::ContractError;
use crate::gates::Attribute;
use crate::msg::{
    AllParamsResponse, CertificatesResponse, ExecuteMsg, ProvidersResponse, QueryMsg,
    WasmGateParamsMsg,
};
use crate::params::{MarketParams, MARKET_PARAMS, WASM_GATE_PARAMS};
use crate::testing::helpers::*;

#[test]
fn instantiate_stores_params_and_genesis() {
    let (deps, env) = setup();

    let params: AllParamsResponse =
        from_json(query(deps.as_ref(), env.clone(), QueryMsg::Params {}).unwrap()).unwrap();
    assert_eq!(params.authority, authority(&deps));
    assert_eq!(params.bme.collateral_denom, COLLATERAL);
    assert_eq!(params.oracle.sources.len(), 3);
    assert_eq!(params.market.order_max_bids, 3);

    // the tokenfactory reply resolved the stable denom
    assert_eq!(ACT_DENOM.load(&deps.storage).unwrap(), act_denom(&env));
}

#[test]
fn update_params_is_authority_gated() {
    let (mut deps, env) = setup();

    let mut market = MARKET_PARAMS.load(&deps.storage).unwrap();
    market.order_max_bids = 7;

    let intruder = deps.api.addr_make("intruder");
    let err = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&intruder, &[]),
        ExecuteMsg::UpdateMarketParams {
            params: market.clone(),
        },
    )
    .unwrap_err();
    assert_eq!(err, ContractError::NotAuthority);

    execute_as_authority(
        &mut deps,
        &env,
        &[],
        ExecuteMsg::UpdateMarketParams { params: market },
    )
    .unwrap();
    assert_eq!(MARKET_PARAMS.load(&deps.storage).unwrap().order_max_bids, 7);
}

#[test]
fn update_params_rejects_invalid_values() {
    let (mut deps, env) = setup();
    let params = MarketParams {
        min_deposit: vec![],
        bid_min_deposit: vec![],
        order_max_bids: 0,
        auto_match_bids: false,
        lease_grace_blocks: 0,
        require_certificate: false,
    };
    let err = execute_as_authority(
        &mut deps,
        &env,
        &[],
        ExecuteMsg::UpdateMarketParams { params },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::EmptyValue { .. }));
}

#[test]
fn wasm_gate_blocks_listed_addresses() {
    let (mut deps, env) = setup();
    let blocked = deps.api.addr_make("wasm-contract");

    execute_as_authority(
        &mut deps,
        &env,
        &[],
        ExecuteMsg::UpdateWasmGateParams {
            params: WasmGateParamsMsg {
                blocked_addresses: vec![blocked.to_string()],
            },
        },
    )
    .unwrap();
    assert!(WASM_GATE_PARAMS
        .load(&deps.storage)
        .unwrap()
        .is_blocked(&blocked));

    let err = execute(
        deps.as_mut(),
        env,
        message_info(&blocked, &[]),
        ExecuteMsg::DeleteProvider {},
    )
    .unwrap_err();
    assert_eq!(
        err,
        ContractError::BlockedAddress {
            address: blocked.to_string()
        }
    );
}

#[test]
fn certificate_lifecycle() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CreateCertificate {
            serial: "1".to_string(),
            cert: Binary::from(b"cert-pem".as_slice()),
            pubkey: Binary::from(b"pubkey".as_slice()),
        },
    )
    .unwrap();

    // duplicate serial rejected
    let err = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::CreateCertificate {
            serial: "1".to_string(),
            cert: Binary::from(b"cert-pem".as_slice()),
            pubkey: Binary::from(b"pubkey".as_slice()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::AlreadyExists { .. }));

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&owner, &[]),
        ExecuteMsg::RevokeCertificate {
            serial: "1".to_string(),
        },
    )
    .unwrap();

    let certs: CertificatesResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Certificates {
                owner: owner.to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(certs.certificates.len(), 1);

    // revoking twice is a state error
    let err = execute(
        deps.as_mut(),
        env,
        message_info(&owner, &[]),
        ExecuteMsg::RevokeCertificate {
            serial: "1".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InvalidState { .. }));
}

#[test]
fn provider_crud_and_audit() {
    let (mut deps, env) = setup();
    let provider = deps.api.addr_make("provider");
    let auditor = deps.api.addr_make("auditor");

    register_provider_with(
        &mut deps,
        &env,
        &provider,
        vec![Attribute::new("region", "eu-west")],
    );

    // double registration rejected
    let err = execute(
        deps.as_mut(),
        env.clone(),
        message_info(&provider, &[]),
        ExecuteMsg::CreateProvider {
            host_uri: "https://other.example.com".to_string(),
            attributes: vec![],
            info: Default::default(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::AlreadyExists { .. }));

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

    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&auditor, &[]),
        ExecuteMsg::DeleteProviderAttributes {
            owner: provider.to_string(),
            keys: vec!["region".to_string()],
        },
    )
    .unwrap();

    let providers: ProvidersResponse = from_json(
        query(
            deps.as_ref(),
            env.clone(),
            QueryMsg::Providers {
                start_after: None,
                limit: None,
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(providers.providers.len(), 1);

    execute(
        deps.as_mut(),
        env,
        message_info(&provider, &[]),
        ExecuteMsg::DeleteProvider {},
    )
    .unwrap();
}

#[test]
fn deposit_denoms_are_validated() {
    let (mut deps, env) = setup();
    let owner = deps.api.addr_make("tenant");

    let err = execute(
        deps.as_mut(),
        env,
        message_info(&owner, &[Coin::new(1_000u128, "notadenom")]),
        ExecuteMsg::CreateDeployment {
            dseq: 1,
            groups: vec![group_spec("10")],
            hash: Binary::default(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InvalidDenom { .. }));
}
