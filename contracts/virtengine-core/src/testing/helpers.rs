use cosmwasm_std::testing::{
    message_info, mock_dependencies, mock_env, MockApi, MockQuerier, MockStorage,
};
use cosmwasm_std::{
    Addr, Binary, Coin, Decimal, Empty, Env, MsgResponse, OwnedDeps, Reply, Response,
    SubMsgResponse, SubMsgResult,
};
use neutron_std::types::osmosis::tokenfactory::v1beta1::MsgCreateDenomResponse;
use prost::Message;

use crate::bme::state::CREATE_STABLE_DENOM_REPLY_ID;
use crate::coins::DecCoin;
use crate::contract::{execute, instantiate, reply, sudo};
use crate::error::ContractResult;
use crate::gates::Attribute;
use crate::gates::provider::ProviderInfo;
use crate::market::state::{GroupSpec, PlacementRequirements, ResourceUnit, SignedBy};
use crate::msg::{
    BidRef, EpochGenesis, ExecuteMsg, InstantiateMsg, OracleParamsMsg, OrderRef, SudoMsg,
    TakeParamsMsg, WasmGateParamsMsg,
};
use crate::params::{BmeParams, MarketParams};

pub type TestDeps = OwnedDeps<MockStorage, MockApi, MockQuerier, Empty>;

pub const COLLATERAL: &str = "uakt";
pub const BASE: &str = "usd";
pub const MARKET_DENOM: &str = "uact";

pub fn authority(deps: &TestDeps) -> Addr {
    deps.api.addr_make("authority")
}

pub fn source(deps: &TestDeps, idx: u32) -> Addr {
    deps.api.addr_make(&format!("source{idx}"))
}

pub fn default_instantiate_msg(deps: &TestDeps) -> InstantiateMsg {
    InstantiateMsg {
        authority: authority(deps).to_string(),
        market: MarketParams {
            min_deposit: vec![Coin::new(100u128, MARKET_DENOM)],
            bid_min_deposit: vec![Coin::new(50u128, MARKET_DENOM)],
            order_max_bids: 3,
            auto_match_bids: false,
            lease_grace_blocks: 10,
            require_certificate: false,
        },
        oracle: OracleParamsMsg {
            sources: (0..3).map(|i| source(deps, i).to_string()).collect(),
            twap_window: 50,
            max_price_staleness_blocks: 20,
            stale_warning_blocks: 5,
            min_price_sources: 2,
            max_price_deviation_bps: 1_000,
        },
        bme: BmeParams {
            collateral_denom: COLLATERAL.to_string(),
            stable_subdenom: "sact".to_string(),
            base_denom: BASE.to_string(),
            warn_threshold_bps: 9_500,
            halt_threshold_bps: 9_000,
            mint_spread_bps: 0,
            settle_spread_bps: 0,
            min_epoch_blocks: 10,
            epoch_blocks_backoff_bps: 100,
        },
        take: TakeParamsMsg {
            platform_address: deps.api.addr_make("platform").to_string(),
            default_rate_bps: 0,
            denom_rates: vec![],
        },
        wasm_gate: WasmGateParamsMsg {
            blocked_addresses: vec![],
        },
        epochs: vec![EpochGenesis {
            identifier: "day".to_string(),
            start_time: 0,
            duration_seconds: 86_400,
        }],
        providers: vec![],
        certificates: vec![],
        audited_attributes: vec![],
    }
}

pub fn act_denom(env: &Env) -> String {
    format!("factory/{}/sact", env.contract.address)
}

/// Instantiate with defaults and simulate the tokenfactory reply that
/// resolves the stable denom.
pub fn setup() -> (TestDeps, Env) {
    setup_with(default_instantiate_msg)
}

pub fn setup_with(build: impl Fn(&TestDeps) -> InstantiateMsg) -> (TestDeps, Env) {
    let mut deps = mock_dependencies();
    let env = mock_env();
    let info = message_info(&deps.api.addr_make("creator"), &[]);
    let msg = build(&deps);
    instantiate(deps.as_mut(), env.clone(), info, msg).expect("instantiate must succeed");

    let token_creation_response = MsgCreateDenomResponse {
        new_token_denom: act_denom(&env),
    };
    let reply_msg = Reply {
        id: CREATE_STABLE_DENOM_REPLY_ID,
        result: SubMsgResult::Ok(SubMsgResponse {
            events: vec![],
            msg_responses: vec![MsgResponse {
                type_url: "/osmosis.tokenfactory.v1beta1.MsgCreateDenomResponse".to_string(),
                value: Binary::from(token_creation_response.encode_to_vec()),
            }],
            data: None,
        }),
        gas_used: 0,
        payload: Binary::default(),
    };
    reply(deps.as_mut(), env.clone(), reply_msg).expect("denom reply must succeed");

    (deps, env)
}

/// Run a message signed by the governance authority.
pub fn execute_as_authority(
    deps: &mut TestDeps,
    env: &Env,
    funds: &[Coin],
    msg: ExecuteMsg,
) -> ContractResult<Response> {
    let sender = authority(deps);
    execute(deps.as_mut(), env.clone(), message_info(&sender, funds), msg)
}

pub fn begin_block(deps: &mut TestDeps, env: &Env) -> ContractResult<Response> {
    sudo(deps.as_mut(), env.clone(), SudoMsg::BeginBlock {})
}

pub fn end_block(deps: &mut TestDeps, env: &Env) -> ContractResult<Response> {
    sudo(deps.as_mut(), env.clone(), SudoMsg::EndBlock {})
}

/// Run begin+end for the current height, then advance the env one block.
pub fn run_block(deps: &mut TestDeps, env: &mut Env) -> (Response, Response) {
    let begin = begin_block(deps, env).expect("begin block");
    let end = end_block(deps, env).expect("end block");
    env.block.height += 1;
    env.block.time = env.block.time.plus_seconds(6);
    (begin, end)
}

pub fn feed_price(
    deps: &mut TestDeps,
    env: &Env,
    source_idx: u32,
    price: &str,
) -> ContractResult<Response> {
    let sender = source(deps, source_idx);
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(&sender, &[]),
        ExecuteMsg::AddPriceEntry {
            denom: COLLATERAL.to_string(),
            base_denom: BASE.to_string(),
            price: price.parse::<Decimal>().unwrap(),
            timestamp: None,
        },
    )
}

pub fn register_provider(deps: &mut TestDeps, env: &Env, provider: &Addr) {
    register_provider_with(deps, env, provider, vec![])
}

pub fn register_provider_with(
    deps: &mut TestDeps,
    env: &Env,
    provider: &Addr,
    attributes: Vec<Attribute>,
) {
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(provider, &[]),
        ExecuteMsg::CreateProvider {
            host_uri: "https://provider.example.com".to_string(),
            attributes,
            info: ProviderInfo::default(),
        },
    )
    .expect("provider registration must succeed");
}

pub fn group_spec(price: &str) -> GroupSpec {
    GroupSpec {
        name: "compute".to_string(),
        requirements: PlacementRequirements {
            signed_by: SignedBy::default(),
            attributes: vec![],
        },
        resources: vec![ResourceUnit {
            resource: "cpu".to_string(),
            count: 1,
            price: DecCoin::new(MARKET_DENOM, price.parse().unwrap()),
        }],
    }
}

pub fn create_deployment(
    deps: &mut TestDeps,
    env: &Env,
    owner: &Addr,
    dseq: u64,
    price: &str,
    deposit: u128,
) -> ContractResult<Response> {
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(owner, &[Coin::new(deposit, MARKET_DENOM)]),
        ExecuteMsg::CreateDeployment {
            dseq,
            groups: vec![group_spec(price)],
            hash: Binary::from(b"manifest-hash".as_slice()),
        },
    )
}

pub fn order_ref(owner: &Addr, dseq: u64) -> OrderRef {
    OrderRef {
        owner: owner.to_string(),
        dseq,
        gseq: 1,
        oseq: 1,
    }
}

pub fn bid_ref(owner: &Addr, dseq: u64, oseq: u32, provider: &Addr, bseq: u32) -> BidRef {
    BidRef {
        owner: owner.to_string(),
        dseq,
        gseq: 1,
        oseq,
        provider: provider.to_string(),
        bseq,
    }
}

pub fn place_bid(
    deps: &mut TestDeps,
    env: &Env,
    order: OrderRef,
    provider: &Addr,
    price: &str,
    deposit: u128,
) -> ContractResult<Response> {
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(provider, &[Coin::new(deposit, MARKET_DENOM)]),
        ExecuteMsg::CreateBid {
            order,
            price: DecCoin::new(MARKET_DENOM, price.parse().unwrap()),
            resources_offer: vec![crate::market::state::ResourceOffer {
                resource: "cpu".to_string(),
                count: 1,
            }],
        },
    )
}

pub fn make_lease(
    deps: &mut TestDeps,
    env: &Env,
    owner: &Addr,
    bid: BidRef,
) -> ContractResult<Response> {
    execute(
        deps.as_mut(),
        env.clone(),
        message_info(owner, &[]),
        ExecuteMsg::CreateLease { bid },
    )
}

/// Total bank-send amount of `denom` addressed to `to` in a response.
pub fn send_amount(
    msgs: &[cosmwasm_std::SubMsg],
    to: &Addr,
    denom: &str,
) -> cosmwasm_std::Uint128 {
    msgs.iter()
        .filter_map(|sub| match &sub.msg {
            cosmwasm_std::CosmosMsg::Bank(cosmwasm_std::BankMsg::Send { to_address, amount })
                if to_address == to.as_str() =>
            {
                Some(
                    amount
                        .iter()
                        .find(|c| c.denom == denom)
                        .map(|c| c.amount)
                        .unwrap_or_default(),
                )
            }
            _ => None,
        })
        .sum()
}

pub fn has_event(response: &Response, ty: &str) -> bool {
    response.events.iter().any(|e| e.ty == ty)
}

pub fn event_attr<'a>(response: &'a Response, ty: &str, key: &str) -> Option<&'a str> {
    response
        .events
        .iter()
        .find(|e| e.ty == ty)
        .and_then(|e| e.attributes.iter().find(|a| a.key == key))
        .map(|a| a.value.as_str())
}
