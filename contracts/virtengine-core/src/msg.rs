use cosmwasm_std::{Addr, Api, Binary, Decimal, Uint128};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bme::state::{BmeState, LedgerRecord, StatusRecord};
use crate::coins::DecCoin;
use crate::epochs::EpochInfo;
use crate::error::{ContractError, ContractResult};
use crate::escrow::state::{AccountState, DepositSource, EscrowAccount, Payment, PaymentState};
use crate::gates::audit::AuditedAttributes;
use crate::gates::cert::Certificate;
use crate::gates::provider::{Provider, ProviderInfo};
use crate::gates::Attribute;
use crate::ids::{AccountId, AccountScope, BidId, DeploymentId, OrderId};
use crate::market::state::{
    Bid, BidState, Deployment, DeploymentState, Group, GroupSpec, Lease, LeaseClosedReason,
    LeaseState, Order, OrderState, ResourceOffer,
};
use crate::oracle::state::{AggregatedPrice, PriceSample};
use crate::params::{
    BmeParams, DenomTakeRate, MarketParams, OracleParams, TakeParams, WasmGateParams,
};

/// Oracle params as they arrive on the wire, addresses unvalidated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OracleParamsMsg {
    pub sources: Vec<String>,
    pub twap_window: u64,
    pub max_price_staleness_blocks: u64,
    pub stale_warning_blocks: u64,
    pub min_price_sources: u32,
    pub max_price_deviation_bps: u32,
}

impl OracleParamsMsg {
    pub fn into_params(self, api: &dyn Api) -> ContractResult<OracleParams> {
        let params = OracleParams {
            sources: crate::params::validate_address_list(api, &self.sources)?,
            twap_window: self.twap_window,
            max_price_staleness_blocks: self.max_price_staleness_blocks,
            stale_warning_blocks: self.stale_warning_blocks,
            min_price_sources: self.min_price_sources,
            max_price_deviation_bps: self.max_price_deviation_bps,
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct TakeParamsMsg {
    pub platform_address: String,
    pub default_rate_bps: u32,
    pub denom_rates: Vec<DenomTakeRate>,
}

impl TakeParamsMsg {
    pub fn into_params(self, api: &dyn Api) -> ContractResult<TakeParams> {
        let params = TakeParams {
            platform_address: api.addr_validate(&self.platform_address)?,
            default_rate_bps: self.default_rate_bps,
            denom_rates: self.denom_rates,
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct WasmGateParamsMsg {
    pub blocked_addresses: Vec<String>,
}

impl WasmGateParamsMsg {
    pub fn into_params(self, api: &dyn Api) -> ContractResult<WasmGateParams> {
        Ok(WasmGateParams {
            blocked_addresses: crate::params::validate_address_list(
                api,
                &self.blocked_addresses,
            )?,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ProviderGenesis {
    pub owner: String,
    pub host_uri: String,
    pub attributes: Vec<Attribute>,
    pub info: ProviderInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct CertificateGenesis {
    pub owner: String,
    pub serial: String,
    pub cert: Binary,
    pub pubkey: Binary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AuditedGenesis {
    pub owner: String,
    pub auditor: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EpochGenesis {
    pub identifier: String,
    pub start_time: u64,
    pub duration_seconds: u64,
}

impl EpochGenesis {
    pub fn into_info(self) -> EpochInfo {
        EpochInfo {
            identifier: self.identifier,
            start_time: self.start_time,
            duration_seconds: self.duration_seconds,
            current_epoch: 0,
            current_epoch_start_time: 0,
            epoch_counting_started: false,
        }
    }
}

/// The genesis blob: params plus the gate/oracle/epoch entities present at
/// chain start. Marketplace and escrow state begins empty.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct InstantiateMsg {
    pub authority: String,
    pub market: MarketParams,
    pub oracle: OracleParamsMsg,
    pub bme: BmeParams,
    pub take: TakeParamsMsg,
    pub wasm_gate: WasmGateParamsMsg,
    pub epochs: Vec<EpochGenesis>,
    pub providers: Vec<ProviderGenesis>,
    pub certificates: Vec<CertificateGenesis>,
    pub audited_attributes: Vec<AuditedGenesis>,
}

impl InstantiateMsg {
    pub fn validate(&self) -> ContractResult<()> {
        if self.authority.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "authority".to_string(),
            });
        }
        self.market.validate()?;
        self.bme.validate()?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct MigrateMsg {}

/// Wire reference to an order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OrderRef {
    pub owner: String,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
}

impl OrderRef {
    pub fn to_id(&self, api: &dyn Api) -> ContractResult<OrderId> {
        Ok(OrderId {
            owner: api.addr_validate(&self.owner)?,
            dseq: self.dseq,
            gseq: self.gseq,
            oseq: self.oseq,
        })
    }
}

/// Wire reference to a bid or the lease sharing its id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BidRef {
    pub owner: String,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
    pub provider: String,
    pub bseq: u32,
}

impl BidRef {
    pub fn to_id(&self, api: &dyn Api) -> ContractResult<BidId> {
        Ok(BidId {
            owner: api.addr_validate(&self.owner)?,
            dseq: self.dseq,
            gseq: self.gseq,
            oseq: self.oseq,
            provider: api.addr_validate(&self.provider)?,
            bseq: self.bseq,
        })
    }
}

/// Wire reference to an escrow account: a deployment's or a bid's.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AccountRef {
    pub scope: AccountScope,
    pub owner: String,
    pub dseq: u64,
    pub gseq: Option<u32>,
    pub oseq: Option<u32>,
    pub provider: Option<String>,
    pub bseq: Option<u32>,
}

impl AccountRef {
    pub fn to_id(&self, api: &dyn Api) -> ContractResult<AccountId> {
        let owner = api.addr_validate(&self.owner)?;
        match self.scope {
            AccountScope::Deployment => Ok(AccountId::for_deployment(&DeploymentId::new(
                owner, self.dseq,
            ))),
            AccountScope::Bid => {
                let missing = |kind: &str| ContractError::EmptyValue {
                    kind: kind.to_string(),
                };
                let provider = self
                    .provider
                    .as_ref()
                    .ok_or_else(|| missing("provider"))?;
                let bid = BidId {
                    owner,
                    dseq: self.dseq,
                    gseq: self.gseq.ok_or_else(|| missing("gseq"))?,
                    oseq: self.oseq.ok_or_else(|| missing("oseq"))?,
                    provider: api.addr_validate(provider)?,
                    bseq: self.bseq.ok_or_else(|| missing("bseq"))?,
                };
                Ok(AccountId::for_bid(&bid))
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    // marketplace lifecycle
    CreateDeployment {
        dseq: u64,
        groups: Vec<GroupSpec>,
        hash: Binary,
    },
    UpdateDeployment {
        dseq: u64,
        hash: Binary,
    },
    CloseDeployment {
        dseq: u64,
    },
    PauseGroup {
        dseq: u64,
        gseq: u32,
    },
    StartGroup {
        dseq: u64,
        gseq: u32,
    },
    CloseGroup {
        dseq: u64,
        gseq: u32,
    },
    CreateBid {
        order: OrderRef,
        price: DecCoin,
        resources_offer: Vec<ResourceOffer>,
    },
    CloseBid {
        order: OrderRef,
        bseq: u32,
    },
    CreateLease {
        bid: BidRef,
    },
    CloseLease {
        lease: BidRef,
        reason: Option<LeaseClosedReason>,
    },
    WithdrawLease {
        lease: BidRef,
    },
    // escrow
    AccountDeposit {
        account: AccountRef,
        source: DepositSource,
        direct: bool,
    },
    // burn/mint engine
    MintAct {
        to: Option<String>,
    },
    BurnAct {
        to: Option<String>,
    },
    BurnMint {
        denom_to_mint: String,
        to: Option<String>,
    },
    SeedVault {
        source: String,
    },
    // oracle
    AddPriceEntry {
        denom: String,
        base_denom: String,
        price: Decimal,
        timestamp: Option<u64>,
    },
    // identity gates
    CreateCertificate {
        serial: String,
        cert: Binary,
        pubkey: Binary,
    },
    RevokeCertificate {
        serial: String,
    },
    CreateProvider {
        host_uri: String,
        attributes: Vec<Attribute>,
        info: ProviderInfo,
    },
    UpdateProvider {
        host_uri: Option<String>,
        attributes: Option<Vec<Attribute>>,
        info: Option<ProviderInfo>,
    },
    DeleteProvider {},
    SignProviderAttributes {
        owner: String,
        attributes: Vec<Attribute>,
    },
    DeleteProviderAttributes {
        owner: String,
        keys: Vec<String>,
    },
    // governance
    UpdateMarketParams {
        params: MarketParams,
    },
    UpdateOracleParams {
        params: OracleParamsMsg,
    },
    UpdateBmeParams {
        params: BmeParams,
    },
    UpdateTakeParams {
        params: TakeParamsMsg,
    },
    UpdateWasmGateParams {
        params: WasmGateParamsMsg,
    },
}

/// Consensus-driven entry points; the chain invokes these around the
/// block's messages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SudoMsg {
    BeginBlock {},
    EndBlock {},
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Deployment {
        owner: String,
        dseq: u64,
    },
    Deployments {
        owner: Option<String>,
        state: Option<DeploymentState>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    Group {
        owner: String,
        dseq: u64,
        gseq: u32,
    },
    Groups {
        owner: String,
        dseq: u64,
    },
    Order {
        order: OrderRef,
    },
    Orders {
        owner: Option<String>,
        state: Option<OrderState>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    Bid {
        bid: BidRef,
    },
    Bids {
        owner: Option<String>,
        provider: Option<String>,
        state: Option<BidState>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    Lease {
        lease: BidRef,
    },
    Leases {
        owner: Option<String>,
        provider: Option<String>,
        state: Option<LeaseState>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    EscrowAccount {
        account: AccountRef,
    },
    EscrowAccounts {
        scope: Option<AccountScope>,
        state: Option<AccountState>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    Payments {
        account: AccountRef,
        state: Option<PaymentState>,
    },
    Params {},
    VaultState {},
    BmeStatus {},
    LedgerRecords {
        executed: Option<bool>,
        start_after: Option<String>,
        limit: Option<u32>,
    },
    AggregatedPrice {
        denom: String,
        base_denom: String,
    },
    PriceFeedConfig {},
    Prices {
        denom: String,
        base_denom: String,
        source_idx: Option<u32>,
        limit: Option<u32>,
    },
    CurrentEpoch {
        identifier: String,
    },
    EpochInfos {},
    Certificates {
        owner: String,
    },
    Provider {
        owner: String,
    },
    Providers {
        start_after: Option<String>,
        limit: Option<u32>,
    },
    AuditedProviders {
        owner: String,
        auditor: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AllParamsResponse {
    pub authority: Addr,
    pub market: MarketParams,
    pub oracle: OracleParams,
    pub bme: BmeParams,
    pub take: TakeParams,
    pub wasm_gate: WasmGateParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct VaultStateResponse {
    pub state: BmeState,
    pub stable_denom: String,
    pub outstanding_stable: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BmeStatusResponse {
    pub record: StatusRecord,
    pub next_mint_epoch: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DeploymentsResponse {
    pub deployments: Vec<Deployment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct GroupsResponse {
    pub groups: Vec<Group>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BidsResponse {
    pub bids: Vec<Bid>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LeasesResponse {
    pub leases: Vec<Lease>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EscrowAccountsResponse {
    pub accounts: Vec<EscrowAccount>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct PaymentsResponse {
    pub payments: Vec<Payment>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct LedgerRecordsResponse {
    pub records: Vec<LedgerRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AggregatedPriceResponse {
    pub price: Option<AggregatedPrice>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct PriceFeedConfigResponse {
    pub params: OracleParams,
    pub tracked_pair: (String, String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct PriceEntry {
    pub source_idx: u32,
    pub height: u64,
    pub sample: PriceSample,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct PricesResponse {
    pub entries: Vec<PriceEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EpochInfosResponse {
    pub epochs: Vec<EpochInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct CertificatesResponse {
    pub certificates: Vec<Certificate>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersResponse {
    pub providers: Vec<Provider>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AuditedProvidersResponse {
    pub records: Vec<AuditedAttributes>,
}

