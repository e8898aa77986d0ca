use cosmwasm_std::{Binary, Order as IterOrder, Storage};
use cw_storage_plus::{Bound, Map};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::coins::{DecCoin, DecCoins};
use crate::error::{ContractError, ContractResult};
use crate::gates::Attribute;
use crate::ids::{prefix_bounds, BidId, DeploymentId, GroupId, LeaseId, OrderId};
use crate::utils::validate_denom;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Active,
    Closed,
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::Active => f.write_str("active"),
            DeploymentState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Open,
    Paused,
    InsufficientFunds,
    Closed,
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupState::Open => f.write_str("open"),
            GroupState::Paused => f.write_str("paused"),
            GroupState::InsufficientFunds => f.write_str("insufficient_funds"),
            GroupState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Open,
    Active,
    Closed,
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Open => f.write_str("open"),
            OrderState::Active => f.write_str("active"),
            OrderState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BidState {
    Open,
    Active,
    Lost,
    Closed,
}

impl std::fmt::Display for BidState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BidState::Open => f.write_str("open"),
            BidState::Active => f.write_str("active"),
            BidState::Lost => f.write_str("lost"),
            BidState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    Active,
    InsufficientFunds,
    Closed,
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseState::Active => f.write_str("active"),
            LeaseState::InsufficientFunds => f.write_str("insufficient_funds"),
            LeaseState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaseClosedReason {
    Owner,
    Decommission,
    Unstable,
    ManifestTimeout,
    InsufficientFunds,
}

impl std::fmt::Display for LeaseClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseClosedReason::Owner => f.write_str("owner"),
            LeaseClosedReason::Decommission => f.write_str("decommission"),
            LeaseClosedReason::Unstable => f.write_str("unstable"),
            LeaseClosedReason::ManifestTimeout => f.write_str("manifest_timeout"),
            LeaseClosedReason::InsufficientFunds => f.write_str("insufficient_funds"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ResourceUnit {
    pub resource: String,
    pub count: u32,
    pub price: DecCoin,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct SignedBy {
    pub all_of: Vec<String>,
    pub any_of: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct PlacementRequirements {
    pub signed_by: SignedBy,
    pub attributes: Vec<Attribute>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct GroupSpec {
    pub name: String,
    pub requirements: PlacementRequirements,
    pub resources: Vec<ResourceUnit>,
}

impl GroupSpec {
    pub fn validate(&self) -> ContractResult<()> {
        if self.name.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "group name".to_string(),
            });
        }
        if self.resources.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "group resources".to_string(),
            });
        }
        for unit in &self.resources {
            if unit.resource.is_empty() {
                return Err(ContractError::EmptyValue {
                    kind: "resource name".to_string(),
                });
            }
            if unit.count == 0 {
                return Err(ContractError::NonPositiveAmount {
                    kind: "resource count".to_string(),
                });
            }
            validate_denom(&unit.price.denom)?;
            if !unit.price.is_positive() {
                return Err(ContractError::NonPositiveAmount {
                    kind: "resource price".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The group's full per-block price: sum of `count · price` over units.
    pub fn rate(&self) -> ContractResult<DecCoins> {
        let mut total = DecCoins::new();
        for unit in &self.resources {
            let unit_total = DecCoins::from(vec![unit.price.clone()])
                .checked_mul_blocks(unit.count as u64)?;
            total = total.checked_add(&unit_total)?;
        }
        Ok(total)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Deployment {
    pub id: DeploymentId,
    pub state: DeploymentState,
    pub hash: Binary,
    pub created_at: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Group {
    pub id: GroupId,
    pub state: GroupState,
    pub spec: GroupSpec,
    pub created_at: u64,
    /// Set while the group sits in `insufficient_funds`; drives the grace
    /// countdown.
    pub paused_at: Option<u64>,
    /// Leases ever closed on this group; the next order's oseq is this + 1.
    pub leases_closed: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Order {
    pub id: OrderId,
    pub state: OrderState,
    pub created_at: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ResourceOffer {
    pub resource: String,
    pub count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Bid {
    pub id: BidId,
    pub state: BidState,
    pub price: DecCoin,
    pub resources_offer: Vec<ResourceOffer>,
    pub created_at: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Lease {
    pub id: LeaseId,
    pub state: LeaseState,
    pub price: DecCoin,
    pub created_at: u64,
    pub closed_on: Option<u64>,
    pub reason: Option<LeaseClosedReason>,
}

pub const DEPLOYMENTS: Map<&str, Deployment> = Map::new("deployments");
pub const GROUPS: Map<&str, Group> = Map::new("groups");
pub const ORDERS: Map<&str, Order> = Map::new("orders");
pub const BIDS: Map<&str, Bid> = Map::new("bids");
pub const LEASES: Map<&str, Lease> = Map::new("leases");
/// Next free bseq per (order, provider).
pub const NEXT_BSEQ: Map<&str, u32> = Map::new("next_bseq");

pub fn load_deployment(storage: &dyn Storage, id: &DeploymentId) -> ContractResult<Deployment> {
    DEPLOYMENTS
        .may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("deployment", id.to_string()))
}

pub fn load_group(storage: &dyn Storage, id: &GroupId) -> ContractResult<Group> {
    GROUPS
        .may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("group", id.to_string()))
}

pub fn load_order(storage: &dyn Storage, id: &OrderId) -> ContractResult<Order> {
    ORDERS
        .may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("order", id.to_string()))
}

pub fn load_bid(storage: &dyn Storage, id: &BidId) -> ContractResult<Bid> {
    BIDS.may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("bid", id.to_string()))
}

pub fn load_lease(storage: &dyn Storage, id: &LeaseId) -> ContractResult<Lease> {
    LEASES
        .may_load(storage, id.key().as_str())?
        .ok_or_else(|| ContractError::not_found("lease", id.to_string()))
}

/// Collect every value under a canonical-key prefix in ascending order.
/// Raw bounds carry owned bytes, so locally-built keys need no lifetime
/// gymnastics against the `'static` map constants.
pub fn collect_prefix<T: serde::de::DeserializeOwned + serde::Serialize>(
    storage: &dyn Storage,
    map: &Map<&str, T>,
    prefix: &str,
) -> ContractResult<Vec<(String, T)>> {
    let (lo, hi) = prefix_bounds(prefix);
    map.range(
        storage,
        Some(Bound::InclusiveRaw(lo.into_bytes())),
        Some(Bound::ExclusiveRaw(hi.into_bytes())),
        IterOrder::Ascending,
    )
    .map(|item| item.map_err(ContractError::Std))
    .collect()
}

pub fn groups_of(storage: &dyn Storage, id: &DeploymentId) -> ContractResult<Vec<Group>> {
    Ok(collect_prefix(storage, &GROUPS, &id.group_prefix())?
        .into_iter()
        .map(|(_, g)| g)
        .collect())
}

pub fn bids_on_order(storage: &dyn Storage, id: &OrderId) -> ContractResult<Vec<Bid>> {
    Ok(collect_prefix(storage, &BIDS, &id.bid_prefix())?
        .into_iter()
        .map(|(_, b)| b)
        .collect())
}

pub fn leases_of_deployment(
    storage: &dyn Storage,
    id: &DeploymentId,
) -> ContractResult<Vec<Lease>> {
    Ok(collect_prefix(storage, &LEASES, &id.group_prefix())?
        .into_iter()
        .map(|(_, l)| l)
        .collect())
}

/// The lease bound to a group, if one is live.
pub fn live_lease_of_group(storage: &dyn Storage, id: &GroupId) -> ContractResult<Option<Lease>> {
    Ok(collect_prefix(storage, &LEASES, &id.order_prefix())?
        .into_iter()
        .map(|(_, l)| l)
        .find(|l| l.state != LeaseState::Closed))
}

/// The group's non-closed order, if any. The order-sequencing invariant
/// keeps this unique.
pub fn open_order_of_group(storage: &dyn Storage, id: &GroupId) -> ContractResult<Option<Order>> {
    Ok(collect_prefix(storage, &ORDERS, &id.order_prefix())?
        .into_iter()
        .map(|(_, o)| o)
        .find(|o| o.state != OrderState::Closed))
}
