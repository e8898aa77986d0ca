use cosmwasm_std::Addr;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Composite identifiers are flat value types. Store keys are canonical
/// strings with zero-padded sequence numbers so that lexicographic byte
/// order of keys equals numeric order of sequences.
const DSEQ_WIDTH: usize = 20;
const SEQ_WIDTH: usize = 10;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DeploymentId {
    pub owner: Addr,
    pub dseq: u64,
}

impl DeploymentId {
    pub fn new(owner: Addr, dseq: u64) -> Self {
        DeploymentId { owner, dseq }
    }

    pub fn key(&self) -> String {
        format!("{}/{:0width$}", self.owner, self.dseq, width = DSEQ_WIDTH)
    }

    /// Prefix under which all group keys of this deployment sort.
    pub fn group_prefix(&self) -> String {
        format!("{}/", self.key())
    }

    /// Recover the id from its canonical key. Only used on keys the
    /// contract wrote itself.
    pub fn from_key(key: &str) -> Option<Self> {
        let (owner, dseq) = key.rsplit_once('/')?;
        if owner.is_empty() {
            return None;
        }
        let dseq: u64 = dseq.parse().ok()?;
        Some(DeploymentId::new(Addr::unchecked(owner), dseq))
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.dseq)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct GroupId {
    pub owner: Addr,
    pub dseq: u64,
    pub gseq: u32,
}

impl GroupId {
    pub fn new(deployment: &DeploymentId, gseq: u32) -> Self {
        GroupId {
            owner: deployment.owner.clone(),
            dseq: deployment.dseq,
            gseq,
        }
    }

    pub fn deployment(&self) -> DeploymentId {
        DeploymentId::new(self.owner.clone(), self.dseq)
    }

    pub fn key(&self) -> String {
        format!(
            "{}/{:0width$}",
            self.deployment().key(),
            self.gseq,
            width = SEQ_WIDTH
        )
    }

    pub fn order_prefix(&self) -> String {
        format!("{}/", self.key())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.dseq, self.gseq)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct OrderId {
    pub owner: Addr,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
}

impl OrderId {
    pub fn new(group: &GroupId, oseq: u32) -> Self {
        OrderId {
            owner: group.owner.clone(),
            dseq: group.dseq,
            gseq: group.gseq,
            oseq,
        }
    }

    pub fn group(&self) -> GroupId {
        GroupId {
            owner: self.owner.clone(),
            dseq: self.dseq,
            gseq: self.gseq,
        }
    }

    pub fn key(&self) -> String {
        format!(
            "{}/{:0width$}",
            self.group().key(),
            self.oseq,
            width = SEQ_WIDTH
        )
    }

    pub fn bid_prefix(&self) -> String {
        format!("{}/", self.key())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.owner, self.dseq, self.gseq, self.oseq)
    }
}

/// A bid identifier; the lease created from a matched bid shares this id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct BidId {
    pub owner: Addr,
    pub dseq: u64,
    pub gseq: u32,
    pub oseq: u32,
    pub provider: Addr,
    pub bseq: u32,
}

pub type LeaseId = BidId;

impl BidId {
    pub fn new(order: &OrderId, provider: Addr, bseq: u32) -> Self {
        BidId {
            owner: order.owner.clone(),
            dseq: order.dseq,
            gseq: order.gseq,
            oseq: order.oseq,
            provider,
            bseq,
        }
    }

    pub fn order(&self) -> OrderId {
        OrderId {
            owner: self.owner.clone(),
            dseq: self.dseq,
            gseq: self.gseq,
            oseq: self.oseq,
        }
    }

    pub fn group(&self) -> GroupId {
        self.order().group()
    }

    pub fn deployment(&self) -> DeploymentId {
        DeploymentId::new(self.owner.clone(), self.dseq)
    }

    pub fn key(&self) -> String {
        format!(
            "{}/{}/{:0width$}",
            self.order().key(),
            self.provider,
            self.bseq,
            width = SEQ_WIDTH
        )
    }

    /// The payment xid embedded in the deployment account's payment key.
    pub fn payment_xid(&self) -> String {
        format!(
            "{:0gw$}/{:0gw$}/{}/{:0gw$}",
            self.gseq,
            self.oseq,
            self.provider,
            self.bseq,
            gw = SEQ_WIDTH
        )
    }
}

impl std::fmt::Display for BidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.owner, self.dseq, self.gseq, self.oseq, self.provider, self.bseq
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    Deployment,
    Bid,
}

impl AccountScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountScope::Deployment => "deployment",
            AccountScope::Bid => "bid",
        }
    }
}

impl std::fmt::Display for AccountScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escrow account identifier: a scope plus the canonical key of the scoped
/// entity (deployment or bid).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AccountId {
    pub scope: AccountScope,
    pub xid: String,
}

impl AccountId {
    pub fn for_deployment(id: &DeploymentId) -> Self {
        AccountId {
            scope: AccountScope::Deployment,
            xid: id.key(),
        }
    }

    pub fn for_bid(id: &BidId) -> Self {
        AccountId {
            scope: AccountScope::Bid,
            xid: id.key(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.scope, self.xid)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.xid)
    }
}

/// Bounds for iterating every key beginning with `prefix`. The upper bound is
/// the prefix with its final byte incremented, which is the smallest string
/// sorting after every extension of the prefix. Keys are ASCII.
pub fn prefix_bounds(prefix: &str) -> (String, String) {
    let mut upper = prefix.as_bytes().to_vec();
    let last = upper
        .last_mut()
        .expect("prefix must not be empty");
    *last += 1;
    (
        prefix.to_string(),
        String::from_utf8(upper).expect("incremented ASCII prefix"),
    )
}
