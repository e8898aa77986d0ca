use cosmwasm_std::{
    CheckedFromRatioError, CheckedMultiplyFractionError, OverflowError, StdError,
};
use thiserror::Error;

pub type ContractResult<T> = core::result::Result<T, ContractError>;

#[derive(Error, Debug, PartialEq)]
pub enum ContractError {
    #[error(transparent)]
    Std(#[from] StdError),

    #[error("field {kind} should not be empty")]
    EmptyValue { kind: String },

    #[error("denom {denom} is invalid: {reason}")]
    InvalidDenom { denom: String, reason: String },

    #[error("{kind} amount must be positive")]
    NonPositiveAmount { kind: String },

    #[error("config for {input} is invalid: {reason}")]
    InvalidConfig { input: String, reason: String },

    #[error("unauthorized: sender is not permitted to run this message")]
    Unauthorized,

    #[error("sender is not the governance authority")]
    NotAuthority,

    #[error("message origin {address} is blocked")]
    BlockedAddress { address: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: String, id: String },

    #[error("{kind} {id} is in state {state}, transition not allowed")]
    InvalidState {
        kind: String,
        id: String,
        state: String,
    },

    #[error("no funds sent with this message")]
    NoFundsSent,

    #[error("unexpected funds attached to this message")]
    FundsNotAllowed,

    #[error("deposit {provided} is below the required minimum {required}")]
    InsufficientDeposit { required: String, provided: String },

    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: String, required: String },

    #[error("payment rate must be positive in every denom")]
    ZeroPaymentRate,

    #[error("payment rate denom {denom} does not match the account's existing payments")]
    RateDenomMismatch { denom: String },

    #[error("order already holds the maximum of {max} open bids")]
    BidLimitReached { max: u32 },

    #[error("provider {provider} does not satisfy the order's placement requirements")]
    AttributesNotSatisfied { provider: String },

    #[error("owner holds no valid certificate")]
    CertificateRequired,

    #[error("certificate {serial} is revoked")]
    CertificateRevoked { serial: String },

    #[error("price source {address} is not registered")]
    UnknownPriceSource { address: String },

    #[error("price pair {denom}/{base_denom} is not available")]
    PriceNotAvailable { denom: String, base_denom: String },

    #[error("price pair {denom}/{base_denom} is unhealthy")]
    OracleUnhealthy { denom: String, base_denom: String },

    #[error("mint is halted, status is {status}")]
    CircuitBreaker { status: String },

    #[error("mint epoch not reached, next allowed at height {next_epoch}")]
    EpochNotReached { next_epoch: u64 },

    #[error("vault holds {available} {denom}, {required} required")]
    VaultInsufficient {
        denom: String,
        available: String,
        required: String,
    },

    #[error("stable denom has not been created yet")]
    TokenNotCreated,

    #[error("stable denom already created")]
    TokenAlreadyCreated,

    #[error("epoch identifier {identifier} is not registered")]
    UnknownEpoch { identifier: String },

    #[error("no response data from submessage")]
    NoResponseData,

    #[error("failed to decode response data")]
    DecodingError,

    #[error("unknown reply id: {id}")]
    UnknownReplyId { id: u64 },

    #[error("serialization error")]
    SerializationError,

    #[error("overflow error")]
    Overflow(OverflowError),

    #[error("division error")]
    CheckedDiv(CheckedFromRatioError),

    #[error("fraction multiplication error")]
    CheckedFraction(CheckedMultiplyFractionError),

    #[error("decimal range exceeded")]
    DecimalRange,
}

impl From<OverflowError> for ContractError {
    fn from(err: OverflowError) -> Self {
        ContractError::Overflow(err)
    }
}

impl From<CheckedFromRatioError> for ContractError {
    fn from(err: CheckedFromRatioError) -> Self {
        ContractError::CheckedDiv(err)
    }
}

impl From<CheckedMultiplyFractionError> for ContractError {
    fn from(err: CheckedMultiplyFractionError) -> Self {
        ContractError::CheckedFraction(err)
    }
}

impl ContractError {
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        ContractError::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    pub fn already_exists(kind: &str, id: impl Into<String>) -> Self {
        ContractError::AlreadyExists {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    pub fn invalid_state(kind: &str, id: impl Into<String>, state: impl ToString) -> Self {
        ContractError::InvalidState {
            kind: kind.to_string(),
            id: id.into(),
            state: state.to_string(),
        }
    }
}
