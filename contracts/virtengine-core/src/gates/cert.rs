use cosmwasm_std::{Addr, Binary, DepsMut, MessageInfo, Order, Response, Storage};
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};
use crate::events;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateState {
    Valid,
    Revoked,
}

impl std::fmt::Display for CertificateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateState::Valid => f.write_str("valid"),
            CertificateState::Revoked => f.write_str("revoked"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Certificate {
    pub serial: String,
    pub state: CertificateState,
    pub cert: Binary,
    pub pubkey: Binary,
}

pub const CERTIFICATES: Map<(&Addr, &str), Certificate> = Map::new("certificates");

pub fn execute_create_certificate(
    deps: DepsMut,
    info: MessageInfo,
    serial: String,
    cert: Binary,
    pubkey: Binary,
) -> ContractResult<Response> {
    if serial.is_empty() {
        return Err(ContractError::EmptyValue {
            kind: "certificate serial".to_string(),
        });
    }
    if cert.is_empty() || pubkey.is_empty() {
        return Err(ContractError::EmptyValue {
            kind: "certificate body".to_string(),
        });
    }
    let key = (&info.sender, serial.as_str());
    if CERTIFICATES.may_load(deps.storage, key)?.is_some() {
        return Err(ContractError::already_exists("certificate", &serial));
    }
    let certificate = Certificate {
        serial: serial.clone(),
        state: CertificateState::Valid,
        cert,
        pubkey,
    };
    CERTIFICATES.save(deps.storage, key, &certificate)?;

    Ok(Response::new()
        .add_attribute("action", "create_certificate")
        .add_event(events::certificate_created(info.sender.as_str(), &serial)))
}

pub fn execute_revoke_certificate(
    deps: DepsMut,
    info: MessageInfo,
    serial: String,
) -> ContractResult<Response> {
    let key = (&info.sender, serial.as_str());
    let mut certificate = CERTIFICATES
        .may_load(deps.storage, key)?
        .ok_or_else(|| ContractError::not_found("certificate", &serial))?;
    if certificate.state == CertificateState::Revoked {
        return Err(ContractError::invalid_state(
            "certificate",
            &serial,
            certificate.state,
        ));
    }
    certificate.state = CertificateState::Revoked;
    CERTIFICATES.save(deps.storage, key, &certificate)?;

    Ok(Response::new()
        .add_attribute("action", "revoke_certificate")
        .add_event(events::certificate_revoked(info.sender.as_str(), &serial)))
}

/// Whether `owner` holds at least one non-revoked certificate. Used to gate
/// new deployments; revocation never disturbs existing leases.
pub fn has_valid_certificate(storage: &dyn Storage, owner: &Addr) -> ContractResult<bool> {
    for item in CERTIFICATES
        .prefix(owner)
        .range(storage, None, None, Order::Ascending)
    {
        let (_, certificate) = item?;
        if certificate.state == CertificateState::Valid {
            return Ok(true);
        }
    }
    Ok(false)
}
