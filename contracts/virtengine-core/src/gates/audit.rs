use cosmwasm_std::{Addr, DepsMut, MessageInfo, Response, Storage};
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};
use crate::events;
use crate::gates::{attributes_satisfied, Attribute};

/// Attributes an auditor has signed for a provider.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AuditedAttributes {
    pub owner: Addr,
    pub auditor: Addr,
    pub attributes: Vec<Attribute>,
}

pub const AUDITED_ATTRIBUTES: Map<(&Addr, &Addr), AuditedAttributes> = Map::new("audited_attrs");

pub fn execute_sign_provider_attributes(
    deps: DepsMut,
    info: MessageInfo,
    owner: String,
    attributes: Vec<Attribute>,
) -> ContractResult<Response> {
    let owner = deps.api.addr_validate(&owner)?;
    if attributes.is_empty() {
        return Err(ContractError::EmptyValue {
            kind: "attributes".to_string(),
        });
    }

    let key = (&owner, &info.sender);
    let record = match AUDITED_ATTRIBUTES.may_load(deps.storage, key)? {
        Some(mut existing) => {
            // re-signing replaces values for the same keys
            for attribute in attributes {
                match existing
                    .attributes
                    .iter_mut()
                    .find(|a| a.key == attribute.key)
                {
                    Some(found) => found.value = attribute.value,
                    None => existing.attributes.push(attribute),
                }
            }
            existing
        }
        None => AuditedAttributes {
            owner: owner.clone(),
            auditor: info.sender.clone(),
            attributes,
        },
    };
    AUDITED_ATTRIBUTES.save(deps.storage, key, &record)?;

    Ok(Response::new()
        .add_attribute("action", "sign_provider_attributes")
        .add_event(events::provider_attributes_signed(
            owner.as_str(),
            info.sender.as_str(),
        )))
}

pub fn execute_delete_provider_attributes(
    deps: DepsMut,
    info: MessageInfo,
    owner: String,
    keys: Vec<String>,
) -> ContractResult<Response> {
    let owner = deps.api.addr_validate(&owner)?;
    let key = (&owner, &info.sender);
    let mut record = AUDITED_ATTRIBUTES
        .may_load(deps.storage, key)?
        .ok_or_else(|| ContractError::not_found("audited attributes", owner.as_str()))?;

    if keys.is_empty() {
        AUDITED_ATTRIBUTES.remove(deps.storage, key);
    } else {
        record.attributes.retain(|a| !keys.contains(&a.key));
        if record.attributes.is_empty() {
            AUDITED_ATTRIBUTES.remove(deps.storage, key);
        } else {
            AUDITED_ATTRIBUTES.save(deps.storage, key, &record)?;
        }
    }

    Ok(Response::new()
        .add_attribute("action", "delete_provider_attributes")
        .add_event(events::provider_attributes_deleted(
            owner.as_str(),
            info.sender.as_str(),
        )))
}

/// Whether `auditor` has signed attributes for `provider` covering every
/// pair in `required`.
pub fn auditor_covers(
    storage: &dyn Storage,
    provider: &Addr,
    auditor: &Addr,
    required: &[Attribute],
) -> ContractResult<bool> {
    match AUDITED_ATTRIBUTES.may_load(storage, (provider, auditor))? {
        Some(record) => Ok(attributes_satisfied(required, &record.attributes)),
        None => Ok(false),
    }
}
