use cosmwasm_std::{Addr, DepsMut, MessageInfo, Response};
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};
use crate::events;
use crate::gates::Attribute;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct ProviderInfo {
    pub email: String,
    pub website: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Provider {
    pub owner: Addr,
    pub host_uri: String,
    pub attributes: Vec<Attribute>,
    pub info: ProviderInfo,
}

pub const PROVIDERS: Map<&Addr, Provider> = Map::new("providers");

fn validate_host_uri(host_uri: &str) -> ContractResult<()> {
    if host_uri.is_empty() {
        return Err(ContractError::EmptyValue {
            kind: "host_uri".to_string(),
        });
    }
    if !host_uri.starts_with("https://") && !host_uri.starts_with("http://") {
        return Err(ContractError::InvalidConfig {
            input: "host_uri".to_string(),
            reason: "must be an http(s) URI".to_string(),
        });
    }
    Ok(())
}

fn validate_attributes(attributes: &[Attribute]) -> ContractResult<()> {
    for (idx, attribute) in attributes.iter().enumerate() {
        if attribute.key.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "attribute key".to_string(),
            });
        }
        if attributes[..idx].iter().any(|a| a.key == attribute.key) {
            return Err(ContractError::already_exists("attribute", &attribute.key));
        }
    }
    Ok(())
}

pub fn execute_create_provider(
    deps: DepsMut,
    info: MessageInfo,
    host_uri: String,
    attributes: Vec<Attribute>,
    provider_info: ProviderInfo,
) -> ContractResult<Response> {
    validate_host_uri(&host_uri)?;
    validate_attributes(&attributes)?;
    if PROVIDERS.may_load(deps.storage, &info.sender)?.is_some() {
        return Err(ContractError::already_exists(
            "provider",
            info.sender.as_str(),
        ));
    }
    let provider = Provider {
        owner: info.sender.clone(),
        host_uri,
        attributes,
        info: provider_info,
    };
    PROVIDERS.save(deps.storage, &info.sender, &provider)?;

    Ok(Response::new()
        .add_attribute("action", "create_provider")
        .add_event(events::provider_created(info.sender.as_str())))
}

pub fn execute_update_provider(
    deps: DepsMut,
    info: MessageInfo,
    host_uri: Option<String>,
    attributes: Option<Vec<Attribute>>,
    provider_info: Option<ProviderInfo>,
) -> ContractResult<Response> {
    let mut provider = PROVIDERS
        .may_load(deps.storage, &info.sender)?
        .ok_or_else(|| ContractError::not_found("provider", info.sender.as_str()))?;

    if let Some(host_uri) = host_uri {
        validate_host_uri(&host_uri)?;
        provider.host_uri = host_uri;
    }
    if let Some(attributes) = attributes {
        validate_attributes(&attributes)?;
        provider.attributes = attributes;
    }
    if let Some(provider_info) = provider_info {
        provider.info = provider_info;
    }
    PROVIDERS.save(deps.storage, &info.sender, &provider)?;

    Ok(Response::new()
        .add_attribute("action", "update_provider")
        .add_event(events::provider_updated(info.sender.as_str())))
}

/// Deleting a provider is refused while the provider still participates in
/// the marketplace; the caller checks that before calling here.
pub fn delete_provider(deps: DepsMut, owner: &Addr) -> ContractResult<Response> {
    if PROVIDERS.may_load(deps.storage, owner)?.is_none() {
        return Err(ContractError::not_found("provider", owner.as_str()));
    }
    PROVIDERS.remove(deps.storage, owner);

    Ok(Response::new()
        .add_attribute("action", "delete_provider")
        .add_event(events::provider_deleted(owner.as_str())))
}
