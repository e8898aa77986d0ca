use cosmwasm_std::{Decimal, DepsMut, Env, MessageInfo, Response};

use crate::error::{ContractError, ContractResult};
use crate::events;
use crate::oracle::state::{pair_key, PriceSample, SourceLiveness, SAMPLES, SOURCE_LIVENESS};
use crate::params::ORACLE_PARAMS;
use crate::utils::validate_denom;

pub fn execute_add_price_entry(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    denom: String,
    base_denom: String,
    price: Decimal,
    timestamp: Option<u64>,
) -> ContractResult<Response> {
    let params = ORACLE_PARAMS.load(deps.storage)?;
    let source_idx = params
        .source_idx(&info.sender)
        .ok_or_else(|| ContractError::UnknownPriceSource {
            address: info.sender.to_string(),
        })?;

    validate_denom(&denom)?;
    validate_denom(&base_denom)?;
    if price.is_zero() {
        return Err(ContractError::NonPositiveAmount {
            kind: "price".to_string(),
        });
    }

    let height = env.block.height;
    let timestamp = timestamp.unwrap_or_else(|| env.block.time.seconds());
    let pair = pair_key(&denom, &base_denom);

    SAMPLES.save(
        deps.storage,
        (pair.as_str(), source_idx, height),
        &PriceSample { price, timestamp },
    )?;

    // a previously stale source recovers on its next accepted sample
    let previous = SOURCE_LIVENESS.may_load(deps.storage, (pair.as_str(), source_idx))?;
    let recovered = previous.as_ref().map(|l| l.stale).unwrap_or(false);
    SOURCE_LIVENESS.save(
        deps.storage,
        (pair.as_str(), source_idx),
        &SourceLiveness {
            last_height: height,
            warned: false,
            stale: false,
        },
    )?;

    let mut response = Response::new()
        .add_attribute("action", "add_price_entry")
        .add_event(events::price_data(
            &denom,
            &base_denom,
            source_idx,
            &price.to_string(),
        ));
    if recovered {
        response = response.add_event(events::price_recovered(&denom, &base_denom, source_idx));
    }
    Ok(response)
}
