use cosmwasm_std::{Event, Order, Storage, Timestamp};
use cw_storage_plus::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};
use crate::events;

/// A named fixed-duration timer advanced by the scheduler, at most once per
/// block per identifier. A long chain halt therefore drifts the counter
/// behind wall clock; catch-up is deliberately one tick per block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct EpochInfo {
    pub identifier: String,
    /// Wall-clock time the first epoch may start, seconds.
    pub start_time: u64,
    pub duration_seconds: u64,
    pub current_epoch: u64,
    pub current_epoch_start_time: u64,
    pub epoch_counting_started: bool,
}

impl EpochInfo {
    pub fn validate(&self) -> ContractResult<()> {
        if self.identifier.is_empty() {
            return Err(ContractError::EmptyValue {
                kind: "epoch identifier".to_string(),
            });
        }
        if self.duration_seconds == 0 {
            return Err(ContractError::InvalidConfig {
                input: "epoch duration".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

pub const EPOCHS: Map<&str, EpochInfo> = Map::new("epochs");

pub fn register_epoch(storage: &mut dyn Storage, info: &EpochInfo) -> ContractResult<()> {
    info.validate()?;
    if EPOCHS.may_load(storage, info.identifier.as_str())?.is_some() {
        return Err(ContractError::already_exists("epoch", &info.identifier));
    }
    EPOCHS.save(storage, info.identifier.as_str(), info)?;
    Ok(())
}

pub fn load_epoch(storage: &dyn Storage, identifier: &str) -> ContractResult<EpochInfo> {
    EPOCHS
        .may_load(storage, identifier)?
        .ok_or_else(|| ContractError::UnknownEpoch {
            identifier: identifier.to_string(),
        })
}

/// EndBlock pass over every identifier.
pub fn tick_all(storage: &mut dyn Storage, block_time: Timestamp) -> ContractResult<Vec<Event>> {
    let identifiers: Vec<String> = EPOCHS
        .keys(storage, None, None, Order::Ascending)
        .collect::<Result<_, _>>()?;

    let mut out = Vec::new();
    for identifier in identifiers {
        let mut info = EPOCHS.load(storage, identifier.as_str())?;
        let now = block_time.seconds();

        if !info.epoch_counting_started {
            if now >= info.start_time {
                info.epoch_counting_started = true;
                info.current_epoch = 1;
                info.current_epoch_start_time = info.start_time;
                out.push(events::epoch_start(&info.identifier, info.current_epoch));
                EPOCHS.save(storage, identifier.as_str(), &info)?;
            }
            continue;
        }

        if now >= info.current_epoch_start_time + info.duration_seconds {
            out.push(events::epoch_end(&info.identifier, info.current_epoch));
            info.current_epoch += 1;
            info.current_epoch_start_time += info.duration_seconds;
            out.push(events::epoch_start(&info.identifier, info.current_epoch));
            EPOCHS.save(storage, identifier.as_str(), &info)?;
        }
    }
    Ok(out)
}
