use cosmwasm_std::{Decimal, SubMsgResponse, Uint128};
use neutron_std::types::osmosis::tokenfactory::v1beta1::MsgCreateDenomResponse;
use prost::Message;

use crate::error::{ContractError, ContractResult};

/// Validate a coin denom: native denoms are short lowercase identifiers,
/// IBC denoms are `ibc/` followed by an uppercase hex hash, factory denoms
/// are `factory/{creator}/{subdenom}`.
pub fn validate_denom(denom: &str) -> ContractResult<()> {
    let invalid = |reason: &str| {
        Err(ContractError::InvalidDenom {
            denom: denom.to_string(),
            reason: reason.to_string(),
        })
    };

    if denom.is_empty() {
        return invalid("must not be empty");
    }

    if let Some(hash) = denom.strip_prefix("ibc/") {
        if denom.len() != 68 {
            return invalid("expected length of 68 chars");
        }
        // c.is_ascii_hexdigit() would also accept lowercase characters
        if !hash.chars().all(|c| matches!(c, '0'..='9' | 'A'..='F')) {
            return invalid("invalid denom hash");
        }
        return Ok(());
    }

    if denom.starts_with("factory/") {
        if denom.split('/').count() != 3 {
            return invalid("expected factory/{creator}/{subdenom}");
        }
        return Ok(());
    }

    if denom.len() < 3 || denom.len() > 128 {
        return invalid("expected between 3 and 128 chars");
    }
    if !denom
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return invalid("expected lowercase ascii");
    }
    Ok(())
}

pub fn validate_bps(value: u32, input: &str) -> ContractResult<()> {
    if value > 10_000 {
        return Err(ContractError::InvalidConfig {
            input: input.to_string(),
            reason: format!("basis points must be <= 10000, got {value}"),
        });
    }
    Ok(())
}

/// `amount · bps / 10000`, floored.
pub fn apply_bps(amount: Uint128, bps: u32) -> ContractResult<Uint128> {
    Ok(amount.checked_mul_floor(Decimal::from_ratio(bps, 10_000u128))?)
}

/// Pull the created denom out of a tokenfactory reply.
pub fn extract_denom(result: &SubMsgResponse) -> ContractResult<String> {
    let response_data = result
        .msg_responses
        .first()
        .ok_or(ContractError::NoResponseData)?
        .value
        .clone();

    let response = MsgCreateDenomResponse::decode(response_data.as_slice())
        .map_err(|_| ContractError::DecodingError)?;

    Ok(response.new_token_denom)
}

/// A decimal ratio expressed in basis points, floored, clamped to `u32`.
pub fn dec_to_bps(value: Decimal) -> u32 {
    let scaled = Uint128::new(10_000).mul_floor(value);
    u32::try_from(scaled.u128()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("uakt", true; "native")]
    #[test_case("uact2", true; "native with digit")]
    #[test_case("Uakt", false; "uppercase native")]
    #[test_case("ab", false; "too short")]
    #[test_case("factory/virt1abc/uact", true; "factory")]
    #[test_case("factory/uact", false; "factory missing creator")]
    #[test_case(
        "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2",
        true;
        "ibc denom"
    )]
    #[test_case("ibc/27394fb0", false; "ibc wrong length")]
    fn denoms(denom: &str, ok: bool) {
        assert_eq!(validate_denom(denom).is_ok(), ok);
    }

    #[test]
    fn bps_math() {
        assert_eq!(
            apply_bps(Uint128::new(10_000), 250).unwrap(),
            Uint128::new(250)
        );
        assert_eq!(dec_to_bps(Decimal::percent(95)), 9_500);
        assert!(validate_bps(10_001, "rate").is_err());
    }
}
