use cosmwasm_std::{Addr, Storage};

use crate::error::ContractResult;
use crate::gates::audit::auditor_covers;
use crate::gates::{attributes_satisfied, provider::Provider};
use crate::market::state::{Bid, BidState, PlacementRequirements};

/// Whether a provider satisfies an order's placement requirements: every
/// required attribute present, and the auditor predicate met. When `all_of`
/// is non-empty it takes precedence and `any_of` is ignored.
pub fn provider_matches(
    storage: &dyn Storage,
    provider: &Provider,
    requirements: &PlacementRequirements,
) -> ContractResult<bool> {
    if !attributes_satisfied(&requirements.attributes, &provider.attributes) {
        return Ok(false);
    }

    let required = &requirements.attributes;
    let signed_by = &requirements.signed_by;

    if !signed_by.all_of.is_empty() {
        for auditor in &signed_by.all_of {
            let auditor = Addr::unchecked(auditor.as_str());
            if !auditor_covers(storage, &provider.owner, &auditor, required)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if !signed_by.any_of.is_empty() {
        for auditor in &signed_by.any_of {
            let auditor = Addr::unchecked(auditor.as_str());
            if auditor_covers(storage, &provider.owner, &auditor, required)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    Ok(true)
}

/// Reverse-auction winner among open bids: lowest price, then lowest bseq,
/// then lexicographic provider address.
pub fn pick_winner(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .filter(|b| b.state == BidState::Open)
        .min_by(|a, b| {
            a.price
                .amount
                .cmp(&b.price.amount)
                .then_with(|| a.id.bseq.cmp(&b.id.bseq))
                .then_with(|| a.id.provider.as_str().cmp(b.id.provider.as_str()))
        })
}
