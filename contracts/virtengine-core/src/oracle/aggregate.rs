use cosmwasm_std::{Decimal, Event, Order, Storage};
use cw_storage_plus::Bound;

use crate::error::ContractResult;
use crate::events;
use crate::oracle::state::{
    pair_key, AggregatedPrice, CachedPrice, PriceSample, PRICE_CACHE, SAMPLES, SOURCE_LIVENESS,
};
use crate::params::OracleParams;
use crate::utils::dec_to_bps;

/// Latest sample per source within the TWAP window, excluding stale sources.
fn window_samples(
    storage: &dyn Storage,
    params: &OracleParams,
    pair: &str,
    height: u64,
) -> ContractResult<Vec<(u32, u64, PriceSample)>> {
    let window_start = height.saturating_sub(params.twap_window);
    let mut out = Vec::new();
    for source_idx in 0..params.sources.len() as u32 {
        let latest = SAMPLES
            .prefix((pair, source_idx))
            .range(
                storage,
                Some(Bound::inclusive(window_start)),
                Some(Bound::inclusive(height)),
                Order::Descending,
            )
            .next()
            .transpose()?;
        if let Some((sample_height, sample)) = latest {
            if height.saturating_sub(sample_height) <= params.max_price_staleness_blocks {
                out.push((source_idx, sample_height, sample));
            }
        }
    }
    Ok(out)
}

/// Aggregate the pair at `height`. Returns `None` when fewer than
/// `min_price_sources` sources contributed a usable sample.
pub fn aggregate(
    storage: &dyn Storage,
    params: &OracleParams,
    denom: &str,
    base_denom: &str,
    height: u64,
) -> ContractResult<Option<AggregatedPrice>> {
    let pair = pair_key(denom, base_denom);
    let samples = window_samples(storage, params, &pair, height)?;
    if (samples.len() as u32) < params.min_price_sources {
        return Ok(None);
    }

    let mut prices: Vec<Decimal> = samples.iter().map(|(_, _, s)| s.price).collect();
    prices.sort();
    let min = prices[0];
    let max = prices[prices.len() - 1];
    let median = if prices.len() % 2 == 1 {
        prices[prices.len() / 2]
    } else {
        let lo = prices[prices.len() / 2 - 1];
        let hi = prices[prices.len() / 2];
        lo.checked_add(hi)?
            .checked_div(Decimal::from_ratio(2u128, 1u128))?
    };
    let deviation_bps = if min.is_zero() {
        u32::MAX
    } else {
        dec_to_bps(max.checked_sub(min)?.checked_div(min)?)
    };

    // TWAP weighs the full in-window series of every contributing source,
    // not just the newest sample
    let window_start = height.saturating_sub(params.twap_window);
    let mut series: Vec<(u32, u64, PriceSample)> = Vec::new();
    for (source_idx, _, _) in &samples {
        for item in SAMPLES.prefix((pair.as_str(), *source_idx)).range(
            storage,
            Some(Bound::inclusive(window_start)),
            Some(Bound::inclusive(height)),
            Order::Ascending,
        ) {
            let (sample_height, sample) = item?;
            series.push((*source_idx, sample_height, sample));
        }
    }
    let twap = block_weighted_mean(&series, height)?;
    let timestamp = samples
        .iter()
        .map(|(_, _, s)| s.timestamp)
        .max()
        .unwrap_or_default();

    let n_sources = samples.len() as u32;
    let healthy =
        n_sources >= params.min_price_sources && deviation_bps <= params.max_price_deviation_bps;

    Ok(Some(AggregatedPrice {
        denom: denom.to_string(),
        base_denom: base_denom.to_string(),
        twap,
        median,
        min,
        max,
        deviation_bps,
        n_sources,
        timestamp,
        healthy,
    }))
}

/// Block-weighted mean: each height's average price applies until the next
/// reported height, the final one until the current block inclusive.
fn block_weighted_mean(samples: &[(u32, u64, PriceSample)], height: u64) -> ContractResult<Decimal> {
    let mut by_height: Vec<(u64, Decimal, u32)> = Vec::new();
    let mut sorted: Vec<(u64, Decimal)> = samples
        .iter()
        .map(|(_, h, s)| (*h, s.price))
        .collect();
    sorted.sort_by_key(|(h, _)| *h);
    for (h, price) in sorted {
        match by_height.last_mut() {
            Some((last_h, sum, count)) if *last_h == h => {
                *sum = sum.checked_add(price)?;
                *count += 1;
            }
            _ => by_height.push((h, price, 1)),
        }
    }

    let first_height = by_height[0].0;
    let total_span = height - first_height + 1;
    let mut weighted = Decimal::zero();
    for (idx, (h, sum, count)) in by_height.iter().enumerate() {
        let avg = sum.checked_div(Decimal::from_ratio(*count as u128, 1u128))?;
        let until = by_height
            .get(idx + 1)
            .map(|(next_h, _, _)| *next_h)
            .unwrap_or(height + 1);
        let weight = until - h;
        weighted =
            weighted.checked_add(avg.checked_mul(Decimal::from_ratio(weight as u128, 1u128))?)?;
    }
    Ok(weighted.checked_div(Decimal::from_ratio(total_span as u128, 1u128))?)
}

/// Recompute and cache the aggregation for this block.
pub fn refresh_cache(
    storage: &mut dyn Storage,
    params: &OracleParams,
    denom: &str,
    base_denom: &str,
    height: u64,
) -> ContractResult<Option<AggregatedPrice>> {
    let price = aggregate(storage, params, denom, base_denom, height)?;
    PRICE_CACHE.save(
        storage,
        pair_key(denom, base_denom).as_str(),
        &CachedPrice {
            height,
            price: price.clone(),
        },
    )?;
    Ok(price)
}

/// Cached aggregation when fresh for `height`, otherwise computed on demand.
pub fn current_price(
    storage: &dyn Storage,
    params: &OracleParams,
    denom: &str,
    base_denom: &str,
    height: u64,
) -> ContractResult<Option<AggregatedPrice>> {
    let pair = pair_key(denom, base_denom);
    if let Some(cached) = PRICE_CACHE.may_load(storage, pair.as_str())? {
        if cached.height == height {
            return Ok(cached.price);
        }
    }
    aggregate(storage, params, denom, base_denom, height)
}

/// Staleness lifecycle sweep for one pair: warn once when a source is close
/// to its staleness bound, mark it staled on crossing.
pub fn sweep_liveness(
    storage: &mut dyn Storage,
    params: &OracleParams,
    denom: &str,
    base_denom: &str,
    height: u64,
) -> ContractResult<Vec<Event>> {
    let pair = pair_key(denom, base_denom);
    let mut out = Vec::new();
    for source_idx in 0..params.sources.len() as u32 {
        let key = (pair.as_str(), source_idx);
        let Some(mut liveness) = SOURCE_LIVENESS.may_load(storage, key)? else {
            continue;
        };
        if liveness.stale {
            continue;
        }
        let silent_for = height.saturating_sub(liveness.last_height);
        if silent_for > params.max_price_staleness_blocks {
            liveness.stale = true;
            out.push(events::price_staled(denom, base_denom, source_idx));
            SOURCE_LIVENESS.save(storage, key, &liveness)?;
        } else if !liveness.warned
            && params.max_price_staleness_blocks - silent_for <= params.stale_warning_blocks
        {
            liveness.warned = true;
            out.push(events::price_stale_warning(denom, base_denom, source_idx));
            SOURCE_LIVENESS.save(storage, key, &liveness)?;
        }
    }
    Ok(out)
}
