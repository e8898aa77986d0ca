use cosmwasm_std::{Coin, Event};

use crate::coins::DecCoins;
use crate::ids::{AccountId, BidId, DeploymentId, GroupId, OrderId};

fn deployment_attrs(event: Event, id: &DeploymentId) -> Event {
    event
        .add_attribute("owner", id.owner.to_string())
        .add_attribute("dseq", id.dseq.to_string())
}

fn group_attrs(event: Event, id: &GroupId) -> Event {
    deployment_attrs(event, &id.deployment()).add_attribute("gseq", id.gseq.to_string())
}

fn order_attrs(event: Event, id: &OrderId) -> Event {
    group_attrs(event, &id.group()).add_attribute("oseq", id.oseq.to_string())
}

fn bid_attrs(event: Event, id: &BidId) -> Event {
    order_attrs(event, &id.order())
        .add_attribute("provider", id.provider.to_string())
        .add_attribute("bseq", id.bseq.to_string())
}

pub fn deployment_created(id: &DeploymentId) -> Event {
    deployment_attrs(Event::new("deployment_created"), id)
}

pub fn deployment_updated(id: &DeploymentId) -> Event {
    deployment_attrs(Event::new("deployment_updated"), id)
}

pub fn deployment_closed(id: &DeploymentId) -> Event {
    deployment_attrs(Event::new("deployment_closed"), id)
}

pub fn group_started(id: &GroupId) -> Event {
    group_attrs(Event::new("group_started"), id)
}

pub fn group_paused(id: &GroupId, reason: &str) -> Event {
    group_attrs(Event::new("group_paused"), id).add_attribute("reason", reason)
}

pub fn group_closed(id: &GroupId) -> Event {
    group_attrs(Event::new("group_closed"), id)
}

pub fn order_created(id: &OrderId) -> Event {
    order_attrs(Event::new("order_created"), id)
}

pub fn order_closed(id: &OrderId) -> Event {
    order_attrs(Event::new("order_closed"), id)
}

pub fn bid_created(id: &BidId, price: &str) -> Event {
    bid_attrs(Event::new("bid_created"), id).add_attribute("price", price)
}

pub fn bid_closed(id: &BidId, state: &str) -> Event {
    bid_attrs(Event::new("bid_closed"), id).add_attribute("state", state)
}

pub fn lease_created(id: &BidId, price: &str) -> Event {
    bid_attrs(Event::new("lease_created"), id).add_attribute("price", price)
}

pub fn lease_closed(id: &BidId, reason: &str) -> Event {
    bid_attrs(Event::new("lease_closed"), id).add_attribute("reason", reason)
}

pub fn account_created(id: &AccountId, deposit: &DecCoins) -> Event {
    Event::new("escrow_account_created")
        .add_attribute("account", id.to_string())
        .add_attribute("deposit", deposit.to_string())
}

pub fn account_deposit(id: &AccountId, amount: &DecCoins) -> Event {
    Event::new("escrow_account_deposit")
        .add_attribute("account", id.to_string())
        .add_attribute("amount", amount.to_string())
}

pub fn account_overdrawn(id: &AccountId) -> Event {
    Event::new("escrow_account_overdrawn").add_attribute("account", id.to_string())
}

pub fn account_reopened(id: &AccountId) -> Event {
    Event::new("escrow_account_reopened").add_attribute("account", id.to_string())
}

pub fn account_closed(id: &AccountId) -> Event {
    Event::new("escrow_account_closed").add_attribute("account", id.to_string())
}

pub fn payment_withdrawn(id: &AccountId, xid: &str, coins: &[Coin], take: &[Coin]) -> Event {
    let fmt = |coins: &[Coin]| {
        coins
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    Event::new("payment_withdrawn")
        .add_attribute("account", id.to_string())
        .add_attribute("payment", xid.to_string())
        .add_attribute("amount", fmt(coins))
        .add_attribute("take", fmt(take))
}

pub fn ledger_record_executed(key: &str, burned: &Coin, minted: &Coin) -> Event {
    Event::new("ledger_record_executed")
        .add_attribute("record", key.to_string())
        .add_attribute("burned", burned.to_string())
        .add_attribute("minted", minted.to_string())
}

pub fn mint_status_change(previous: &str, new: &str, cr_bps: u32) -> Event {
    Event::new("mint_status_change")
        .add_attribute("previous", previous.to_string())
        .add_attribute("new", new.to_string())
        .add_attribute("cr_bps", cr_bps.to_string())
}

pub fn vault_seeded(amount: &Coin, source: &str) -> Event {
    Event::new("vault_seeded")
        .add_attribute("amount", amount.to_string())
        .add_attribute("source", source.to_string())
}

pub fn price_data(denom: &str, base_denom: &str, source_idx: u32, price: &str) -> Event {
    Event::new("price_data")
        .add_attribute("denom", denom.to_string())
        .add_attribute("base_denom", base_denom.to_string())
        .add_attribute("source_idx", source_idx.to_string())
        .add_attribute("price", price.to_string())
}

pub fn price_stale_warning(denom: &str, base_denom: &str, source_idx: u32) -> Event {
    Event::new("price_stale_warning")
        .add_attribute("denom", denom.to_string())
        .add_attribute("base_denom", base_denom.to_string())
        .add_attribute("source_idx", source_idx.to_string())
}

pub fn price_staled(denom: &str, base_denom: &str, source_idx: u32) -> Event {
    Event::new("price_staled")
        .add_attribute("denom", denom.to_string())
        .add_attribute("base_denom", base_denom.to_string())
        .add_attribute("source_idx", source_idx.to_string())
}

pub fn price_recovered(denom: &str, base_denom: &str, source_idx: u32) -> Event {
    Event::new("price_recovered")
        .add_attribute("denom", denom.to_string())
        .add_attribute("base_denom", base_denom.to_string())
        .add_attribute("source_idx", source_idx.to_string())
}

pub fn epoch_start(identifier: &str, epoch: u64) -> Event {
    Event::new("epoch_start")
        .add_attribute("identifier", identifier.to_string())
        .add_attribute("epoch", epoch.to_string())
}

pub fn epoch_end(identifier: &str, epoch: u64) -> Event {
    Event::new("epoch_end")
        .add_attribute("identifier", identifier.to_string())
        .add_attribute("epoch", epoch.to_string())
}

pub fn certificate_created(owner: &str, serial: &str) -> Event {
    Event::new("certificate_created")
        .add_attribute("owner", owner.to_string())
        .add_attribute("serial", serial.to_string())
}

pub fn certificate_revoked(owner: &str, serial: &str) -> Event {
    Event::new("certificate_revoked")
        .add_attribute("owner", owner.to_string())
        .add_attribute("serial", serial.to_string())
}

pub fn provider_created(owner: &str) -> Event {
    Event::new("provider_created").add_attribute("owner", owner.to_string())
}

pub fn provider_updated(owner: &str) -> Event {
    Event::new("provider_updated").add_attribute("owner", owner.to_string())
}

pub fn provider_deleted(owner: &str) -> Event {
    Event::new("provider_deleted").add_attribute("owner", owner.to_string())
}

pub fn provider_attributes_signed(owner: &str, auditor: &str) -> Event {
    Event::new("provider_attributes_signed")
        .add_attribute("owner", owner.to_string())
        .add_attribute("auditor", auditor.to_string())
}

pub fn provider_attributes_deleted(owner: &str, auditor: &str) -> Event {
    Event::new("provider_attributes_deleted")
        .add_attribute("owner", owner.to_string())
        .add_attribute("auditor", auditor.to_string())
}
