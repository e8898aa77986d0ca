use cosmwasm_std::{
    Addr, BankMsg, Coin, CosmosMsg, DepsMut, Env, Event, MessageInfo, Response, Storage, Uint128,
};

use crate::coins::{coin_vec_add, dec_from_uint, floor_to_uint, DecCoin, DecCoins};
use crate::error::{ContractError, ContractResult};
use crate::escrow::settle::{refund_to_account, settle, SettleOutcome};
use crate::escrow::state::{
    load_account, load_payments, save_payments, AccountState, DepositSource, Depositor,
    EscrowAccount, Payment, PaymentState, ACCOUNTS, PAYMENTS,
};
use crate::events;
use crate::ids::AccountId;
use crate::params::{TakeParams, BME_PARAMS};
use crate::utils::apply_bps;
use crate::{bme, market};

pub struct WithdrawOutcome {
    pub msgs: Vec<CosmosMsg>,
    pub withdrawn: Vec<Coin>,
    pub take: Vec<Coin>,
}

pub struct CloseOutcome {
    pub msgs: Vec<CosmosMsg>,
    pub events: Vec<Event>,
}

pub fn account_create(
    storage: &mut dyn Storage,
    id: &AccountId,
    owner: &Addr,
    depositor: &Addr,
    funds: &[Coin],
    source: DepositSource,
    direct: bool,
    height: u64,
) -> ContractResult<()> {
    if ACCOUNTS.may_load(storage, id.key().as_str())?.is_some() {
        return Err(ContractError::already_exists("escrow account", id.to_string()));
    }
    if funds.is_empty() {
        return Err(ContractError::NoFundsSent);
    }
    let balance = DecCoins::from_coins(funds)?;
    let account = EscrowAccount {
        id: id.clone(),
        owner: owner.clone(),
        state: AccountState::Open,
        balance: balance.clone(),
        transferred: DecCoins::new(),
        settled_at: height,
        depositors: vec![Depositor {
            owner: depositor.clone(),
            height,
            source,
            balance,
            direct,
        }],
    };
    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    Ok(())
}

/// Append a depositor entry and re-settle; an overdrawn account absorbs
/// outstanding payment debt before anything else.
pub fn account_deposit(
    storage: &mut dyn Storage,
    id: &AccountId,
    depositor: &Addr,
    funds: &[Coin],
    source: DepositSource,
    direct: bool,
    height: u64,
) -> ContractResult<SettleOutcome> {
    if funds.is_empty() {
        return Err(ContractError::NoFundsSent);
    }
    let mut account = load_account(storage, id)?;
    if account.state == AccountState::Closed {
        return Err(ContractError::invalid_state(
            "escrow account",
            id.to_string(),
            account.state,
        ));
    }
    let amount = DecCoins::from_coins(funds)?;
    account.balance = account.balance.checked_add(&amount)?;
    account.depositors.push(Depositor {
        owner: depositor.clone(),
        height,
        source,
        balance: amount,
        direct,
    });

    let mut payments = load_payments(storage, id)?;
    let outcome = settle(&mut account, &mut payments, height)?;
    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    Ok(outcome)
}

/// Settle an account to `height` and persist the deltas.
pub fn settle_account(
    storage: &mut dyn Storage,
    id: &AccountId,
    height: u64,
) -> ContractResult<SettleOutcome> {
    let mut account = load_account(storage, id)?;
    let mut payments = load_payments(storage, id)?;
    let outcome = settle(&mut account, &mut payments, height)?;
    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    Ok(outcome)
}

pub fn payment_create(
    storage: &mut dyn Storage,
    id: &AccountId,
    xid: &str,
    owner: &Addr,
    rate: DecCoins,
    height: u64,
) -> ContractResult<()> {
    if rate.is_empty() || rate.iter().any(|c| !c.is_positive()) {
        return Err(ContractError::ZeroPaymentRate);
    }

    let mut account = load_account(storage, id)?;
    if account.state == AccountState::Closed {
        return Err(ContractError::invalid_state(
            "escrow account",
            id.to_string(),
            account.state,
        ));
    }
    if PAYMENTS
        .may_load(storage, (id.key().as_str(), xid))?
        .is_some()
    {
        return Err(ContractError::already_exists("payment", xid));
    }

    let mut payments = load_payments(storage, id)?;
    // rate denoms must line up with what the account's other payments draw,
    // or with the deposited denoms for the first payment
    let active: Vec<&Payment> = payments
        .iter()
        .filter(|p| p.state != PaymentState::Closed)
        .collect();
    for coin in rate.iter() {
        let consistent = if active.is_empty() {
            !account.balance.amount_of(&coin.denom).is_zero()
        } else {
            active
                .iter()
                .any(|p| !p.rate.amount_of(&coin.denom).is_zero())
        };
        if !consistent {
            return Err(ContractError::RateDenomMismatch {
                denom: coin.denom.clone(),
            });
        }
    }

    settle(&mut account, &mut payments, height)?;
    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;

    let payment = Payment {
        account: id.clone(),
        xid: xid.to_string(),
        owner: owner.clone(),
        state: PaymentState::Open,
        rate,
        balance: DecCoins::new(),
        unsettled: DecCoins::new(),
        withdrawn: vec![],
        created_at: height,
    };
    PAYMENTS.save(storage, (id.key().as_str(), xid), &payment)?;
    Ok(())
}

/// Move the floored accrued balance of an open payment to its provider,
/// deducting the platform take.
pub fn payment_withdraw(
    storage: &mut dyn Storage,
    take_params: &TakeParams,
    id: &AccountId,
    xid: &str,
    height: u64,
) -> ContractResult<WithdrawOutcome> {
    let mut account = load_account(storage, id)?;
    let mut payments = load_payments(storage, id)?;
    settle(&mut account, &mut payments, height)?;

    let payment = payments
        .iter_mut()
        .find(|p| p.xid == xid)
        .ok_or_else(|| ContractError::not_found("payment", xid))?;
    if payment.state != PaymentState::Open {
        return Err(ContractError::invalid_state("payment", xid, payment.state));
    }

    let outcome = drain_payment(take_params, payment)?;

    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    Ok(outcome)
}

/// Floor a payment's balance into bank coins and build the transfer
/// messages. Mutates the payment; callers persist it.
fn drain_payment(take_params: &TakeParams, payment: &mut Payment) -> ContractResult<WithdrawOutcome> {
    let gross = payment.balance.floor_coins()?;
    if gross.is_empty() {
        return Ok(WithdrawOutcome {
            msgs: vec![],
            withdrawn: vec![],
            take: vec![],
        });
    }

    payment.balance = payment
        .balance
        .checked_sub(&DecCoins::from_coins(&gross)?)?;
    for coin in &gross {
        coin_vec_add(&mut payment.withdrawn, coin);
    }

    let mut net: Vec<Coin> = Vec::new();
    let mut take: Vec<Coin> = Vec::new();
    for coin in &gross {
        let cut = apply_bps(coin.amount, take_params.rate_for(&coin.denom))?;
        if !cut.is_zero() {
            coin_vec_add(&mut take, &Coin::new(cut.u128(), coin.denom.clone()));
        }
        let rest = coin.amount.checked_sub(cut)?;
        if !rest.is_zero() {
            coin_vec_add(&mut net, &Coin::new(rest.u128(), coin.denom.clone()));
        }
    }

    let mut msgs: Vec<CosmosMsg> = Vec::new();
    if !net.is_empty() {
        msgs.push(
            BankMsg::Send {
                to_address: payment.owner.to_string(),
                amount: net,
            }
            .into(),
        );
    }
    if !take.is_empty() {
        msgs.push(
            BankMsg::Send {
                to_address: take_params.platform_address.to_string(),
                amount: take.clone(),
            }
            .into(),
        );
    }
    Ok(WithdrawOutcome {
        msgs,
        withdrawn: gross,
        take,
    })
}

/// Final payout at lease closure: settle, drain whatever accrued balance
/// the payment holds regardless of overdraw state, then close it with the
/// (now fractional) residual returned to the account.
pub fn payment_payout_and_close(
    storage: &mut dyn Storage,
    take_params: &TakeParams,
    id: &AccountId,
    xid: &str,
    height: u64,
) -> ContractResult<WithdrawOutcome> {
    let mut account = load_account(storage, id)?;
    let mut payments = load_payments(storage, id)?;
    settle(&mut account, &mut payments, height)?;

    let payment = payments
        .iter_mut()
        .find(|p| p.xid == xid)
        .ok_or_else(|| ContractError::not_found("payment", xid))?;
    if payment.state == PaymentState::Closed {
        return Err(ContractError::invalid_state("payment", xid, payment.state));
    }

    let outcome = drain_payment(take_params, payment)?;
    let residual = payment.balance.clone();
    payment.balance = DecCoins::new();
    payment.unsettled = DecCoins::new();
    payment.state = PaymentState::Closed;
    refund_to_account(&mut account, &residual)?;

    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    Ok(outcome)
}

/// Close a payment: settle, return the residual balance to the account
/// (newest depositor), forgive unsettled debt.
pub fn payment_close(
    storage: &mut dyn Storage,
    id: &AccountId,
    xid: &str,
    height: u64,
) -> ContractResult<()> {
    let mut account = load_account(storage, id)?;
    let mut payments = load_payments(storage, id)?;
    settle(&mut account, &mut payments, height)?;

    let payment = payments
        .iter_mut()
        .find(|p| p.xid == xid)
        .ok_or_else(|| ContractError::not_found("payment", xid))?;
    if payment.state == PaymentState::Closed {
        return Err(ContractError::invalid_state("payment", xid, payment.state));
    }

    let residual = payment.balance.clone();
    payment.balance = DecCoins::new();
    payment.unsettled = DecCoins::new();
    payment.state = PaymentState::Closed;
    refund_to_account(&mut account, &residual)?;

    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    Ok(())
}

/// Close an account: pay out every live payment, then refund depositors
/// newest-first.
pub fn account_close(
    storage: &mut dyn Storage,
    take_params: &TakeParams,
    id: &AccountId,
    height: u64,
) -> ContractResult<CloseOutcome> {
    let mut account = load_account(storage, id)?;
    if account.state == AccountState::Closed {
        return Err(ContractError::invalid_state(
            "escrow account",
            id.to_string(),
            account.state,
        ));
    }
    let mut payments = load_payments(storage, id)?;
    settle(&mut account, &mut payments, height)?;

    let mut msgs: Vec<CosmosMsg> = Vec::new();
    let mut out_events: Vec<Event> = Vec::new();

    for payment in payments.iter_mut() {
        if payment.state == PaymentState::Closed {
            continue;
        }
        let drained = drain_payment(take_params, payment)?;
        if !drained.withdrawn.is_empty() {
            out_events.push(events::payment_withdrawn(
                id,
                &payment.xid,
                &drained.withdrawn,
                &drained.take,
            ));
        }
        msgs.extend(drained.msgs);

        let residual = payment.balance.clone();
        payment.balance = DecCoins::new();
        payment.unsettled = DecCoins::new();
        payment.state = PaymentState::Closed;
        refund_to_account(&mut account, &residual)?;
    }

    // refunds run newest depositor first
    for depositor in account.depositors.iter_mut().rev() {
        let refund = depositor.balance.floor_coins()?;
        if refund.is_empty() {
            continue;
        }
        let refunded = DecCoins::from_coins(&refund)?;
        depositor.balance = depositor.balance.checked_sub(&refunded)?;
        account.balance = account.balance.checked_sub(&refunded)?;
        msgs.push(
            BankMsg::Send {
                to_address: depositor.owner.to_string(),
                amount: refund,
            }
            .into(),
        );
    }

    account.state = AccountState::Closed;
    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    save_payments(storage, id, &payments)?;
    out_events.push(events::account_closed(id));

    Ok(CloseOutcome {
        msgs,
        events: out_events,
    })
}

/// How much of `denom` held for `owner` in this account can still be
/// converted, floored to a bank-legal amount.
pub fn convertible_amount(
    storage: &dyn Storage,
    id: &AccountId,
    owner: &Addr,
    denom: &str,
    requested: Uint128,
) -> ContractResult<Uint128> {
    let Some(account) = ACCOUNTS.may_load(storage, id.key().as_str())? else {
        return Ok(Uint128::zero());
    };
    if account.state == AccountState::Closed {
        return Ok(Uint128::zero());
    }
    let mut available = DecCoins::new();
    for depositor in account.depositors.iter().filter(|d| &d.owner == owner) {
        let held = depositor.balance.amount_of(denom);
        if held.is_zero() || held.is_negative() {
            continue;
        }
        available.add(&DecCoin::new(denom, held))?;
    }
    let floored = floor_to_uint(available.amount_of(denom))?;
    Ok(floored.min(requested))
}

/// Rewrite an account's depositor balances after a deposit conversion: the
/// burned collateral leaves, the minted stable credits land in the same
/// owner's entries (newest first).
pub fn apply_deposit_convert(
    storage: &mut dyn Storage,
    id: &AccountId,
    owner: &Addr,
    burned: &Coin,
    minted: &Coin,
) -> ContractResult<()> {
    let mut account = load_account(storage, id)?;
    let mut remaining = dec_from_uint(burned.amount)?;

    for depositor in account
        .depositors
        .iter_mut()
        .rev()
        .filter(|d| &d.owner == owner)
    {
        if remaining.is_zero() {
            break;
        }
        let held = depositor.balance.amount_of(&burned.denom);
        if held.is_zero() || held.is_negative() {
            continue;
        }
        let take = if held >= remaining { remaining } else { held };
        depositor
            .balance
            .sub(&DecCoin::new(burned.denom.clone(), take))?;
        remaining = remaining.checked_sub(take)?;
    }
    if !remaining.is_zero() {
        return Err(ContractError::InsufficientFunds {
            available: account.balance.to_string(),
            required: burned.amount.to_string(),
        });
    }

    let burned_dec = DecCoins::from_coins(&[burned.clone()])?;
    let minted_dec = DecCoins::from_coins(std::slice::from_ref(minted))?;
    account.balance = account.balance.checked_sub(&burned_dec)?;
    account.balance = account.balance.checked_add(&minted_dec)?;

    // the credits land in the newest entry this owner still has
    let newest = account
        .depositors
        .iter_mut()
        .rev()
        .find(|d| &d.owner == owner)
        .ok_or_else(|| ContractError::not_found("depositor", owner.as_str()))?;
    newest.balance = newest.balance.checked_add(&minted_dec)?;

    ACCOUNTS.save(storage, id.key().as_str(), &account)?;
    Ok(())
}

/// Handler for the external deposit message. A deposit that reopens an
/// overdrawn account resumes the marketplace entities that were paused by
/// it; a non-direct deposit of the collateral denom is queued for
/// conversion into stable credits.
pub fn execute_account_deposit(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    id: AccountId,
    source: DepositSource,
    direct: bool,
) -> ContractResult<Response> {
    let height = env.block.height;
    let outcome = account_deposit(
        deps.storage,
        &id,
        &info.sender,
        &info.funds,
        source,
        direct,
        height,
    )?;

    let amount = DecCoins::from_coins(&info.funds)?;
    let mut response = Response::new()
        .add_attribute("action", "account_deposit")
        .add_event(events::account_deposit(&id, &amount));

    if outcome.reopened {
        let resumed = market::execute::on_account_reopened(deps.storage, &id, height)?;
        response = response.add_events(resumed);
        response = response.add_event(events::account_reopened(&id));
    }

    if !direct {
        let params = BME_PARAMS.load(deps.storage)?;
        for coin in &info.funds {
            if coin.denom == params.collateral_denom {
                let queued = bme::execute::enqueue_deposit_convert(
                    deps.storage,
                    &info.sender,
                    &id,
                    coin,
                    height,
                )?;
                response = response.add_event(queued);
            }
        }
    }

    Ok(response)
}
