// src/ledger.rs
//! Buy, sell and cash rules. Each rule looks at an [`Account`] snapshot and either
//! rejects the request or describes the complete change as a [`LedgerMutation`];
//! `db::Store::apply` writes that change in one database transaction.
use crate::error::AppError;
use crate::forms::{whole_shares, BuyOrder, CashAdjustment, Symbol};
use crate::models::Holding;
use rust_decimal::Decimal;

/// What the rules may look at: the cash balance and the holding for the traded symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub cash: Decimal,
    pub holding: Option<Holding>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoldingChange {
    Open {
        name: String,
        shares: i64,
        cost: Decimal,
    },
    /// The share count and accumulated cost the existing holding ends up with.
    Update { shares: i64, cost: Decimal },
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: Symbol,
    pub holding: HoldingChange,
    /// Logged share delta: positive for a buy, negative for a sell.
    pub shares: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerMutation {
    pub cash_delta: Decimal,
    pub trade: Option<Trade>,
}

pub fn plan_buy(
    account: &Account,
    order: &BuyOrder,
    name: &str,
    price: Decimal,
) -> Result<LedgerMutation, AppError> {
    let cost = price
        .checked_mul(Decimal::from(order.shares))
        .ok_or_else(|| AppError::rule("Not enough cash"))?;

    // Strictly less: a purchase costing exactly the whole balance is refused.
    if cost >= account.cash {
        return Err(AppError::rule("Not enough cash"));
    }

    let holding = match &account.holding {
        None => HoldingChange::Open {
            name: name.to_string(),
            shares: order.shares,
            cost,
        },
        Some(held) => {
            let shares = held
                .shares
                .checked_add(order.shares)
                .ok_or_else(|| AppError::invalid("Enter a valid amount of shares"))?;
            let cost = held
                .price
                .checked_add(cost)
                .ok_or_else(|| AppError::invalid("Enter a valid amount of shares"))?;
            HoldingChange::Update { shares, cost }
        }
    };

    Ok(LedgerMutation {
        cash_delta: -cost,
        trade: Some(Trade {
            symbol: order.symbol.clone(),
            holding,
            shares: order.shares,
            total: cost,
        }),
    })
}

/// Validates a sell request against the current holding, in the order the checks are
/// reported to the user. Returns the whole number of shares to sell.
pub fn check_sell(holding: Option<&Holding>, amount: Decimal) -> Result<i64, AppError> {
    let holding = holding.ok_or_else(|| AppError::invalid("Enter correct symbol"))?;
    if amount.is_zero() {
        return Err(AppError::invalid("Enter amount of shares"));
    }
    if amount > Decimal::from(holding.shares) {
        return Err(AppError::rule("Not enough shares"));
    }
    whole_shares(amount).ok_or_else(|| AppError::invalid("Enter a positive integer"))
}

pub fn plan_sell(
    account: &Account,
    symbol: &Symbol,
    amount: Decimal,
    price: Decimal,
) -> Result<LedgerMutation, AppError> {
    let shares = check_sell(account.holding.as_ref(), amount)?;
    let held = account
        .holding
        .as_ref()
        .ok_or_else(|| AppError::invalid("Enter correct symbol"))?;
    let proceeds = price
        .checked_mul(Decimal::from(shares))
        .ok_or_else(|| AppError::Internal(format!("sale value overflow for {}", symbol)))?;

    // check_sell bounds `shares` by the held count, so the subtraction cannot underflow.
    let holding = if shares == held.shares {
        HoldingChange::Close
    } else {
        let cost = held
            .price
            .checked_sub(proceeds)
            .ok_or_else(|| AppError::Internal(format!("cost basis overflow for {}", symbol)))?;
        HoldingChange::Update {
            shares: held.shares - shares,
            cost,
        }
    };

    Ok(LedgerMutation {
        cash_delta: proceeds,
        trade: Some(Trade {
            symbol: symbol.clone(),
            holding,
            shares: -shares,
            total: proceeds,
        }),
    })
}

/// Deposits and withdrawals. Withdrawals have no lower bound, so the balance may go
/// negative.
pub fn plan_cash(adjustment: &CashAdjustment) -> LedgerMutation {
    LedgerMutation {
        cash_delta: adjustment.delta(),
        trade: None,
    }
}
