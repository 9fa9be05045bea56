// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = i64;

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub hash: String,
}

/// A user's position in one ticker. `price` is the accumulated cost of the position:
/// buys add their cost, sells subtract proceeds at the sale price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub userid: UserId,
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
}

/// One row of the append-only transaction log. `shares` is positive for buys and
/// negative for sells; `price` is the total value of the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub userid: UserId,
    pub shares: i64,
    pub symbol: String,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub rows: Vec<PortfolioRow>,
    pub cash: Decimal,
    pub total: Decimal,
}

impl Portfolio {
    /// Values each holding at its live price; the grand total adds the cash balance.
    pub fn value(holdings: Vec<(Holding, Decimal)>, cash: Decimal) -> Self {
        let rows: Vec<PortfolioRow> = holdings
            .into_iter()
            .map(|(holding, price)| PortfolioRow {
                total: price * Decimal::from(holding.shares),
                symbol: holding.symbol,
                name: holding.name,
                shares: holding.shares,
                price,
            })
            .collect();
        let total = rows.iter().map(|row| row.total).sum::<Decimal>() + cash;
        Portfolio { rows, cash, total }
    }
}
