// src/db.rs
use crate::error::AppError;
use crate::forms::Symbol;
use crate::ledger::{Account, HoldingChange, LedgerMutation};
use crate::models::{Holding, Transaction, User, UserId};
use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        hash TEXT NOT NULL,
        cash TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS holdings (
        userid INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        name TEXT NOT NULL,
        shares INTEGER NOT NULL,
        price TEXT NOT NULL,
        PRIMARY KEY (userid, symbol)
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        userid INTEGER NOT NULL,
        sshares INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        price TEXT NOT NULL,
        t_time TEXT NOT NULL
    )",
];

const HOLDING_QUERY: &str =
    "SELECT userid, symbol, name, shares, price FROM holdings WHERE userid = ? AND symbol = ?";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Store, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Store { pool };
        store.init_schema().await?;
        info!("Successfully connected to {}.", url);
        Ok(store)
    }

    /// A private database that lives as long as the store. The pool holds a single
    /// connection that is never recycled, since closing it would drop the data.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Store, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Store { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Inserts a new user. A taken username is a business-rule failure, including the
    /// case where a concurrent registration wins the unique index.
    pub async fn create_user(
        &self,
        username: &str,
        hash: &str,
        cash: Decimal,
    ) -> Result<UserId, AppError> {
        if self.find_user(username).await?.is_some() {
            return Err(AppError::rule("Username already exists"));
        }
        let result = sqlx::query("INSERT INTO users (username, hash, cash) VALUES (?, ?, ?)")
            .bind(username)
            .bind(hash)
            .bind(cash.to_string())
            .execute(&self.pool)
            .await;
        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!("Lost registration race for username {}", username);
                Err(AppError::rule("Username already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query("SELECT id, username, hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<User, sqlx::Error> {
            Ok(User {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                hash: row.try_get("hash")?,
            })
        })
        .transpose()
    }

    pub async fn cash(&self, user_id: UserId) -> Result<Decimal, AppError> {
        let row = sqlx::query("SELECT cash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::Internal(format!("user {} not found", user_id)))?;
        Ok(decimal(&row, "cash")?)
    }

    pub async fn holdings(&self, user_id: UserId) -> Result<Vec<Holding>, sqlx::Error> {
        sqlx::query(
            "SELECT userid, symbol, name, shares, price FROM holdings WHERE userid = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(holding_from_row)
        .collect()
    }

    pub async fn holding(
        &self,
        user_id: UserId,
        symbol: &Symbol,
    ) -> Result<Option<Holding>, sqlx::Error> {
        let row = sqlx::query(HOLDING_QUERY)
            .bind(user_id)
            .bind(symbol.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(holding_from_row).transpose()
    }

    /// The user's transaction log in insertion order.
    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, sqlx::Error> {
        sqlx::query(
            "SELECT id, userid, sshares, symbol, price, t_time FROM transactions WHERE userid = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<Transaction, sqlx::Error> {
            Ok(Transaction {
                id: row.try_get("id")?,
                userid: row.try_get("userid")?,
                shares: row.try_get("sshares")?,
                symbol: row.try_get("symbol")?,
                price: decimal(row, "price")?,
                time: row.try_get("t_time")?,
            })
        })
        .collect()
    }

    /// Reads the account inside one database transaction, lets `plan` decide the
    /// change, and writes every resulting row before committing. Any error rolls the
    /// whole change back.
    pub async fn apply<F>(
        &self,
        user_id: UserId,
        symbol: Option<&Symbol>,
        plan: F,
    ) -> Result<LedgerMutation, AppError>
    where
        F: FnOnce(&Account) -> Result<LedgerMutation, AppError>,
    {
        let mut tx = self.pool.begin().await?;

        // The first statement writes, so the write lock is taken (waiting out the busy
        // timeout) before anything is read. A read first would fail the later lock
        // upgrade with SQLITE_BUSY whenever another writer got in between.
        let claimed = sqlx::query("UPDATE users SET cash = cash WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Err(AppError::Internal(format!("user {} not found", user_id)));
        }

        let cash_row = sqlx::query("SELECT cash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let holding = match symbol {
            Some(symbol) => sqlx::query(HOLDING_QUERY)
                .bind(user_id)
                .bind(symbol.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .as_ref()
                .map(holding_from_row)
                .transpose()?,
            None => None,
        };
        let account = Account {
            cash: decimal(&cash_row, "cash")?,
            holding,
        };

        let mutation = plan(&account)?;
        let cash = account
            .cash
            .checked_add(mutation.cash_delta)
            .ok_or_else(|| AppError::Internal(format!("cash overflow for user {}", user_id)))?;

        sqlx::query("UPDATE users SET cash = ? WHERE id = ?")
            .bind(cash.to_string())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if let Some(trade) = &mutation.trade {
            match &trade.holding {
                HoldingChange::Open { name, shares, cost } => {
                    sqlx::query(
                        "INSERT INTO holdings (userid, symbol, name, shares, price) VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(user_id)
                    .bind(trade.symbol.as_str())
                    .bind(name)
                    .bind(shares)
                    .bind(cost.to_string())
                    .execute(&mut *tx)
                    .await?;
                }
                HoldingChange::Update { shares, cost } => {
                    sqlx::query(
                        "UPDATE holdings SET shares = ?, price = ? WHERE userid = ? AND symbol = ?",
                    )
                    .bind(shares)
                    .bind(cost.to_string())
                    .bind(user_id)
                    .bind(trade.symbol.as_str())
                    .execute(&mut *tx)
                    .await?;
                }
                HoldingChange::Close => {
                    sqlx::query("DELETE FROM holdings WHERE userid = ? AND symbol = ?")
                        .bind(user_id)
                        .bind(trade.symbol.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }

            sqlx::query(
                "INSERT INTO transactions (userid, sshares, symbol, price, t_time) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(trade.shares)
            .bind(trade.symbol.as_str())
            .bind(trade.total.to_string())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(mutation)
    }
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn holding_from_row(row: &SqliteRow) -> Result<Holding, sqlx::Error> {
    Ok(Holding {
        userid: row.try_get("userid")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        shares: row.try_get("shares")?,
        price: decimal(row, "price")?,
    })
}
