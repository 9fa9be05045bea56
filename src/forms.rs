// src/forms.rs
//! Raw form bodies as they arrive from the browser, and the typed values the handlers
//! work with once a form has been validated.
use crate::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

const MAX_SYMBOL_LEN: usize = 10;

/// Normalised ticker symbol: trimmed, upper-cased, 1-10 characters of `A-Z0-9.-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Option<Symbol> {
        let symbol = raw.trim().to_ascii_uppercase();
        let valid = !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        valid.then_some(Symbol(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirmation: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<Registration, AppError> {
        let username =
            present(&self.username).ok_or_else(|| AppError::invalid("must provide username"))?;
        let password =
            present(&self.password).ok_or_else(|| AppError::invalid("must provide password"))?;
        if self.confirmation.as_deref() != Some(password) {
            return Err(AppError::invalid("re-enter the same password"));
        }
        Ok(Registration {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(self) -> Result<Credentials, AppError> {
        let username =
            present(&self.username).ok_or_else(|| AppError::forbidden("must provide username"))?;
        let password =
            present(&self.password).ok_or_else(|| AppError::invalid("must provide password"))?;
        Ok(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteForm {
    pub symbol: Option<String>,
}

impl QuoteForm {
    pub fn validate(self) -> Result<Symbol, AppError> {
        self.symbol
            .as_deref()
            .and_then(Symbol::parse)
            .ok_or_else(unknown_symbol)
    }
}

pub fn unknown_symbol() -> AppError {
    AppError::invalid("Symbol doesn't exist")
}

/// Body of both the buy and the sell form.
#[derive(Debug, Default, Deserialize)]
pub struct TradeForm {
    pub symbol: Option<String>,
    pub shares: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuyOrder {
    pub symbol: Symbol,
    pub shares: i64,
}

impl TradeForm {
    /// The share field as a number, whole or not, plain (`2.5`) or in exponent form
    /// (`1e2`). Anything non-numeric is rejected.
    pub fn share_amount(&self) -> Result<Decimal, AppError> {
        self.shares
            .as_deref()
            .map(str::trim)
            .and_then(|raw| {
                Decimal::from_str(raw)
                    .or_else(|_| Decimal::from_scientific(raw))
                    .ok()
            })
            .ok_or_else(|| AppError::invalid("Enter correct no. of share"))
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol.as_deref().and_then(Symbol::parse)
    }

    pub fn validate_buy(self) -> Result<BuyOrder, AppError> {
        let amount = self.share_amount()?;
        let shares = whole_shares(amount)
            .ok_or_else(|| AppError::invalid("Enter a valid amount of shares"))?;
        let symbol = self.symbol().ok_or_else(unknown_symbol)?;
        Ok(BuyOrder { symbol, shares })
    }
}

/// A positive whole number of shares, or `None`.
pub fn whole_shares(amount: Decimal) -> Option<i64> {
    if amount < Decimal::ONE || !amount.fract().is_zero() {
        return None;
    }
    amount.to_i64()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAction {
    Add,
    Withdraw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashAdjustment {
    pub action: CashAction,
    pub amount: Decimal,
}

impl CashAdjustment {
    /// Signed change to the cash balance.
    pub fn delta(&self) -> Decimal {
        match self.action {
            CashAction::Add => self.amount,
            CashAction::Withdraw => -self.amount,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MoneyForm {
    pub action: Option<String>,
    pub amount: Option<String>,
}

impl MoneyForm {
    pub fn validate(self) -> Result<CashAdjustment, AppError> {
        let amount = self
            .amount
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|amount| *amount > 0)
            .ok_or_else(|| AppError::forbidden("Enter a positive integer"))?;
        let action = match self.action.as_deref().map(str::trim) {
            Some(action) if action.eq_ignore_ascii_case("add") => CashAction::Add,
            Some(action) if action.eq_ignore_ascii_case("withdraw") => CashAction::Withdraw,
            _ => return Err(AppError::invalid("Choose Add or Withdraw")),
        };
        Ok(CashAdjustment {
            action,
            amount: Decimal::from(amount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::StatusCode;

    fn message(err: AppError) -> String {
        err.public_message()
    }

    fn trade(symbol: &str, shares: &str) -> TradeForm {
        TradeForm {
            symbol: Some(symbol.to_string()),
            shares: Some(shares.to_string()),
        }
    }

    #[test]
    fn symbols_are_normalised() {
        assert_eq!(Symbol::parse(" aapl ").unwrap().as_str(), "AAPL");
        assert_eq!(Symbol::parse("brk.b").unwrap().as_str(), "BRK.B");
        assert!(Symbol::parse("").is_none());
        assert!(Symbol::parse("AA PL").is_none());
        assert!(Symbol::parse("ABCDEFGHIJK").is_none());
        assert!(Symbol::parse("A&B").is_none());
    }

    #[test]
    fn registration_requires_matching_confirmation() {
        let form = RegisterForm {
            username: Some("alice".into()),
            password: Some("secret".into()),
            confirmation: Some("secrets".into()),
        };
        assert_eq!(message(form.validate().unwrap_err()), "re-enter the same password");

        let form = RegisterForm {
            username: Some("".into()),
            password: Some("secret".into()),
            confirmation: Some("secret".into()),
        };
        assert_eq!(message(form.validate().unwrap_err()), "must provide username");

        let form = RegisterForm {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert_eq!(message(form.validate().unwrap_err()), "must provide password");
    }

    #[test]
    fn login_missing_username_is_forbidden() {
        let err = LoginForm::default().validate().unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(err), "must provide username");

        let err = LoginForm {
            username: Some("alice".into()),
            password: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn buy_order_needs_a_positive_whole_share_count() {
        let order = trade("aapl", "10").validate_buy().unwrap();
        assert_eq!(order.shares, 10);
        assert_eq!(order.symbol.as_str(), "AAPL");

        assert_eq!(
            message(trade("AAPL", "ten").validate_buy().unwrap_err()),
            "Enter correct no. of share"
        );
        for shares in ["0", "-3", "1.5", "0.99"] {
            assert_eq!(
                message(trade("AAPL", shares).validate_buy().unwrap_err()),
                "Enter a valid amount of shares",
                "shares = {}",
                shares
            );
        }
        assert_eq!(
            message(trade("", "1").validate_buy().unwrap_err()),
            "Symbol doesn't exist"
        );
        assert_eq!(trade("AAPL", "2.0").validate_buy().unwrap().shares, 2);
    }

    #[test]
    fn share_amount_accepts_exponent_notation() {
        assert_eq!(trade("AAPL", "1e2").validate_buy().unwrap().shares, 100);
        assert_eq!(trade("AAPL", "2.5e-1").share_amount().unwrap(), Decimal::new(25, 2));
        assert_eq!(
            message(trade("AAPL", "2.5e-1").validate_buy().unwrap_err()),
            "Enter a valid amount of shares"
        );
        assert_eq!(
            message(trade("AAPL", "1e").validate_buy().unwrap_err()),
            "Enter correct no. of share"
        );
    }

    #[test]
    fn cash_adjustment_rejects_non_positive_amounts() {
        let form = MoneyForm {
            action: Some("Withdraw".into()),
            amount: Some("0".into()),
        };
        let err = form.validate().unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(message(err), "Enter a positive integer");

        let form = MoneyForm {
            action: Some("Add".into()),
            amount: Some("1.5".into()),
        };
        assert!(form.validate().is_err());

        let adjustment = MoneyForm {
            action: Some("withdraw".into()),
            amount: Some("250".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(adjustment.delta(), Decimal::from(-250));
    }

    #[test]
    fn cash_adjustment_requires_a_known_action() {
        let form = MoneyForm {
            action: Some("Steal".into()),
            amount: Some("10".into()),
        };
        assert_eq!(message(form.validate().unwrap_err()), "Choose Add or Withdraw");
    }
}
