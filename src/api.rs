// src/api.rs
use crate::auth::{self, SessionStore, SESSION_COOKIE};
use crate::db::Store;
use crate::error::{handle_rejection, AppError};
use crate::forms::{
    unknown_symbol, LoginForm, MoneyForm, QuoteForm, RegisterForm, Symbol, TradeForm,
};
use crate::ledger;
use crate::models::{Portfolio, Quote, UserId};
use crate::quote::QuoteSource;
use crate::views;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use warp::http::Uri;
use warp::{Filter, Rejection, Reply};

const MAX_FORM_BYTES: u64 = 16 * 1024;

/// Everything a handler needs, handed to it explicitly on every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub quotes: Arc<dyn QuoteSource>,
    pub sessions: Arc<SessionStore>,
    pub starting_cash: Decimal,
    pub bcrypt_cost: u32,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(index_handler);

    let buy_page = warp::path!("buy")
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .map(|_: UserId| warp::reply::html(views::buy_form()));

    let buy = warp::path!("buy")
        .and(warp::post())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<TradeForm>())
        .and_then(buy_handler);

    let history = warp::path!("history")
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(history_handler);

    let login_page = warp::path!("login")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(login_page_handler);

    let login = warp::path!("login")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and(form_body::<LoginForm>())
        .and_then(login_handler);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and(with_state(state.clone()))
        .and_then(logout_handler);

    let quote_page = warp::path!("quote")
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .map(|_: UserId| warp::reply::html(views::quote_form()));

    let quote = warp::path!("quote")
        .and(warp::post())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<QuoteForm>())
        .and_then(quote_handler);

    let register_page = warp::path!("register")
        .and(warp::get())
        .map(|| warp::reply::html(views::register()));

    let register = warp::path!("register")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(form_body::<RegisterForm>())
        .and_then(register_handler);

    let sell_page = warp::path!("sell")
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and_then(sell_page_handler);

    let sell = warp::path!("sell")
        .and(warp::post())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state.clone()))
        .and(form_body::<TradeForm>())
        .and_then(sell_handler);

    let money_page = warp::path!("money")
        .and(warp::get())
        .and(authenticated(state.sessions.clone()))
        .map(|_: UserId| warp::reply::html(views::money_form()));

    let money = warp::path!("money")
        .and(warp::post())
        .and(authenticated(state.sessions.clone()))
        .and(with_state(state))
        .and(form_body::<MoneyForm>())
        .and_then(money_handler);

    index
        .or(buy_page)
        .or(buy)
        .or(history)
        .or(login_page)
        .or(login)
        .or(logout)
        .or(quote_page)
        .or(quote)
        .or(register_page)
        .or(register)
        .or(sell_page)
        .or(sell)
        .or(money_page)
        .or(money)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(no_cache_headers()))
        .with(warp::log("finance"))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the session cookie to a user id, or rejects so the request is sent to the
/// login page.
fn authenticated(
    sessions: Arc<SessionStore>,
) -> impl Filter<Extract = (UserId,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |token: Option<String>| {
        let sessions = sessions.clone();
        async move {
            let user_id = match token {
                Some(token) => sessions.resolve(&token).await,
                None => None,
            };
            user_id.ok_or_else(|| warp::reject::custom(AppError::Unauthenticated))
        }
    })
}

fn form_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_FORM_BYTES).and(warp::body::form())
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

fn redirect_to(path: &'static str) -> impl Reply {
    warp::redirect::see_other(Uri::from_static(path))
}

/// Quote for a symbol the user typed; anything short of a price is an unknown symbol.
async fn find_quote(quotes: &dyn QuoteSource, symbol: &Symbol) -> Result<Quote, AppError> {
    match quotes.lookup(symbol).await {
        Ok(Some(quote)) => Ok(quote),
        Ok(None) => Err(unknown_symbol()),
        Err(e) => {
            warn!("Quote lookup for {} failed: {}", symbol, e);
            Err(unknown_symbol())
        }
    }
}

/// Live price for a symbol the user already holds; failure here is internal.
async fn live_price(quotes: &dyn QuoteSource, symbol: &str) -> Result<Decimal, AppError> {
    let parsed = Symbol::parse(symbol)
        .ok_or_else(|| AppError::Internal(format!("stored symbol {:?} is malformed", symbol)))?;
    match quotes.lookup(&parsed).await? {
        Some(quote) => Ok(quote.price),
        None => Err(AppError::Internal(format!("no quote for held symbol {}", symbol))),
    }
}

async fn index_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let holdings = state.store.holdings(user_id).await.map_err(AppError::from)?;
    let mut priced = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let price = live_price(state.quotes.as_ref(), &holding.symbol).await?;
        priced.push((holding, price));
    }
    let cash = state.store.cash(user_id).await?;
    Ok(warp::reply::html(views::index(&Portfolio::value(priced, cash))))
}

async fn buy_handler(
    user_id: UserId,
    state: AppState,
    form: TradeForm,
) -> Result<impl Reply, Rejection> {
    let order = form.validate_buy()?;
    let quote = find_quote(state.quotes.as_ref(), &order.symbol).await?;
    state
        .store
        .apply(user_id, Some(&order.symbol), |account| {
            ledger::plan_buy(account, &order, &quote.name, quote.price)
        })
        .await?;
    info!(
        "User {} bought {} {} at {}",
        user_id, order.shares, order.symbol, quote.price
    );
    Ok(redirect_to("/"))
}

async fn sell_page_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let symbols: Vec<String> = state
        .store
        .holdings(user_id)
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|holding| holding.symbol)
        .collect();
    Ok(warp::reply::html(views::sell_form(&symbols)))
}

async fn sell_handler(
    user_id: UserId,
    state: AppState,
    form: TradeForm,
) -> Result<impl Reply, Rejection> {
    let amount = form.share_amount()?;
    let symbol = form.symbol();
    let held = match &symbol {
        Some(symbol) => state
            .store
            .holding(user_id, symbol)
            .await
            .map_err(AppError::from)?,
        None => None,
    };
    ledger::check_sell(held.as_ref(), amount)?;
    let symbol = symbol.ok_or_else(|| AppError::invalid("Enter correct symbol"))?;

    let price = live_price(state.quotes.as_ref(), symbol.as_str()).await?;
    let mutation = state
        .store
        .apply(user_id, Some(&symbol), |account| {
            ledger::plan_sell(account, &symbol, amount, price)
        })
        .await?;
    info!(
        "User {} sold {} {} at {} (cash +{})",
        user_id, amount, symbol, price, mutation.cash_delta
    );
    Ok(redirect_to("/"))
}

async fn history_handler(user_id: UserId, state: AppState) -> Result<impl Reply, Rejection> {
    let transactions = state
        .store
        .transactions(user_id)
        .await
        .map_err(AppError::from)?;
    Ok(warp::reply::html(views::history(&transactions)))
}

async fn quote_handler(
    _user_id: UserId,
    state: AppState,
    form: QuoteForm,
) -> Result<impl Reply, Rejection> {
    let symbol = form.validate()?;
    let quote = find_quote(state.quotes.as_ref(), &symbol).await?;
    Ok(warp::reply::html(views::quoted(&quote)))
}

async fn money_handler(
    user_id: UserId,
    state: AppState,
    form: MoneyForm,
) -> Result<impl Reply, Rejection> {
    let adjustment = form.validate()?;
    state
        .store
        .apply(user_id, None, |_| Ok(ledger::plan_cash(&adjustment)))
        .await?;
    info!("User {} adjusted cash by {}", user_id, adjustment.delta());
    Ok(redirect_to("/"))
}

async fn register_handler(state: AppState, form: RegisterForm) -> Result<impl Reply, Rejection> {
    let registration = form.validate()?;
    let hash = auth::hash_password(registration.password, state.bcrypt_cost).await?;
    let user_id = state
        .store
        .create_user(&registration.username, &hash, state.starting_cash)
        .await?;
    info!("Registered user {} ({})", registration.username, user_id);
    Ok(redirect_to("/login"))
}

/// Showing the login form forgets whoever was logged in.
async fn login_page_handler(
    token: Option<String>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    if let Some(token) = token {
        state.sessions.revoke(&token).await;
    }
    Ok(warp::reply::with_header(
        warp::reply::html(views::login()),
        "set-cookie",
        auth::cleared_session_cookie(),
    ))
}

/// Unknown usernames and wrong passwords fail with the same message.
async fn login_handler(
    token: Option<String>,
    state: AppState,
    form: LoginForm,
) -> Result<impl Reply, Rejection> {
    if let Some(token) = token {
        state.sessions.revoke(&token).await;
    }
    let credentials = form.validate()?;
    let user = state
        .store
        .find_user(&credentials.username)
        .await
        .map_err(AppError::from)?
        .ok_or_else(AppError::bad_credentials)?;
    if !auth::verify_password(credentials.password, user.hash).await? {
        warn!("Failed login for {}", user.username);
        return Err(AppError::bad_credentials().into());
    }

    let token = state.sessions.issue(user.id).await?;
    info!("User {} logged in", user.username);
    Ok(warp::reply::with_header(
        redirect_to("/"),
        "set-cookie",
        auth::session_cookie(&token),
    ))
}

async fn logout_handler(token: Option<String>, state: AppState) -> Result<impl Reply, Rejection> {
    if let Some(token) = token {
        state.sessions.revoke(&token).await;
    }
    Ok(warp::reply::with_header(
        redirect_to("/"),
        "set-cookie",
        auth::cleared_session_cookie(),
    ))
}
