// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
mod forms;
mod ledger;
mod models;
mod quote;
mod views;

use crate::api::AppState;
use crate::auth::SessionStore;
use crate::config::Config;
use crate::db::Store;
use crate::quote::AlphaVantage;
use env_logger::{Builder, Env};
use log::{error, info};
use reqwest::Client;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            process::exit(1);
        }
    };
    info!("Connected to database...");

    let state = AppState {
        store,
        quotes: Arc::new(AlphaVantage::new(
            Client::new(),
            config.quote_api_url.clone(),
            config.api_key.clone(),
        )),
        sessions: Arc::new(SessionStore::new(
            &config.session_secret,
            config.session_ttl_secs,
        )),
        starting_cash: config.starting_cash,
        bcrypt_cost: config.bcrypt_cost,
    };

    let api = api::routes(state);

    info!("Server running on http://{}", config.bind_addr);
    warp::serve(api).run(config.bind_addr).await;
}
