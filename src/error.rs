// src/error.rs
use crate::quote::QuoteError;
use crate::views;
use log::{error, warn};
use std::convert::Infallible;
use thiserror::Error;
use warp::http::{StatusCode, Uri};
use warp::reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, Reject};
use warp::{Rejection, Reply};

/// Every failure a request can end in. The user-facing variants carry the status and
/// the short text of the apology page; the rest render as a generic 500.
#[derive(Debug, Error)]
pub enum AppError {
    /// A missing or malformed form field.
    #[error("{message}")]
    Validation { status: StatusCode, message: String },
    /// Insufficient cash or shares, unknown symbol, duplicate username.
    #[error("{0}")]
    Rule(String),
    /// Bad credentials.
    #[error("{message}")]
    Auth { status: StatusCode, message: String },
    #[error("login required")]
    Unauthenticated,
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("quote lookup failed: {0}")]
    Quote(#[from] QuoteError),
    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::Validation {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Validation {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn rule(message: impl Into<String>) -> Self {
        AppError::Rule(message.into())
    }

    pub fn bad_credentials() -> Self {
        AppError::Auth {
            status: StatusCode::BAD_REQUEST,
            message: "invalid username and/or password".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { status, .. } | AppError::Auth { status, .. } => *status,
            AppError::Rule(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::SEE_OTHER,
            AppError::Storage(_)
            | AppError::Quote(_)
            | AppError::Hashing(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown on the apology page. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation { message, .. } | AppError::Auth { message, .. } => {
                message.clone()
            }
            AppError::Rule(message) => message.clone(),
            AppError::Unauthenticated => "login required".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl Reject for AppError {}

pub fn apology(status: StatusCode, message: &str) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::html(views::apology(status, message)),
        status,
    ))
}

/// Turns every rejection, ours or warp's, into an apology page.
pub async fn handle_rejection(err: Rejection) -> Result<Box<dyn Reply>, Infallible> {
    if let Some(app_err) = err.find::<AppError>() {
        if let AppError::Unauthenticated = app_err {
            return Ok(Box::new(warp::redirect::see_other(Uri::from_static(
                "/login",
            ))));
        }
        let status = app_err.status();
        if status.is_server_error() {
            error!("Request failed: {}", app_err);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), app_err);
        }
        return Ok(apology(status, &app_err.public_message()));
    }

    if err.find::<MethodNotAllowed>().is_some() {
        return Ok(apology(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"));
    }
    if err.is_not_found() {
        return Ok(apology(StatusCode::NOT_FOUND, "Not Found"));
    }
    if err.find::<warp::body::BodyDeserializeError>().is_some() {
        return Ok(apology(StatusCode::BAD_REQUEST, "Bad Request"));
    }
    if err.find::<PayloadTooLarge>().is_some() {
        return Ok(apology(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"));
    }
    if err.find::<LengthRequired>().is_some() {
        return Ok(apology(StatusCode::LENGTH_REQUIRED, "Length Required"));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(apology(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Filter;

    #[test]
    fn user_facing_errors_keep_their_status_and_text() {
        let err = AppError::forbidden("Enter a positive integer");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.public_message(), "Enter a positive integer");

        let err = AppError::rule("Not enough cash");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Not enough cash");
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let err = AppError::Internal("connection reset by peer".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal Server Error");

        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal Server Error");
    }

    #[tokio::test]
    async fn unauthenticated_rejection_redirects_to_login() {
        let reply = handle_rejection(warp::reject::custom(AppError::Unauthenticated))
            .await
            .unwrap();
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");
    }

    #[tokio::test]
    async fn not_found_renders_an_apology() {
        let reply = handle_rejection(warp::reject::not_found()).await.unwrap();
        assert_eq!(reply.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn body_without_content_length_gets_411() {
        let filter = warp::post()
            .and(warp::body::content_length_limit(1024))
            .map(warp::reply)
            .recover(handle_rejection);
        let response = warp::test::request().method("POST").reply(&filter).await;
        assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
        let body = String::from_utf8_lossy(response.body());
        assert!(body.contains("Length Required"));
    }
}
