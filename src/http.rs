//! HTTP front end
//!
//! Accepts `POST` with a JSON body `{ "to", "subject", "template" }` on any
//! path, relays it through a [`Mailer`] and reports the outcome.
//!
//! | Case                              | Status | Body                                   |
//! |-----------------------------------|--------|----------------------------------------|
//! | session completed                 | 200    | `{"message": ..., "delivered": true}`  |
//! | session failed                    | 200    | `{"message": ..., "delivered": false}` |
//! | field absent, empty or not text   | 400    | `{"message": "Missing required parameters"}` |
//! | recipient not a mailbox           | 400    | `{"message": "Invalid recipient address"}`   |
//! | method other than POST or OPTIONS | 405    | `{"message": "Method Not Allowed"}`    |
//! | undecodable body, internal fault  | 500    | `{"message": "Internal Server Error"}` |
//!
//! `OPTIONS` answers 204 with an empty body. Every response carries
//! permissive CORS headers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{MethodRouter, post},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::RelayConfig;
use crate::mailer::{EmailRequest, Mailer};
use crate::message::validate_address;
use crate::smtp::SessionOutcome;

pub const SENT_MESSAGE: &str = "Message has been sent";
pub const FAILED_MESSAGE_PREFIX: &str = "Message could not be sent. Mailer Error: ";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Invalid recipient address")]
    InvalidRecipient,

    #[error("Internal Server Error")]
    MalformedBody(#[source] serde_json::Error),

    #[error("Internal Server Error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingParameters | ApiError::InvalidRecipient => StatusCode::BAD_REQUEST,
            ApiError::MalformedBody(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::MalformedBody(e) => warn!("undecodable request body: {e}"),
            ApiError::Internal(e) => error!("request failed: {e}"),
            _ => {}
        }
        let body = ApiResponse {
            message: self.to_string(),
            delivered: None,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// JSON body of every non-empty response
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
}

impl From<SessionOutcome> for ApiResponse {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Sent => ApiResponse {
                message: SENT_MESSAGE.to_string(),
                delivered: Some(true),
            },
            SessionOutcome::Failed { reason } => ApiResponse {
                message: format!("{FAILED_MESSAGE_PREFIX}{reason}"),
                delivered: Some(false),
            },
        }
    }
}

/// Build the application. The endpoint answers on every path.
pub fn router(mailer: Mailer) -> Router {
    Router::new()
        .route("/", endpoint())
        .route("/*path", endpoint())
        .layer(middleware::map_response(allow_cross_origin))
        .with_state(mailer)
}

fn endpoint() -> MethodRouter<Mailer> {
    post(relay)
        .options(preflight)
        .fallback(method_not_allowed)
}

/// Serve the relay on `config.listen` until ctrl-c
pub async fn serve(config: RelayConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen).await?;
    info!("listening on {}", listener.local_addr()?);

    let app = router(Mailer::new(config.smtp));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn relay(State(mailer): State<Mailer>, body: Bytes) -> Result<Json<ApiResponse>, ApiError> {
    let request = parse_request(&body)?;
    info!(to = %request.recipient_address, "relaying message");

    let outcome = tokio::spawn(async move { mailer.send(&request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(outcome.into()))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn allow_cross_origin(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Decode and check a request body without touching the network
pub fn parse_request(body: &[u8]) -> Result<EmailRequest, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(ApiError::MalformedBody)?;

    let (Some(to), Some(subject), Some(template)) = (
        required(&value, "to"),
        required(&value, "subject"),
        required(&value, "template"),
    ) else {
        return Err(ApiError::MissingParameters);
    };

    if let Err(e) = validate_address(to) {
        info!("rejecting recipient {to:?}: {e}");
        return Err(ApiError::InvalidRecipient);
    }

    Ok(EmailRequest::new(to, subject, template))
}

fn required<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
