//! HTTP surface for submitting crawls.
//!
//! `POST /crawl` takes a [`CrawlRequest`] body. Requests that fail validation, or
//! bodies that are not a crawl request at all, get a 400 with the same structured
//! payload as any other response; every crawl that actually runs answers 200,
//! whether or not it succeeded.

use crate::engine::CrawlEngine;
use crate::errors::ErrorType;
use crate::response::ResponseBuilder;
use crate::results::{CrawlError, CrawlRequest, CrawlResponse};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CrawlEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/crawl", post(crawl_handler))
        .with_state(state)
}

/// Serve crawl requests on `bind` until the process is stopped
pub async fn serve(engine: Arc<CrawlEngine>, bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| format!("invalid bind address {}: {}", bind, e))?;
    let app = router(AppState { engine });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    ::log::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn crawl_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CrawlResponse>) {
    let request: CrawlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            ::log::info!("Rejected malformed crawl request: {}", e);
            return bad_request(CrawlError::new(
                ErrorType::Validation,
                format!("request body is not a valid crawl request: {}", e),
            ));
        }
    };

    match request.validate() {
        Ok(validated) => (StatusCode::OK, Json(state.engine.crawl(validated).await)),
        Err(error) => {
            ::log::info!("Rejected crawl request: {}", error.message);
            bad_request(error)
        }
    }
}

fn bad_request(error: CrawlError) -> (StatusCode, Json<CrawlResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ResponseBuilder::rejected(error)),
    )
}
