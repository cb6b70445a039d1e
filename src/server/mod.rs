//! HTTP surface: the hub callback (verification + delivery) and the live
//! stream read API.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use sha2::Sha256;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::app::Result;
use crate::config::READ_API_PREFIX;
use crate::normalizer::{EntryError, EntryParser};
use crate::pubsub::{IngestHandle, PubSub};
use crate::store::Store;

const SIGNATURE_HEADER: &str = "x-hub-signature";

pub struct ServerState<S: Store + Send + Sync + 'static> {
    pub pubsub: Arc<PubSub<S>>,
    pub ingest: IngestHandle,
    pub parser: EntryParser,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    hub_mode: Option<String>,
    #[serde(rename = "hub.topic")]
    hub_topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    hub_challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    hub_lease_seconds: Option<String>,
    #[serde(rename = "hub.reason")]
    hub_reason: Option<String>,
}

pub fn build_router<S: Store + Send + Sync + 'static>(
    state: Arc<ServerState<S>>,
    callback_path: &str,
) -> Router {
    Router::new()
        .route(
            callback_path,
            get(handle_verify).post(handle_delivery::<S>),
        )
        .route(READ_API_PREFIX, post(handle_is_live_many::<S>))
        .route(
            &format!("{}/{{channel_id}}", READ_API_PREFIX),
            get(handle_is_live_one::<S>),
        )
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn handle_verify(Query(query): Query<VerifyQuery>) -> Response {
    let mode = query.hub_mode.as_deref().unwrap_or("");
    match (mode, query.hub_topic.as_deref(), query.hub_challenge) {
        ("subscribe" | "unsubscribe", Some(topic), Some(challenge)) => {
            debug!(
                "Hub verified {} for {} (lease {})",
                mode,
                topic,
                query.hub_lease_seconds.as_deref().unwrap_or("-")
            );
            (StatusCode::OK, challenge).into_response()
        }
        ("denied", topic, _) => {
            warn!(
                "Hub denied subscription for {}: {}",
                topic.unwrap_or("-"),
                query.hub_reason.as_deref().unwrap_or("no reason given")
            );
            StatusCode::OK.into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "Invalid verification request").into_response(),
    }
}

async fn handle_delivery<S: Store + Send + Sync + 'static>(
    State(state): State<Arc<ServerState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = state.secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !verify_signature(&body, signature, secret) {
            // Acknowledged but never parsed.
            warn!("Dropped delivery with missing or invalid signature");
            return StatusCode::ACCEPTED;
        }
    }

    match state.parser.parse(&body) {
        Ok(entry) => {
            state.ingest.on_delivery(entry);
        }
        Err(EntryError::Deleted) => {}
        Err(e) => debug!("Delivery skipped ({}): {}", e.code(), e),
    }

    StatusCode::ACCEPTED
}

async fn handle_is_live_one<S: Store + Send + Sync + 'static>(
    State(state): State<Arc<ServerState<S>>>,
    Path(channel_id): Path<String>,
) -> Response {
    match state
        .pubsub
        .store()
        .get_stream_feeds_by_channel_ids(std::slice::from_ref(&channel_id))
    {
        Ok(streams) => Json(json!({"channelId": channel_id, "streams": streams})).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn handle_is_live_many<S: Store + Send + Sync + 'static>(
    State(state): State<Arc<ServerState<S>>>,
    body: Bytes,
) -> Response {
    let channel_ids = match serde_json::from_slice::<Vec<String>>(&body) {
        Ok(ids) => ids,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("expected a JSON array of channel ids: {}", e)})),
            )
                .into_response();
        }
    };

    match state
        .pubsub
        .store()
        .get_stream_feeds_by_channel_ids(&channel_ids)
    {
        Ok(streams) => Json(json!({"streams": streams})).into_response(),
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: crate::app::LivehubError) -> Response {
    error!("Read API failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
        .into_response()
}

/// Checks an `X-Hub-Signature: <algo>=<hex>` header against the raw body.
fn verify_signature(body: &[u8], header: &str, secret: &str) -> bool {
    let Some((algo, digest)) = header.trim().split_once('=') else {
        return false;
    };
    let Ok(expected) = hex::decode(digest.trim()) else {
        return false;
    };

    match algo.to_ascii_lowercase().as_str() {
        "sha1" => verify_mac::<Hmac<Sha1>>(body, &expected, secret),
        "sha256" => verify_mac::<Hmac<Sha256>>(body, &expected, secret),
        _ => false,
    }
}

fn verify_mac<M: Mac + hmac::digest::KeyInit>(body: &[u8], expected: &[u8], secret: &str) -> bool {
    match <M as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            mac.verify_slice(expected).is_ok()
        }
        Err(_) => false,
    }
}
