//! `/proxy` and `/proxy/stream` handlers
//!
//! Both routes take a [`ChatRequest`] body and the caller's `Authorization`
//! header. Failures before the first byte map to HTTP statuses; a failure
//! mid-stream is reported in-band because the 200 is already committed.

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::handlers::extractor::{Credential, ProxyJson};
use crate::middleware::RequestId;
use crate::providers::FragmentStream;
use crate::providers::sse::DONE_SENTINEL;
use crate::schema::{ChatRequest, ChatResponse};
use axum::{
    Extension, Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// POST /proxy
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Credential(credential): Credential,
    ProxyJson(request): ProxyJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    tracing::debug!(
        request_id = %request_id,
        model = %request.model,
        messages = request.messages.len(),
        "Received chat request"
    );

    state
        .gateway()
        .chat(request, Some(&credential))
        .await
        .map(Json)
        .map_err(|e| e.with_request_id(request_id.as_str()))
}

/// POST /proxy/stream
///
/// Each fragment becomes one `data:` event. The stream always ends with
/// `data: [DONE]`, after an in-band error event if the backend failed.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Credential(credential): Credential,
    ProxyJson(request): ProxyJson<ChatRequest>,
) -> Result<Response, ApiError> {
    tracing::debug!(
        request_id = %request_id,
        model = %request.model,
        messages = request.messages.len(),
        "Received streaming chat request"
    );

    let fragments = state
        .gateway()
        .open_stream(request, Some(&credential))
        .await
        .map_err(|e| e.with_request_id(request_id.as_str()))?;

    let shutdown = state.shutdown_token().child_token();
    let events = sse_events(fragments, request_id, shutdown);

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response())
}

/// Client-facing text for unclassified mid-stream failures
const STREAM_FAILED_MESSAGE: &str = "Backend stream failed";

/// Frame fragments as SSE events
///
/// Stops early, still emitting the terminal marker, when `shutdown` fires.
/// Dropping the returned stream drops `fragments` and with it the backend
/// connection.
pub fn sse_events(
    fragments: FragmentStream,
    request_id: RequestId,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut fragments = Box::pin(fragments.take_until(shutdown.cancelled_owned()));

    async_stream::stream! {
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    yield Ok(Event::default().data(normalize_newlines(fragment)));
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Stream failed after response started"
                    );
                    let message = if e.is_opaque() {
                        STREAM_FAILED_MESSAGE.to_string()
                    } else {
                        e.to_string()
                    };
                    let payload = json!({
                        "error": "stream_error",
                        "message": message,
                        "request_id": request_id.as_str(),
                    });
                    yield Ok(Event::default().data(payload.to_string()));
                    break;
                }
            }
        }
        yield Ok(Event::default().data(DONE_SENTINEL));
    }
}

/// SSE fields end at CR or LF; multi-line text is carried as several
/// `data:` lines, which clients rejoin with `\n`
fn normalize_newlines(fragment: String) -> String {
    if fragment.contains('\r') {
        fragment.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        fragment
    }
}
