//! Run event routes
//!
//! - `POST /v1/runs/{run}/events`                 - append
//! - `GET  /v1/runs/{run}/events?after=&limit=`   - paginated replay
//! - `GET  /v1/runs/{run}/events/stream?after=`   - server-sent events

use bytes::Bytes;
use futures::Stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::auth::AgentIdentity;
use crate::events::{open_stream, NewRunEvent};
use crate::server::AppState;
use crate::types::{AgoraError, Result};

use super::response::{json_response, query, read_json, BoxBody};

const DEFAULT_REPLAY_PAGE: usize = 100;
const LAST_EVENT_ID: &str = "last-event-id";

#[derive(Debug, Default, Deserialize)]
struct ReplayQuery {
    after: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamQuery {
    after: Option<u64>,
}

/// SSE frames from the stream task, as body frames
struct FrameStream {
    rx: mpsc::Receiver<Bytes>,
}

impl Stream for FrameStream {
    type Item = std::result::Result<Frame<Bytes>, hyper::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(|bytes| Ok(Frame::data(bytes))))
    }
}

fn require_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() || run_id.contains('/') {
        return Err(AgoraError::BadRequest("invalid run id".into()));
    }
    Ok(())
}

pub async fn handle_append(
    req: Request<Incoming>,
    state: Arc<AppState>,
    agent: &AgentIdentity,
    run_id: &str,
) -> Result<Response<BoxBody>> {
    require_run_id(run_id)?;
    let event: NewRunEvent = read_json(req).await?;
    let appended = state.events.append(run_id, event).await?;
    tracing::debug!(run_id, seq = appended.seq, agent_id = %agent.agent_id, "Event emitted by agent");
    Ok(json_response(StatusCode::CREATED, &appended))
}

pub async fn handle_replay(req: &Request<Incoming>, state: Arc<AppState>, run_id: &str) -> Result<Response<BoxBody>> {
    require_run_id(run_id)?;
    let params: ReplayQuery = query(req)?;
    let page = state
        .events
        .replay(run_id, params.after.unwrap_or(0), params.limit.unwrap_or(DEFAULT_REPLAY_PAGE))
        .await?;
    Ok(json_response(StatusCode::OK, &page))
}

/// Stream cursor: `?after=` wins over `Last-Event-ID`, which reconnecting
/// EventSource clients send on their own
fn stream_cursor(req: &Request<Incoming>) -> Result<u64> {
    let params: StreamQuery = query(req)?;
    if let Some(after) = params.after {
        return Ok(after);
    }
    match req.headers().get(LAST_EVENT_ID).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| AgoraError::BadRequest("Last-Event-ID must be a sequence number".into())),
        _ => Ok(0),
    }
}

pub async fn handle_stream(req: &Request<Incoming>, state: Arc<AppState>, run_id: &str) -> Result<Response<BoxBody>> {
    require_run_id(run_id)?;
    let cursor = stream_cursor(req)?;
    let rx = open_stream(state.events.clone(), run_id.to_string(), cursor, state.stream);

    let mut response = Response::new(StreamBody::new(FrameStream { rx }).boxed());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok(response)
}
