//! Response and request helpers shared by every route

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::types::{AgoraError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest JSON request body accepted
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Seconds a client should wait before retrying a timed-out call
const RETRY_AFTER_SECS: &str = "1";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn with_cors(response: &mut Response<BoxBody>) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, Last-Event-ID, X-Agent-Id"),
    );
}

pub fn bytes_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<BoxBody> {
    let mut response = to_boxed(Response::new(Full::new(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    with_cors(&mut response);
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    match serde_json::to_vec(body) {
        Ok(json) => bytes_response(status, "application/json", Bytes::from(json)),
        Err(e) => error_response(&AgoraError::Internal(format!("response encoding: {}", e))),
    }
}

/// Map an error to `{"error", "message"}`; internal detail is logged, not sent
pub fn error_response(err: &AgoraError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "Request failed");
    } else if matches!(err, AgoraError::Forbidden(_) | AgoraError::Conflict(_)) {
        warn!(status = status.as_u16(), error = %err, "Request denied");
    }

    let body = ErrorBody {
        error: err.label(),
        message: err.public_message(),
    };
    let json = serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"error\":\"internal\"}".to_vec());
    let mut response = bytes_response(status, "application/json", Bytes::from(json));
    if err.is_retryable() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    }
    response
}

/// CORS preflight response
pub fn preflight_response() -> Response<BoxBody> {
    bytes_response(StatusCode::OK, "text/plain", Bytes::new())
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    error_response(&AgoraError::NotFound(format!("no route for {}", path)))
}

/// Read and decode a JSON body; an empty body decodes as `{}`
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| AgoraError::BadRequest(format!("Failed to read body: {}", e)))?
        .to_bytes();
    let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
        Bytes::from_static(b"{}")
    } else {
        bytes
    };
    serde_json::from_slice(&bytes).map_err(|e| AgoraError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Decode the query string into `T`
pub fn query<T: DeserializeOwned, B>(req: &Request<B>) -> Result<T> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| AgoraError::BadRequest(format!("Invalid query: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_timeout_sets_retry_after() {
        let response = error_response(&AgoraError::Timeout("claim exceeded 5000ms".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");

        let response = error_response(&AgoraError::Conflict("taken".into()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }

    #[tokio::test]
    async fn test_internal_detail_not_in_body() {
        let response = error_response(&AgoraError::Database("replica set at 10.0.0.9 down".into()));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.9"));
        assert!(text.contains("unavailable"));
    }

    #[derive(Deserialize)]
    struct Page {
        after: Option<u64>,
        limit: Option<usize>,
    }

    #[test]
    fn test_query_parsing() {
        let req = Request::builder().uri("/v1/runs/r1/events?after=5&limit=10").body(()).unwrap();
        let page: Page = query(&req).unwrap();
        assert_eq!(page.after, Some(5));
        assert_eq!(page.limit, Some(10));

        let req = Request::builder().uri("/v1/runs/r1/events?after=abc").body(()).unwrap();
        assert!(query::<Page, _>(&req).is_err());
    }
}
