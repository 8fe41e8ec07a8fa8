//! Response timing header.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Stamps `X-Response-Time` (milliseconds) on every response.
pub async fn response_time(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed().as_millis();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed}ms")) {
        response.headers_mut().insert("X-Response-Time", value);
    }
    response
}
