//! Bearer-token authentication middleware.
//!
//! Accepts `Authorization: Bearer <token>` or the `safe_token` cookie.
//! Every request goes through full verification (digest + expiry); the
//! decoded claims are inserted as a request extension for handlers.

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::auth::token::verify_token;

pub const TOKEN_COOKIE: &str = "safe_token";

pub async fn require_auth(
    State(ctx): State<ApiContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .or_else(|| cookie_token(req.headers()))
        .ok_or_else(|| ApiError::Unauthorized("missing credentials".into()))?;

    let claims = verify_token(&ctx.config.token_secret, &token, Utc::now().timestamp())?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE).then(|| value.to_string())
    })
}
