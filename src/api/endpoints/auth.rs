//! Account lifecycle: registration, login, password and email flows.
//!
//! Reset and verification tokens are persisted hashed and surfaced to the
//! server log; there is no mail delivery.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::{Extension, Json};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, NaiveDate, Utc};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;
use crate::api::middleware::auth::TOKEN_COOKIE;
use crate::api::types::ApiContext;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{issue_token, AuthClaims};
use crate::config::ServerConfig;
use crate::db::repository as repo;
use crate::models::enums::Role;
use crate::models::user::User;

fn issue_for(config: &ServerConfig, user: &User) -> String {
    let claims = AuthClaims {
        sub: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: Utc::now().timestamp() + config.token_ttl_secs,
    };
    issue_token(&config.token_secret, &claims)
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only the digest is stored; a leaked table does not leak usable tokens.
fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub medical_history: Option<String>,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_address: Option<String>,
}

pub async fn register(
    State(ctx): State<ApiContext>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("email", &body.email),
        ("password", &body.password),
        ("name", &body.name),
        ("role", &body.role),
    ] {
        if value.as_deref().map_or(true, str::is_empty) {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(&missing));
    }
    let (email, password, name, role) = (
        body.email.unwrap_or_default(),
        body.password.unwrap_or_default(),
        body.name.unwrap_or_default(),
        body.role.unwrap_or_default(),
    );
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role: Role = role.parse()?;
    let password_hash =
        hash_password(&password).map_err(|e| ApiError::Internal(format!("password hash: {e}")))?;

    let user = {
        let conn = ctx.conn();
        let user = repo::register_user(
            &conn,
            repo::NewRegistration {
                email,
                password_hash,
                name,
                role,
                phone: body.phone,
                address: body.address,
                birth_date: body.birth_date,
                gender: body.gender,
                medical_history: body.medical_history,
                specialty: body.specialty,
                license_number: body.license_number,
                pharmacy_name: body.pharmacy_name,
                pharmacy_address: body.pharmacy_address,
            },
        )?;

        let verification = random_token();
        repo::create_email_verification(&conn, &user.id, &token_digest(&verification))?;
        tracing::info!(user = %user.id, token = %verification, "email verification token issued");
        user
    };

    let token = issue_for(&ctx.config, &user);
    tracing::info!(user = %user.id, role = user.role.as_str(), "account registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": user })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(ctx): State<ApiContext>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = {
        let conn = ctx.conn();
        repo::find_user_by_email(&conn, &body.email)?
    };
    // same rejection for unknown email and bad password
    let user = user
        .filter(|u| verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;

    let token = issue_for(&ctx.config, &user);
    let cookie = format!(
        "{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ctx.config.token_ttl_secs
    );
    tracing::info!(user = %user.id, "login");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "token": token, "user": user })),
    ))
}

pub async fn logout() -> impl IntoResponse {
    let cookie = format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "message": "logged out" })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

const RESET_TTL_HOURS: i64 = 1;

/// Responds identically whether or not the account exists.
pub async fn forgot_password(
    State(ctx): State<ApiContext>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    if let Some(user) = repo::find_user_by_email(&conn, &body.email)? {
        let token = random_token();
        let expires = Utc::now().naive_utc() + Duration::hours(RESET_TTL_HOURS);
        repo::create_password_reset(&conn, &user.id, &token_digest(&token), expires)?;
        tracing::info!(user = %user.id, token = %token, "password reset token issued");
    }
    Ok(Json(json!({
        "message": "if the account exists, a reset token has been issued"
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(ctx): State<ApiContext>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let conn = ctx.conn();
    let user_id = repo::consume_password_reset(&conn, &token_digest(&body.token))?
        .ok_or_else(|| ApiError::validation("invalid or expired reset token"))?;
    let password_hash = hash_password(&body.new_password)
        .map_err(|e| ApiError::Internal(format!("password hash: {e}")))?;
    repo::update_password(&conn, &user_id, &password_hash)?;
    tracing::info!(user = %user_id, "password reset");
    Ok(Json(json!({ "message": "password updated" })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

pub async fn verify_email(
    State(ctx): State<ApiContext>,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    let user_id = repo::confirm_email_token(&conn, &token_digest(&body.token))?
        .ok_or_else(|| ApiError::validation("invalid verification token"))?;
    tracing::info!(user = %user_id, "email verified");
    Ok(Json(json!({ "message": "email verified" })))
}

pub async fn resend_verification(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    let user = repo::get_user(&conn, &claims.sub)?;
    if user.email_verified {
        return Err(ApiError::validation("email is already verified"));
    }
    let token = random_token();
    repo::create_email_verification(&conn, &user.id, &token_digest(&token))?;
    tracing::info!(user = %user.id, token = %token, "email verification token reissued");
    Ok(Json(json!({ "message": "verification token issued" })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let conn = ctx.conn();
    let user = repo::get_user(&conn, &claims.sub)?;
    if !verify_password(&body.current_password, &user.password_hash) {
        return Err(ApiError::Unauthorized("current password is incorrect".into()));
    }
    let password_hash = hash_password(&body.new_password)
        .map_err(|e| ApiError::Internal(format!("password hash: {e}")))?;
    repo::update_password(&conn, &user.id, &password_hash)?;
    tracing::info!(user = %user.id, "password changed");
    Ok(Json(json!({ "message": "password updated" })))
}

pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<User>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::get_user(&conn, &claims.sub)?))
}

pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<repo::UserProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    let conn = ctx.conn();
    repo::update_user_profile(&conn, &claims.sub, &body)?;
    Ok(Json(repo::get_user(&conn, &claims.sub)?))
}
