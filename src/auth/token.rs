//! Signed bearer credentials.
//!
//! Token format: `base64url(claims-json) . base64url(digest)` where the
//! digest is SHA-256 over `secret || '.' || claims-json`. There is exactly
//! one verification path: every consumer goes through [`verify_token`],
//! which checks the digest (constant-time) and the expiry. Decode-only
//! acceptance does not exist.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::Role;

/// Decoded identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Expiry, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

fn sign(secret: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(b".");
    hasher.update(payload);
    hasher.finalize().into()
}

/// Issue a token for the given claims; expiry lives inside `claims.exp`.
pub fn issue_token(secret: &str, claims: &AuthClaims) -> String {
    let payload = serde_json::to_vec(claims).expect("claims serialize");
    let digest = sign(secret.as_bytes(), &payload);
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Verify a token's digest and expiry, returning the claims.
pub fn verify_token(secret: &str, token: &str, now_unix: i64) -> Result<AuthClaims, TokenError> {
    let (payload_b64, digest_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Malformed)?;
    let presented = URL_SAFE_NO_PAD
        .decode(digest_b64)
        .map_err(|_| TokenError::Malformed)?;

    let expected = sign(secret.as_bytes(), &payload);
    if presented.len() != expected.len() || expected.ct_eq(&presented[..]).unwrap_u8() != 1 {
        return Err(TokenError::BadSignature);
    }

    let claims: AuthClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
    if claims.exp <= now_unix {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> AuthClaims {
        AuthClaims {
            sub: Uuid::new_v4(),
            name: "Amira Hassan".into(),
            email: "amira@safe.test".into(),
            role: Role::Patient,
            exp,
        }
    }

    #[test]
    fn round_trip() {
        let c = claims(2_000_000_000);
        let token = issue_token("secret", &c);
        let decoded = verify_token("secret", &token, 1_900_000_000).unwrap();
        assert_eq!(decoded.sub, c.sub);
        assert_eq!(decoded.email, c.email);
        assert_eq!(decoded.role, Role::Patient);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_token("secret-a", &claims(2_000_000_000));
        assert_eq!(
            verify_token("secret-b", &token, 1_900_000_000),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn expired_rejected() {
        let token = issue_token("secret", &claims(1_000));
        assert_eq!(
            verify_token("secret", &token, 2_000),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_payload_rejected() {
        let c = claims(2_000_000_000);
        let token = issue_token("secret", &c);
        let (_, digest) = token.split_once('.').unwrap();

        // Forge an admin payload, reuse the old digest
        let mut forged = c.clone();
        forged.role = Role::Admin;
        let payload = serde_json::to_vec(&forged).unwrap();
        let forged_token = format!(
            "{}.{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload),
            digest
        );
        assert_eq!(
            verify_token("secret", &forged_token, 1_900_000_000),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(
            verify_token("secret", "not-a-token", 0),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            verify_token("secret", "a.b.c", 0),
            Err(TokenError::Malformed)
        );
        assert_eq!(verify_token("secret", "", 0), Err(TokenError::Malformed));
    }
}
