use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use taskdeck_core::error::codes;

use crate::error::AppError;
use crate::state::AppState;

/// Default lifetime of issued access tokens, in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// JWT claims. `sub` carries the opaque owner identifier used to scope all
/// data access; everything else is optional profile context.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authenticated user extracted from the `Authorization: Bearer <token>`
/// header. Verification is stateless: no user lookup, the signature check
/// is the whole trust decision.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Stateless HS256 verifier, constructed once at startup from configuration
/// and held in `AppState` — explicitly injected, never a lazy global.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    audience: Option<String>,
    issuer: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: &str, audience: Option<String>, issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 10;
        validation.set_required_spec_claims(&["sub", "exp"]);
        match &audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss]);
        }

        JwtVerifier {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
            audience,
            issuer,
        }
    }

    /// Verify a bearer token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AppError::Unauthorized {
                    code: codes::EXPIRED_TOKEN,
                    message: "Token has expired".to_string(),
                    docs_hint: Some("Log in again to obtain a fresh token.".to_string()),
                },
                _ => AppError::Unauthorized {
                    code: codes::INVALID_TOKEN,
                    message: "Token validation failed".to_string(),
                    docs_hint: None,
                },
            })
    }

    /// Issue a signed token for a user, valid for `TOKEN_TTL_SECS`.
    pub fn issue(
        &self,
        user_id: &str,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + TOKEN_TTL_SECS,
            iat: Some(now),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            email,
            name,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                code: codes::MISSING_TOKEN,
                message: "Missing Authorization header".to_string(),
                docs_hint: Some("Include 'Authorization: Bearer <token>' header.".to_string()),
            })?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized {
                code: codes::INVALID_TOKEN,
                message: "Authorization header must use Bearer scheme".to_string(),
                docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
            })?;

        let claims = state.jwt.verify(token)?;
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> JwtVerifier {
        JwtVerifier::new("test-secret", None, None)
    }

    #[test]
    fn issue_verify_roundtrip() {
        let jwt = verifier();
        let token = jwt
            .issue("user-123", Some("a@example.com".to_string()), None)
            .unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = verifier().issue("user-123", None, None).unwrap();
        let other = JwtVerifier::new("different-secret", None, None);
        let err = other.verify(&token).expect_err("forged token must fail");
        assert!(matches!(
            err,
            AppError::Unauthorized {
                code: codes::INVALID_TOKEN,
                ..
            }
        ));
    }

    #[test]
    fn expired_token_is_rejected_with_expired_code() {
        let jwt = verifier();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "user-123".to_string(),
            exp: now - 3600,
            iat: Some(now - 7200),
            aud: None,
            iss: None,
            email: None,
            name: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        let err = jwt.verify(&token).expect_err("expired token must fail");
        assert!(matches!(
            err,
            AppError::Unauthorized {
                code: codes::EXPIRED_TOKEN,
                ..
            }
        ));
    }

    #[test]
    fn audience_mismatch_is_rejected() {
        let issuing = JwtVerifier::new("test-secret", Some("todo-api".to_string()), None);
        let token = issuing.issue("user-123", None, None).unwrap();
        assert!(issuing.verify(&token).is_ok());

        let expecting_other = JwtVerifier::new("test-secret", Some("other-api".to_string()), None);
        assert!(expecting_other.verify(&token).is_err());
    }
}
