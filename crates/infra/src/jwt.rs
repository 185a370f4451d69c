//! HS256 access-token codec.
//!
//! Encodes the transport-agnostic [`JwtClaims`] model into a signed compact
//! JWT and back. Time-window checks go through `validate_claims` with the
//! caller's `now`, so the library-level expiry validation is disabled and
//! the codec stays deterministic under a test clock.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sentra_auth::{JwtClaims, JwtValidator, TokenValidationError, validate_claims};

/// Wire shape of the claims (registered claim names, second precision).
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: Uuid,
    jti: Uuid,
    iat: i64,
    exp: i64,
}

/// Symmetric HS256 encoder/validator.
pub struct Hs256Codec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256Codec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged by `validate_claims` against the injected clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        let wire = WireClaims {
            sub: *claims.sub.as_uuid(),
            jti: *claims.access_token_id.as_uuid(),
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &wire, &self.encoding)
            .map_err(|_| TokenValidationError::Invalid)
    }
}

impl JwtValidator for Hs256Codec {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<WireClaims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenValidationError::Invalid)?;

        let issued_at = DateTime::from_timestamp(data.claims.iat, 0)
            .ok_or(TokenValidationError::Invalid)?;
        let expires_at = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or(TokenValidationError::Invalid)?;

        let claims = JwtClaims {
            sub: data.claims.sub.into(),
            access_token_id: data.claims.jti.into(),
            issued_at,
            expires_at,
        };
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
