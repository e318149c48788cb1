/// JWT access and refresh tokens
///
/// Tokens are HS256-signed with the configured secret. The role name rides in
/// the claims so the role gate needs no database round trip; refreshing a
/// token re-reads the role from the database.
use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

// =============================================================================
// JWT TOKEN CLAIMS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    /// Role name, absent for users without a role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub token_type: TokenType,
    /// JWT ID (unique token identifier)
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl TokenClaims {
    pub fn user_id(&self) -> ApiResult<i64> {
        self.sub
            .parse()
            .map_err(|_| ApiError::authentication("Invalid subject in token"))
    }
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

// =============================================================================
// JWT SERVICE
// =============================================================================

#[derive(Clone)]
pub struct JwtService {
    inner: Arc<JwtKeys>,
}

struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            inner: Arc::new(JwtKeys {
                encoding_key: EncodingKey::from_secret(secret),
                decoding_key: DecodingKey::from_secret(secret),
                issuer: config.issuer.clone(),
                access_ttl: config.access_token_ttl_secs,
                refresh_ttl: config.refresh_token_ttl_secs,
            }),
        }
    }

    pub fn issue_pair(&self, user_id: i64, username: &str, role: Option<&str>) -> ApiResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user_id, username, role, TokenType::Access)?,
            refresh: self.issue(user_id, username, role, TokenType::Refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.inner.access_ttl,
        })
    }

    pub fn issue(
        &self,
        user_id: i64,
        username: &str,
        role: Option<&str>,
        token_type: TokenType,
    ) -> ApiResult<String> {
        let now = Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.inner.access_ttl,
            TokenType::Refresh => self.inner.refresh_ttl,
        };
        let claims = TokenClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.map(str::to_string),
            token_type,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl,
            iss: self.inner.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding_key)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature, expiry, issuer and token type.
    pub fn validate(&self, token: &str, expected: TokenType) -> ApiResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.inner.issuer.as_str()]);

        let claims = decode::<TokenClaims>(token, &self.inner.decoding_key, &validation)
            .map_err(|e| ApiError::authentication(format!("Invalid token: {}", e)))?
            .claims;

        if claims.token_type != expected {
            return Err(ApiError::authentication("Token has the wrong type"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl: i64) -> JwtService {
        JwtService::new(&AuthConfig {
            jwt_secret: "unit-test-secret".to_string(),
            access_token_ttl_secs: ttl,
            ..AuthConfig::default()
        })
    }

    #[test]
    fn access_token_round_trip() {
        let jwt = service(300);
        let token = jwt.issue(42, "amina", Some("Nurse"), TokenType::Access).unwrap();
        let claims = jwt.validate(&token, TokenType::Access).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "amina");
        assert_eq!(claims.role.as_deref(), Some("Nurse"));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let jwt = service(300);
        let pair = jwt.issue_pair(1, "admin", Some("Admin")).unwrap();
        assert!(jwt.validate(&pair.refresh, TokenType::Access).is_err());
        assert!(jwt.validate(&pair.refresh, TokenType::Refresh).is_ok());
        assert_eq!(pair.expires_in, 300);
    }

    #[test]
    fn expired_token_is_rejected() {
        // Past the default 60s leeway.
        let jwt = service(-120);
        let token = jwt.issue(1, "old", None, TokenType::Access).unwrap();
        assert!(jwt.validate(&token, TokenType::Access).is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = JwtService::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..AuthConfig::default()
        });
        let token = other.issue(1, "x", None, TokenType::Access).unwrap();
        assert!(service(300).validate(&token, TokenType::Access).is_err());
    }
}
