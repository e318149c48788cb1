//! Authentication context extraction
//!
//! Handlers take an [`AuthContext`] argument to require a valid bearer access
//! token, or a [`Viewer`] where anonymous reads are allowed. Extraction only
//! verifies the JWT; it never touches the database.

use crate::auth::policy::{Policy, RoleName};
use crate::auth::TokenType;
use crate::error::{ApiError, ApiResult};
use crate::server::ChelalServer;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, Method};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub username: String,
    pub role: Option<String>,
    /// Verb of the current request, used by the role gate
    pub method: Method,
}

impl AuthContext {
    pub fn new(
        user_id: i64,
        username: impl Into<String>,
        role: Option<&str>,
        method: Method,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            role: role.map(str::to_string),
            method,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.role().is_some_and(|r| role.matches(r))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(RoleName::Admin)
    }

    /// Apply `policy` to this request's verb and role.
    pub fn require(&self, policy: &Policy) -> ApiResult<()> {
        policy.authorize(&self.method, self.role())
    }

    /// Apply `policy` as if the request used `method`.
    pub fn require_for(&self, policy: &Policy, method: &Method) -> ApiResult<()> {
        policy.authorize(method, self.role())
    }
}

pub const CREDENTIALS_MISSING: &str = "Authentication credentials were not provided.";

/// Pull the bearer token out of the Authorization header
fn extract_token(parts: &Parts) -> ApiResult<&str> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::authentication(CREDENTIALS_MISSING))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::authentication("Invalid Authorization header format. Expected: Bearer <token>")
        })
}

#[async_trait]
impl FromRequestParts<ChelalServer> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ChelalServer,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let claims = state.jwt.validate(token, TokenType::Access)?;

        Ok(AuthContext {
            user_id: claims.user_id()?,
            username: claims.username,
            role: claims.role,
            method: parts.method.clone(),
        })
    }
}

/// Caller of an endpoint that may be read without a token.
///
/// No Authorization header extracts as anonymous. A header that is present
/// but invalid is rejected with 401 exactly as for [`AuthContext`].
#[derive(Debug, Clone)]
pub struct Viewer {
    auth: Option<AuthContext>,
    method: Method,
}

impl Viewer {
    pub fn anonymous(method: Method) -> Self {
        Self { auth: None, method }
    }

    pub fn caller(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    /// Signed-in callers go through the role gate; anonymous ones pass only
    /// public reads and otherwise get 401.
    pub fn require(&self, policy: &Policy) -> ApiResult<()> {
        match &self.auth {
            Some(auth) => auth.require(policy),
            None if policy.allows_anonymous(&self.method) => Ok(()),
            None => Err(ApiError::authentication(CREDENTIALS_MISSING)),
        }
    }
}

impl From<AuthContext> for Viewer {
    fn from(auth: AuthContext) -> Self {
        let method = auth.method.clone();
        Self { auth: Some(auth), method }
    }
}

#[async_trait]
impl FromRequestParts<ChelalServer> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ChelalServer,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Viewer::anonymous(parts.method.clone()));
        }
        AuthContext::from_request_parts(parts, state).await.map(Viewer::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/patients");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(&parts_with(Some("Bearer abc"))).unwrap(), "abc");
        assert!(extract_token(&parts_with(Some("Token abc"))).is_err());
        assert!(extract_token(&parts_with(Some("Bearer "))).is_err());
        assert!(extract_token(&parts_with(None)).is_err());
    }

    #[test]
    fn role_helpers() {
        let ctx = AuthContext::new(3, "rx", Some("pharmacist"), Method::POST);
        assert!(ctx.has_role(RoleName::Pharmacist));
        assert!(!ctx.is_admin());
        assert!(ctx.require(&crate::auth::policy::INVENTORY).is_ok());
        assert!(ctx.require(&crate::auth::policy::BILLING).is_err());
        assert!(ctx
            .require_for(&crate::auth::policy::BILLING, &Method::GET)
            .is_ok());
    }

    #[test]
    fn anonymous_viewer_reads_public_resources_only() {
        use crate::auth::policy::{BILLING, PATIENTS};

        assert!(Viewer::anonymous(Method::GET).require(&PATIENTS).is_ok());

        let billing = Viewer::anonymous(Method::GET).require(&BILLING).unwrap_err();
        assert_eq!(billing.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let write = Viewer::anonymous(Method::POST).require(&PATIENTS).unwrap_err();
        assert_eq!(write.to_string(), CREDENTIALS_MISSING);
    }

    #[test]
    fn signed_in_viewer_goes_through_the_role_gate() {
        let nurse = Viewer::from(AuthContext::new(5, "n", Some("Nurse"), Method::GET));
        assert!(nurse.caller().is_some());
        assert!(nurse.require(&crate::auth::policy::BILLING).is_ok());
        assert!(nurse.require(&crate::auth::policy::AUDIT_LOGS).is_err());
    }
}
