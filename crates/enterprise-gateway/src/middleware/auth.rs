//! Bearer-token authentication and permission checks.
//!
//! Token validation is delegated to the external [`SessionValidator`]; the
//! gateway only extracts the token and interprets the session it gets back.

use crate::domain::error::AuthFailure;
use crate::domain::types::{AuthenticatedUser, Request};
use crate::ports::SessionValidator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct Authenticator {
    validator: Arc<dyn SessionValidator>,
}

impl Authenticator {
    pub fn new(validator: Arc<dyn SessionValidator>) -> Self {
        Self { validator }
    }

    /// Resolve the caller's identity from `Authorization: Bearer <token>`
    pub async fn authenticate(&self, request: &Request) -> Result<AuthenticatedUser, AuthFailure> {
        let token = bearer_token(request).ok_or(AuthFailure::MissingHeader)?;

        match self.validator.validate_session(token).await {
            Some(session) => Ok(session.into()),
            None => {
                debug!(request_id = %request.id, "Session validator rejected token");
                Err(AuthFailure::InvalidToken)
            }
        }
    }
}

/// Extract a non-empty bearer token. The scheme is matched case-insensitively.
pub fn bearer_token(request: &Request) -> Option<&str> {
    let header = request.header("authorization")?.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// True iff the user holds every required permission, or `admin:all`
pub fn authorize(user: &AuthenticatedUser, required: &HashSet<String>) -> bool {
    user.is_admin() || required.is_subset(&user.permissions)
}
