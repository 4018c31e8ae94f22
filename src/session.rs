use crate::authz::Principal;
use crate::errors::DeskError;
use crate::web::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

#[derive(Clone, Debug)]
pub struct BearerToken {
    pub token: String,
}

impl BearerToken {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers
            .get(axum::http::header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .trim();

        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
        })
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = DeskError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = BearerToken::from_headers(&parts.headers)
            .ok_or_else(|| DeskError::Unauthorized("Missing bearer token".into()))?;

        state.tokens.verify(&bearer.token).map_err(|e| {
            tracing::debug!(error = %e, path = %parts.uri.path(), "rejected bearer token");
            DeskError::Unauthorized("Invalid or expired token".into())
        })
    }
}
