use crate::authz::{Principal, Role};
use crate::errors::DeskError;
use crate::settings::Auth;
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenManager {
    secret: Arc<Vec<u8>>,
    ttl_secs: i64,
}

impl TokenManager {
    pub fn new(cfg: &Auth) -> Self {
        Self {
            secret: Arc::new(cfg.jwt_secret.as_bytes().to_vec()),
            ttl_secs: cfg.token_ttl_secs,
        }
    }

    /// Sign a token for `email` carrying `role`. `sub` is the email.
    pub fn issue(&self, email: &str, role: Role) -> Result<String, DeskError> {
        let now = SystemTime::now();
        let now_secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        let exp_secs = (now_secs + self.ttl_secs).max(0) as u64;

        let mut payload = JwtPayload::new();
        payload.set_subject(email);
        payload.set_claim("role", Some(json!(role.as_str())))?;
        payload.set_issued_at(&now);
        payload.set_expires_at(&(UNIX_EPOCH + Duration::from_secs(exp_secs)));

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        header.set_algorithm("HS256");

        let signer = HS256.signer_from_bytes(self.secret.as_slice())?;
        let token = jwt::encode_with_signer(&payload, &header, &signer)?;
        Ok(token)
    }

    /// Verify signature and expiry, returning the caller identity.
    pub fn verify(&self, token: &str) -> Result<Principal, DeskError> {
        let verifier = HS256.verifier_from_bytes(self.secret.as_slice())?;
        let (payload, _header) = jwt::decode_with_verifier(token, &verifier)?;

        let expires_at = payload
            .expires_at()
            .ok_or_else(|| DeskError::Token("token has no expiry".into()))?;
        if expires_at <= SystemTime::now() {
            return Err(DeskError::Token("token expired".into()));
        }

        let email = payload
            .subject()
            .ok_or_else(|| DeskError::Token("token has no subject".into()))?;
        let role = payload
            .claim("role")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DeskError::Token("token has no role".into()))?
            .parse::<Role>()
            .map_err(DeskError::Token)?;

        Ok(Principal::new(email, role))
    }
}
