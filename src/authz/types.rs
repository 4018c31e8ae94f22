use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role carried in the token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Owner,
    Tenant,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Owner => "OWNER",
            Role::Tenant => "TENANT",
            Role::Agent => "AGENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts `OWNER`, `owner` and the legacy `ROLE_OWNER` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("ROLE_").unwrap_or(&upper) {
            "ADMIN" => Ok(Role::Admin),
            "OWNER" => Ok(Role::Owner),
            "TENANT" => Ok(Role::Tenant),
            "AGENT" => Ok(Role::Agent),
            _ => Err(format!("unknown role `{s}`")),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
        }
    }
}

/// Who a property, visit or lease belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parties {
    /// Email of the owning user, if the property still has one
    pub owner_email: Option<String>,
    /// Tenant email of a visit or lease; `None` for bare properties
    pub tenant_email: Option<String>,
}

impl Parties {
    pub fn property(owner_email: Option<String>) -> Self {
        Self {
            owner_email,
            tenant_email: None,
        }
    }

    pub fn booking(owner_email: Option<String>, tenant_email: impl Into<String>) -> Self {
        Self {
            owner_email,
            tenant_email: Some(tenant_email.into()),
        }
    }
}

/// Which side of a resource an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Owner,
    Tenant,
    Participant,
}

/// The caller's strongest relation to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Admin,
    Owner,
    Tenant,
    Stranger,
}

/// Author role stamped on chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderRole {
    Owner,
    Tenant,
    Admin,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Owner => "OWNER",
            SenderRole::Tenant => "TENANT",
            SenderRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for SenderRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(SenderRole::Owner),
            "TENANT" => Ok(SenderRole::Tenant),
            "ADMIN" => Ok(SenderRole::Admin),
            other => Err(format!("unknown sender role `{other}`")),
        }
    }
}
