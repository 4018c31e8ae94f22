use crate::authz::types::{Parties, Principal, Relation, Role, Scope, SenderRole};
use crate::errors::DeskError;

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Does `principal` own the resource?
fn owns(principal: &Principal, parties: &Parties) -> bool {
    parties
        .owner_email
        .as_deref()
        .is_some_and(|owner| same_email(owner, &principal.email))
}

/// Is `principal` the tenant on the resource?
fn rents(principal: &Principal, parties: &Parties) -> bool {
    parties
        .tenant_email
        .as_deref()
        .is_some_and(|tenant| same_email(tenant, &principal.email))
}

/// Resolve how `principal` relates to the resource described by `parties`.
///
/// Admins relate as `Admin` regardless of ownership. For everyone else the
/// relation is derived from emails only; the role does not grant anything.
pub fn relation(principal: &Principal, parties: &Parties) -> Relation {
    match principal.role {
        Role::Admin => Relation::Admin,
        Role::Owner | Role::Tenant | Role::Agent => {
            if owns(principal, parties) {
                Relation::Owner
            } else if rents(principal, parties) {
                Relation::Tenant
            } else {
                Relation::Stranger
            }
        }
    }
}

/// Is `principal` allowed to act in `scope` on the resource?
pub fn check(principal: &Principal, scope: Scope, parties: &Parties) -> bool {
    match (principal.role, scope) {
        (Role::Admin, _) => true,
        (Role::Owner | Role::Tenant | Role::Agent, Scope::Owner) => owns(principal, parties),
        (Role::Owner | Role::Tenant | Role::Agent, Scope::Tenant) => rents(principal, parties),
        (Role::Owner | Role::Tenant | Role::Agent, Scope::Participant) => {
            owns(principal, parties) || rents(principal, parties)
        }
    }
}

/// [`check`] as a `Result`, yielding 403 on refusal.
pub fn authorize(principal: &Principal, scope: Scope, parties: &Parties) -> Result<(), DeskError> {
    if check(principal, scope, parties) {
        Ok(())
    } else {
        tracing::debug!(
            email = %principal.email,
            role = %principal.role,
            ?scope,
            "authorization denied"
        );
        Err(DeskError::Forbidden(match scope {
            Scope::Owner => "Only the property owner or an admin may do this".to_string(),
            Scope::Tenant => "Only the tenant or an admin may do this".to_string(),
            Scope::Participant => "Not a participant of this record".to_string(),
        }))
    }
}

/// Pure role gate, applied before any lookup.
pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<(), DeskError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        tracing::debug!(email = %principal.email, role = %principal.role, "role gate denied");
        Err(DeskError::Forbidden(format!(
            "Role {} may not do this",
            principal.role
        )))
    }
}

/// Author role for a chat message. Callers must already be participants.
pub fn sender_role(principal: &Principal, parties: &Parties) -> SenderRole {
    match relation(principal, parties) {
        Relation::Admin => SenderRole::Admin,
        Relation::Owner => SenderRole::Owner,
        Relation::Tenant | Relation::Stranger => SenderRole::Tenant,
    }
}
