pub mod engine;
pub mod types;

pub use engine::{authorize, check, relation, require_role, sender_role};
pub use types::{Parties, Principal, Relation, Role, Scope, SenderRole};
