pub mod lease;
pub mod lease_message;
pub mod property;
pub mod user;
pub mod visit;
pub mod visit_message;

pub use lease::Entity as Lease;
pub use lease_message::Entity as LeaseMessage;
pub use property::Entity as Property;
pub use user::Entity as User;
pub use visit::Entity as Visit;
pub use visit_message::Entity as VisitMessage;
