pub mod errors;
pub mod lobby;
pub mod messages;
pub mod round;
pub mod stats;
pub mod user;

// Re-export all types
pub use errors::*;
pub use lobby::*;
pub use messages::*;
pub use round::*;
pub use stats::*;
pub use user::*;

pub type PlayerId = uuid::Uuid;
pub type SessionId = uuid::Uuid;
