pub mod cleanup;
pub mod events;
pub mod finalization;
pub mod lobby;
pub mod powerups;
pub mod questions;
pub mod round;
pub mod scoring;
pub mod settings;

// Re-export main components
pub use cleanup::*;
pub use events::*;
pub use finalization::*;
pub use lobby::*;
pub use powerups::*;
pub use questions::*;
pub use round::*;
pub use scoring::*;
pub use settings::*;
