// Game engine: progression rules, achievements and the live session state.
// Nothing in here does I/O.

pub mod achievements;
pub mod config;
pub mod profile;
pub mod progression;
pub mod session;

pub use profile::Profile;
pub use session::{GameError, GameSession, SessionEvent};
