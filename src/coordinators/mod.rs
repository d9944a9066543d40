//! Concrete protocol roles bound onto the guarded state machine engine.
//!
//! Each coordinator is one process: a single poll loop driving one
//! [`crate::machine::StateMachine`] whose entry actions talk over the
//! command bus and the internal event channel.

pub mod commander;
pub mod director;
pub mod kiosk;

pub use commander::{Commander, CommanderState};
pub use director::{Director, DirectorState};
pub use kiosk::{HackerKiosk, KioskResponse, KioskState};
