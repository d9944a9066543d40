//! # Command Bus Coordination
//!
//! Coordination library for a cyberphysical vehicle demonstrator: a set of
//! independently running components (ECU targets, an ignition simulator PC,
//! a hacker-kiosk console) driven over a shared command bus, each governed
//! by a guarded priority state machine.
//!
//! ## Features
//!
//! - **Guarded state machine engine**: ordered transition tables with
//!   guard/unless predicates and fire-once entry actions
//! - **Fixed-width frame protocol**: CAN-flavored identifiers and payload
//!   layouts that independently built peers agree on bit-for-bit
//! - **Two transport flavors**: fan-out command-and-control delivery and
//!   filtered point-to-point channels with receive timeouts
//! - **Three coordinator roles**: commander (target fleet), director
//!   (ignition/simulator), kiosk (attack walkthrough)
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmdbus::bus::FanoutBus;
//! use cmdbus::config::Config;
//! use cmdbus::coordinators::Commander;
//!
//! let config = Config::default();
//! let bus = FanoutBus::new(&config.net.commander_bind, &config.net.cc_subscribers)
//!     .expect("C&C bus construction is fatal");
//! let mut commander = Commander::new(Box::new(bus), &config).expect("valid machine");
//!
//! while !commander.is_exiting() {
//!     commander.tick();
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - identifier tables and the frame codec
//! - [`bus`] - transport flavors over UDP datagrams
//! - [`machine`] - the generic guarded state machine engine
//! - [`registry`] - per-target lifecycle status
//! - [`events`] - internal publish/subscribe to subordinate components
//! - [`coordinators`] - the commander, director and kiosk roles
//! - [`component`] / [`ota`] - seams to the external collaborators

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod bus;
pub mod component;
pub mod config;
pub mod coordinators;
pub mod events;
pub mod machine;
pub mod ota;
pub mod protocol;
pub mod registry;

// Re-export main public types for convenience
pub use bus::{Bus, FanoutBus, PeerBus};
pub use coordinators::{Commander, Director, HackerKiosk};
pub use machine::StateMachine;
pub use protocol::{Frame, FramePayload};
pub use registry::{TargetRegistry, TargetStatus};
