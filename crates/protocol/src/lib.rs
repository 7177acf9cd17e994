//! Wire types for the randevu search/booking channel.
//!
//! This crate holds the serde-serializable shapes exchanged between a
//! connected client and the engine, plus the patient and monitor record shapes
//! shared with the record store. Types here are pure data: no behavior beyond
//! (de)serialization and a few display helpers.
//!
//! Higher-level behavior lives in `randevu-core`.

pub mod messages;
pub mod monitor;
pub mod outcome;
pub mod patient;

pub use messages::*;
pub use monitor::*;
pub use outcome::*;
pub use patient::*;
