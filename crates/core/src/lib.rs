//! Search and booking engine for a hospital appointment portal.
//!
//! The portal exposes no API, so every flow drives a rendered page through
//! the [`page::PortalPage`] trait. [`Engine`] is the entry point: it acquires
//! a patient's session from the [`SessionManager`], logs in when needed,
//! scans categories, probes coarse buckets, optionally books one slot, and
//! emits exactly one terminal message through the [`Reporter`].

pub mod aggregate;
pub mod artifacts;
pub mod booking;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod locator;
pub mod page;
pub mod patient;
pub mod portal;
pub mod probe;
pub mod progress;
pub mod search;
pub mod session;

pub use config::EngineConfig;
pub use engine::{Engine, Request};
pub use error::{EngineError, Result};
pub use locator::{Locator, Target};
pub use page::{PageFactory, PortalPage};
pub use patient::{BirthDate, ValidatedPatient};
pub use progress::Reporter;
pub use session::{SessionLease, SessionManager};
