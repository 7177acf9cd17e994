//! Per-patient browsing sessions: ownership, reuse, and login.

pub mod login;
mod manager;

pub use login::login;
pub use manager::{SessionLease, SessionManager};
