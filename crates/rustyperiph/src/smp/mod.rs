//! Security state and bond management
//!
//! This module holds the pieces of the Security Manager that the session
//! core orchestrates:
//! - Bond records and their in-memory store
//! - The persistence seam for bonds
//! - Tracking of security level changes per connection
//!
//! Pairing itself (key generation, confirm values, ECDH) happens below the
//! session core.

mod keys;
mod tracker;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use self::keys::*;
pub use self::tracker::{SecurityOutcome, SecurityTracker};
pub use self::types::*;
