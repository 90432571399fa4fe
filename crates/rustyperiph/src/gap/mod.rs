pub mod advertising;
pub mod constants;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use advertising::{AdFlags, AdvertisingElement, AdvertisingParameters};
pub use constants::*;
pub use registry::{AdvertisingRegistry, AdvertisingSet, SetState};
pub use types::*;
