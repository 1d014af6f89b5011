//! The EOTS manager: owns the signing keys, derives per-height randomness,
//! and enforces that no nonce ever signs two different messages.
//!
//! The manager is the only component allowed to touch secret key material.
//! Everything above it works with x-only public keys and opaque signatures.

mod error;
mod keystore;
mod manager;

pub use error::EotsManagerError;
pub use keystore::Keystore;
pub use manager::{EotsManager, DEFAULT_HD_PATH};
