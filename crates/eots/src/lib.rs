//! Extractable one-time signatures over secp256k1.
//!
//! An EOTS signature is the `s` half of a Schnorr signature `(R, s)` where
//! `R` is fixed ahead of time by a public randomness commitment. Signing two
//! distinct messages against the same `R` leaks the secret key; that leak is
//! the protocol's slashing primitive, so the signer side must treat every
//! nonce as strictly single-use.

mod error;
mod eots;
mod rand_gen;

pub use error::EotsError;
pub use eots::{
    extract, new_pub_rand, new_sec_rand, new_sig, pub_rand_to_bytes, sec_rand_to_bytes,
    sig_to_bytes, PubRand, PublicKey, SecRand, SecretKey, Signature,
};
pub use rand_gen::generate_randomness;

pub type Result<T> = std::result::Result<T, EotsError>;
