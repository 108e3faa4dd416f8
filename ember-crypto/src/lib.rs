//! Hashing and contract address derivation for the Ember contract engine.

pub mod address;
pub mod hash;
