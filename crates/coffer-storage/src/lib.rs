//! Concrete preference storage with encryption at rest.
//! Keys are sealed with AES-SIV, values with AES-GCM, both derived from a
//! master key sourced from the OS keyring (or test doubles).

pub mod encrypted_prefs;
pub mod key_provider;
