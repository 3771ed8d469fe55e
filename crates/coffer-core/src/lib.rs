//! Core abstractions for Coffer: encrypted preference storage contracts and
//! outbound body/progress contracts.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod storage;
pub mod transfer;
