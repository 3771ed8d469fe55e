//! Typed, encrypted settings table with idempotent initialization.
//!
//! [`SecurePrefsCell`] owns the one-time setup; [`SecurePrefs`] is the handle
//! callers share once setup has succeeded.

mod cell;
mod prefs;

pub use cell::{PrefsContext, SecurePrefsCell};
pub use prefs::SecurePrefs;
