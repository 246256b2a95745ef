//! Continuous one-way mirroring of a source directory tree into a backup directory.
//!
//! [`mirror::MirrorEngine`] performs an initial full pass and then follows live
//! filesystem notifications, copying new or newer files with bounded retry.
//! Deletions are never propagated.

pub mod mirror;
pub mod utils;
