//! Zip archive content layer
//!
//! Indexes the regular files of one zip archive and hands out independent
//! decompressing readers for them. HTTP concerns live in `crate::http` and
//! `crate::handler`.

mod error;
mod file;
pub mod identity;
pub mod index;

pub use error::{ArchiveError, Result};
pub use file::ArchiveFile;
pub use identity::{derive_identity, ContentIdentity};
pub use index::{ArchiveIndex, ContentRecord};
