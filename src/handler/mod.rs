//! Request handler module
//!
//! Request routing dispatch plus the archive content and request dump handlers.

pub mod archive_content;
pub mod dump;
pub mod router;

// Re-export main entry points
pub use archive_content::ArchiveContentServer;
pub use router::handle_request;
