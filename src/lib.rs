//! Zip archive content server
//!
//! Serves the files of a single zip archive over HTTP, answering conditional
//! GET requests (`If-None-Match`, `If-Modified-Since`) with `304 Not Modified`.

pub mod archive;
pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
