//! ONVIF camera server core.
//!
//! HTTP/1.1 pipeline, digest authentication gate, service dispatcher, the
//! PTZ service and the buffer pool they share.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod pool;
pub mod ptz;
pub mod server;
pub mod service;
pub mod soap;

pub use error::{Error, Result};
