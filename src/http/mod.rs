//! HTTP/1.1 message pipeline.
//!
//! This module implements the server side of HTTP/1.1 with keep-alive
//! connections, as needed by SOAP endpoints.
//!
//! # Architecture
//!
//! - **`connection`**: Per-connection request/response state machine
//! - **`parser`**: Incremental request parser with header validation
//! - **`chunked`**: Decoder for `Transfer-Encoding: chunked` bodies
//! - **`request`**: Request representation, methods, targets and headers
//! - **`response`**: Response representation with builder pattern
//! - **`writer`**: Serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for request bytes (idle deadline applies)
//!        └──────┬──────┘
//!               │ Request parsed          ── malformed ──► Writing (4xx, close)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Auth gate, routing, dispatch
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed (after flush and shutdown)
//! ```
//!
//! # Parser States
//!
//! ```text
//! Method → RequestTarget → Version → Headers → Body → Complete
//! ```
//!
//! Each call to [`parser::RequestParser::parse`] advances as far as the
//! buffer allows and returns [`parser::ParseError::Incomplete`] when it needs
//! more bytes.

pub mod chunked;
pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
