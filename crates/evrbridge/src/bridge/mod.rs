//! IPC bridge between the host and the helper process.
//!
//! This module provides the wire protocol, codec and pipe transport. Process
//! lifecycle lives in `supervisor`, retries in `retry`.
//!
//! # Architecture
//!
//! - **protocol**: Request types and response decoding
//! - **codec**: JSON-line framing codec for AsyncRead/AsyncWrite
//! - **transport**: Host ends of the pipe pair plus helper stdio capture

pub mod codec;
pub mod protocol;
pub mod transport;
