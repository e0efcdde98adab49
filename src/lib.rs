//! ftx library
//!
//! File and directory tree transfer over a single TCP connection using a
//! length-prefixed entry stream.

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod logger;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod receiver;
pub mod sender;
