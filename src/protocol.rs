//! Shared protocol constants for the ftx entry stream
//!
//! Wire layout, one frame per filesystem entry:
//!
//! ```text
//! Directory frame:  "D\n" <relative_path> "\n"
//! File frame:       "F\n" <relative_path> "\n" <decimal_size> "\n" <raw bytes>
//! ```
//!
//! There is no trailer frame: the sender shutting down its write side while
//! the receiver waits for the next marker ends the session.

// Frame type markers
pub mod marker {
    pub const DIRECTORY: u8 = b'D';
    pub const FILE: u8 = b'F';
}

// Header line terminator
pub const NEWLINE: u8 = b'\n';

// Relative paths on the wire always use '/'
pub const WIRE_SEPARATOR: char = '/';

// Body chunk size (4KB) - bounds memory on both sides independent of file size
pub const CHUNK_SIZE: usize = 4 * 1024;

// Maximum header line length, including the newline. A peer that never
// sends a newline cannot make the receiver buffer more than this.
pub const MAX_HEADER_LINE: usize = 4 * 1024;

// Built-in defaults used when no config file is present
pub mod defaults {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 9999;
    pub const ROOT: &str = ".";
    pub const CONFIG_FILE: &str = "ftx.toml";
}
