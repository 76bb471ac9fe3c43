//! Defines error types for the wire protocol.

use thiserror::Error;

use super::command::CommandTag;

/// An error produced while reading or writing the wire protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Fewer bytes than a complete frame header were supplied.
    #[error("short frame: got {0} bytes, the header alone is 25")]
    ShortFrame(usize),
    /// The frame's trailing payload does not match the declared length.
    #[error("frame size mismatch: header declares {declared} payload bytes, got {actual}")]
    SizeMismatch {
        /// The payload length declared in the frame header.
        declared: u64,
        /// The number of payload bytes actually present.
        actual: u64,
    },
    /// A command body is structurally invalid.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// A type descriptor failed to parse.
    #[error("malformed type descriptor: {0}")]
    MalformedType(String),
    /// A type's size or serialised length overflows its integer width.
    #[error("type descriptor too large")]
    TypeTooLarge,
    /// The command tag is not part of the protocol.
    #[error("unsupported command tag {0}")]
    UnsupportedCommand(u8),
    /// The command tag is reserved and has no defined behavior yet.
    #[error("unimplemented command: {0:?}")]
    Unimplemented(CommandTag),
    /// An I/O error occurred, such as an unexpected EOF mid-frame.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
