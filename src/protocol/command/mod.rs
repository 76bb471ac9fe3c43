//! Commands are the top-level IPC structure of the protocol.
//!
//! The frame header carries a one-byte command tag; the payload is the
//! command body. Bodies for AcceptType, Get, and Empty are a bare serialised
//! type descriptor; Register and Send have composite bodies defined in their
//! own modules.

mod register;
mod send;

pub use register::*;
pub use send::*;

use enum_primitive_derive::Primitive;

use super::{ProtocolError, TypeDesc};

/// Wire tag identifying a command.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Primitive)]
pub enum CommandTag {
    /// Introduce a client to the broker.
    Register = 0,
    /// Reserved.
    RegisterSubType = 1,
    /// Declare a type the client is willing to receive.
    AcceptType = 2,
    /// Route a message to a named recipient.
    Send = 3,
    /// Pop one message from an accepted type's queue.
    Get = 4,
    /// Ask whether an accepted type's queue is empty.
    Empty = 5,
}

/// A parsed command body.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a client record under the frame's client id.
    Register(RegisterParams),
    /// Declare a new accepted type; creates the type's queue.
    AcceptType(TypeDesc),
    /// Route a message to a recipient by name.
    Send(SendParams),
    /// Pop one message of exactly the given type; the payload is written to
    /// the issuing client's reply channel.
    Get(TypeDesc),
    /// Reply with a single byte: 0x01 if the given type's queue is empty on
    /// the issuing client, else 0x00.
    Empty(TypeDesc),
}

impl Command {
    /// Parses the command body for `tag`.
    ///
    /// Tag 1 (RegisterSubType) is reserved; parsing it fails with
    /// [`ProtocolError::Unimplemented`].
    pub fn parse(tag: CommandTag, payload: &[u8]) -> Result<Self, ProtocolError> {
        match tag {
            CommandTag::Register => Ok(Command::Register(RegisterParams::parse(payload)?)),
            CommandTag::RegisterSubType => Err(ProtocolError::Unimplemented(tag)),
            CommandTag::AcceptType => Ok(Command::AcceptType(TypeDesc::from_bytes(payload)?)),
            CommandTag::Send => Ok(Command::Send(SendParams::parse(payload)?)),
            CommandTag::Get => Ok(Command::Get(TypeDesc::from_bytes(payload)?)),
            CommandTag::Empty => Ok(Command::Empty(TypeDesc::from_bytes(payload)?)),
        }
    }

    /// The wire tag for this command.
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::Register(_) => CommandTag::Register,
            Command::AcceptType(_) => CommandTag::AcceptType,
            Command::Send(_) => CommandTag::Send,
            Command::Get(_) => CommandTag::Get,
            Command::Empty(_) => CommandTag::Empty,
        }
    }

    /// Encodes the command body (the frame payload, without the header).
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Command::Register(params) => params.encode(),
            Command::Send(params) => params.encode(),
            Command::AcceptType(ty) | Command::Get(ty) | Command::Empty(ty) => ty.to_bytes(),
        }
    }
}
