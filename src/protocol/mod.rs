//! The framed command wire protocol.
//!
//! Every command travels as one frame: a fixed 25-byte header followed by a
//! command-specific payload.
//!
//! ```text
//!  0              15 16   17                       24 25 …
//! [client id, 16 B ][cmd B][payload length, u64 BE  ][payload …]
//! ```
//!
//! All multi-byte integers on the wire are big-endian. The payload is
//! delivered verbatim to the command layer; an empty payload is valid.
//! Replies are not framed by this module; each command defines its own
//! reply bytes on the client's dedicated reply channel.

pub mod command;

mod error;
mod serde;
mod types;

use std::io::{Read, Write};

use byteorder::{ByteOrder, NetworkEndian};
use uuid::Uuid;

pub use command::*;
pub use error::*;
pub use serde::TypeTag;
pub use types::*;

/// Size in bytes of the fixed command frame header.
pub const HEADER_LEN: usize = 25;

/// A parsed command frame: the fixed header plus a borrowed payload.
///
/// Parsing a frame interprets only the header; the payload stays raw until
/// [`Command::parse`] is called (the dispatcher resolves the client and takes
/// its command-serialisation lock in between).
#[derive(Debug, Clone, Copy)]
pub struct CommandFrame<'a> {
    /// The issuing client's identifier.
    pub client_id: Uuid,
    /// The command to execute.
    pub tag: CommandTag,
    /// The raw command body.
    pub payload: &'a [u8],
}

impl<'a> CommandFrame<'a> {
    /// Parses a raw frame.
    ///
    /// Fails with [`ProtocolError::ShortFrame`] if fewer than 25 header
    /// bytes are present, [`ProtocolError::SizeMismatch`] if the trailing
    /// payload differs from the declared length, and
    /// [`ProtocolError::UnsupportedCommand`] for a tag outside the command
    /// table.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ProtocolError> {
        if raw.len() < HEADER_LEN {
            return Err(ProtocolError::ShortFrame(raw.len()));
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&raw[0..16]);
        let client_id = Uuid::from_bytes(id);

        let declared = NetworkEndian::read_u64(&raw[17..25]);
        let actual = (raw.len() - HEADER_LEN) as u64;
        if declared != actual {
            return Err(ProtocolError::SizeMismatch { declared, actual });
        }

        let tag = num_traits::FromPrimitive::from_u8(raw[16])
            .ok_or(ProtocolError::UnsupportedCommand(raw[16]))?;

        Ok(CommandFrame {
            client_id,
            tag,
            payload: &raw[HEADER_LEN..],
        })
    }
}

/// Reads one raw frame from a stream.
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary; an EOF inside a
/// frame is an error. The returned buffer holds the complete frame (header
/// and payload) and parses with [`CommandFrame::parse`].
pub fn read_frame<R: Read>(r: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut header = [0u8; HEADER_LEN];

    let mut got = 0;
    while got < HEADER_LEN {
        match r.read(&mut header[got..]) {
            Ok(0) if got == 0 => return Ok(None),
            Ok(0) => return Err(ProtocolError::ShortFrame(got)),
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let declared = NetworkEndian::read_u64(&header[17..25]);
    let total = usize::try_from(declared)
        .ok()
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| {
            ProtocolError::MalformedFrame("payload length exceeds addressable memory".to_owned())
        })?;

    let mut frame = vec![0u8; total];
    frame[..HEADER_LEN].copy_from_slice(&header);
    r.read_exact(&mut frame[HEADER_LEN..])?;

    Ok(Some(frame))
}

/// Writes a command frame issued by `client_id` to an output stream.
pub fn write_frame<W: Write>(
    w: &mut W,
    client_id: Uuid,
    command: &Command,
) -> Result<(), ProtocolError> {
    let payload = command.encode()?;

    let mut header = [0u8; HEADER_LEN];
    header[0..16].copy_from_slice(client_id.as_bytes());
    header[16] = command.tag() as u8;
    NetworkEndian::write_u64(&mut header[17..25], payload.len() as u64);

    w.write_all(&header)?;
    w.write_all(&payload)?;

    Ok(())
}

/// Encodes a command frame into a fresh buffer. See [`write_frame`].
pub fn encode_frame(client_id: Uuid, command: &Command) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    write_frame(&mut buf, client_id, command)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn test_id() -> Uuid {
        Uuid::from_bytes([
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
        ])
    }

    #[test]
    fn frame_roundtrip() {
        let cmd = Command::AcceptType(TypeDesc::Int32);
        let raw = encode_frame(test_id(), &cmd).unwrap();

        let frame = CommandFrame::parse(&raw).unwrap();
        assert_eq!(frame.client_id, test_id());
        assert_eq!(frame.tag, CommandTag::AcceptType);
        assert_eq!(Command::parse(frame.tag, frame.payload).unwrap(), cmd);
    }

    #[test]
    fn empty_payload_is_valid() {
        let mut raw = Vec::new();
        raw.extend_from_slice(test_id().as_bytes());
        raw.push(CommandTag::Get as u8);
        raw.extend_from_slice(&0u64.to_be_bytes());

        let frame = CommandFrame::parse(&raw).unwrap();
        assert_eq!(frame.payload, &[] as &[u8]);
    }

    #[test]
    fn short_frame() {
        assert_matches!(
            CommandFrame::parse(&[0u8; 24]),
            Err(ProtocolError::ShortFrame(24))
        );
    }

    #[test]
    fn declared_length_mismatch() {
        let mut raw = encode_frame(test_id(), &Command::Get(TypeDesc::Bool)).unwrap();
        raw.push(0);
        assert_matches!(
            CommandFrame::parse(&raw),
            Err(ProtocolError::SizeMismatch { .. })
        );
    }

    #[test]
    fn unknown_tag() {
        let mut raw = Vec::new();
        raw.extend_from_slice(test_id().as_bytes());
        raw.push(9);
        raw.extend_from_slice(&0u64.to_be_bytes());

        assert_matches!(
            CommandFrame::parse(&raw),
            Err(ProtocolError::UnsupportedCommand(9))
        );
    }

    #[test]
    fn read_frame_splits_a_stream() {
        let first = encode_frame(test_id(), &Command::AcceptType(TypeDesc::Char)).unwrap();
        let second = encode_frame(test_id(), &Command::Empty(TypeDesc::Char)).unwrap();

        let mut stream = Cursor::new([first.clone(), second.clone()].concat());
        assert_eq!(read_frame(&mut stream).unwrap(), Some(first));
        assert_eq!(read_frame(&mut stream).unwrap(), Some(second));
        assert_eq!(read_frame(&mut stream).unwrap(), None);
    }

    #[test]
    fn read_frame_eof_mid_header() {
        let raw = encode_frame(test_id(), &Command::Get(TypeDesc::Bool)).unwrap();
        let mut stream = Cursor::new(raw[..10].to_vec());
        assert_matches!(read_frame(&mut stream), Err(ProtocolError::ShortFrame(10)));
    }

    #[test]
    fn read_frame_eof_mid_payload() {
        let raw = encode_frame(test_id(), &Command::Get(TypeDesc::Bool)).unwrap();
        let mut stream = Cursor::new(raw[..raw.len() - 2].to_vec());
        assert_matches!(read_frame(&mut stream), Err(ProtocolError::Io(_)));
    }
}
