//! The Send command body.

use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt as _};

use crate::protocol::{ProtocolError, TypeDesc};

/// Body of a Send command:
/// `[nameLen: u32 BE][typeLen: u32 BE][recipient name][serialised type][message]`,
/// with the message running to the end of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SendParams {
    /// Name of the recipient client.
    pub recipient: String,
    /// The sender-asserted type of the message.
    pub ty: TypeDesc,
    /// The message bytes; routable only when exactly `ty.size()` long.
    pub message: Vec<u8>,
}

impl SendParams {
    /// Parses a Send body.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 8 {
            return Err(ProtocolError::MalformedFrame(
                "send body shorter than its length fields".to_owned(),
            ));
        }

        let name_len = NetworkEndian::read_u32(&payload[0..4]) as usize;
        let type_len = NetworkEndian::read_u32(&payload[4..8]) as usize;
        let rest = &payload[8..];

        // Summed as u64 so a pair of large u32s cannot wrap on 32-bit hosts.
        if name_len as u64 + type_len as u64 > rest.len() as u64 {
            return Err(ProtocolError::MalformedFrame(format!(
                "name ({}) and type ({}) lengths exceed a {}-byte body",
                name_len,
                type_len,
                rest.len()
            )));
        }

        let recipient = std::str::from_utf8(&rest[..name_len])
            .map_err(|_| {
                ProtocolError::MalformedFrame("recipient name is not valid UTF-8".to_owned())
            })?
            .to_owned();

        let ty = TypeDesc::from_bytes(&rest[name_len..name_len + type_len])?;
        let message = rest[name_len + type_len..].to_vec();

        Ok(Self {
            recipient,
            ty,
            message,
        })
    }

    /// Encodes a Send body.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name = self.recipient.as_bytes();
        let name_len = u32::try_from(name.len()).map_err(|_| {
            ProtocolError::MalformedFrame("recipient name longer than u32".to_owned())
        })?;
        let ty = self.ty.to_bytes()?;

        let mut buf = Vec::with_capacity(8 + name.len() + ty.len() + self.message.len());
        buf.write_u32::<NetworkEndian>(name_len)?;
        buf.write_u32::<NetworkEndian>(ty.len() as u32)?;
        buf.extend_from_slice(name);
        buf.extend_from_slice(&ty);
        buf.extend_from_slice(&self.message);
        Ok(buf)
    }
}
