//! The Register command body.

use std::os::unix::ffi::{OsStrExt as _, OsStringExt as _};
use std::path::PathBuf;

use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt as _};

use crate::protocol::ProtocolError;

/// Body of a Register command: `[nameLen: u32 BE][name][path]`, where the
/// path runs to the end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterParams {
    /// The client's name, unique within the broker.
    pub name: String,
    /// Filesystem path of the client's reply socket.
    pub path: PathBuf,
}

impl RegisterParams {
    /// Parses a Register body.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < 4 {
            return Err(ProtocolError::MalformedFrame(
                "register body shorter than its name length field".to_owned(),
            ));
        }

        let name_len = NetworkEndian::read_u32(&payload[0..4]) as usize;
        let rest = &payload[4..];
        if name_len > rest.len() {
            return Err(ProtocolError::MalformedFrame(format!(
                "name length {} exceeds a {}-byte body",
                name_len,
                rest.len()
            )));
        }

        let name = std::str::from_utf8(&rest[..name_len])
            .map_err(|_| {
                ProtocolError::MalformedFrame("client name is not valid UTF-8".to_owned())
            })?
            .to_owned();

        let path = &rest[name_len..];
        if path.is_empty() {
            return Err(ProtocolError::MalformedFrame(
                "register body has no reply path".to_owned(),
            ));
        }

        Ok(Self {
            name,
            path: PathBuf::from(std::ffi::OsString::from_vec(path.to_vec())),
        })
    }

    /// Encodes a Register body.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name = self.name.as_bytes();
        let name_len = u32::try_from(name.len()).map_err(|_| {
            ProtocolError::MalformedFrame("client name longer than u32".to_owned())
        })?;
        let path = self.path.as_os_str().as_bytes();

        let mut buf = Vec::with_capacity(4 + name.len() + path.len());
        buf.write_u32::<NetworkEndian>(name_len)?;
        buf.extend_from_slice(name);
        buf.extend_from_slice(path);
        Ok(buf)
    }
}
