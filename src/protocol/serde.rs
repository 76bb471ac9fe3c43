//! Byte-level serialisation of type descriptors.
//!
//! Every descriptor serialises to `[len: u32 BE][tag: u8][body]`, where
//! `len` counts the whole serialised descriptor including the len field
//! itself. Primitive bodies are empty, so a primitive is exactly 5 bytes.
//! Struct and Union bodies are `[count: u32 BE][field1..fieldN]` with each
//! field a full serialised descriptor (`len` = 9 + sum of field lengths).
//! An Array body is `[length: u64 BE][element]` (`len` = 13 + element
//! length).
//!
//! The reader validates every length field against the enclosing buffer as
//! it goes; overruns, unknown tags, and inconsistent lengths all fail with
//! [`ProtocolError::MalformedType`].

use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive as _;

use super::{ProtocolError, TypeDesc};

/// Wire tag identifying a descriptor variant.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Primitive)]
pub enum TypeTag {
    /// Two-byte character.
    Char = 0,
    /// Four-byte signed integer.
    Int32 = 1,
    /// Eight-byte signed integer.
    Int64 = 2,
    /// Four-byte IEEE float.
    Float32 = 3,
    /// Eight-byte IEEE float.
    Float64 = 4,
    /// Single byte.
    Bool = 5,
    /// Product type.
    Struct = 6,
    /// Sum type.
    Union = 7,
    /// Fixed-length array.
    Array = 8,
}

// Serialised overhead: every descriptor starts with a 4-byte len and a
// 1-byte tag; containers add a 4-byte count, arrays an 8-byte length.
const PRIMITIVE_LEN: u32 = 5;
const CONTAINER_HEADER_LEN: u32 = 9;
const ARRAY_HEADER_LEN: u32 = 13;

impl TypeDesc {
    /// The wire tag for this descriptor.
    pub fn tag(&self) -> TypeTag {
        match self {
            TypeDesc::Char => TypeTag::Char,
            TypeDesc::Int32 => TypeTag::Int32,
            TypeDesc::Int64 => TypeTag::Int64,
            TypeDesc::Float32 => TypeTag::Float32,
            TypeDesc::Float64 => TypeTag::Float64,
            TypeDesc::Bool => TypeTag::Bool,
            TypeDesc::Struct(_) => TypeTag::Struct,
            TypeDesc::Union(_) => TypeTag::Union,
            TypeDesc::Array { .. } => TypeTag::Array,
        }
    }

    /// The serialised length of this descriptor, len field included.
    ///
    /// Fails with [`ProtocolError::TypeTooLarge`] if the length overflows
    /// the u32 len field.
    pub fn wire_len(&self) -> Result<u32, ProtocolError> {
        match self {
            TypeDesc::Char
            | TypeDesc::Int32
            | TypeDesc::Int64
            | TypeDesc::Float32
            | TypeDesc::Float64
            | TypeDesc::Bool => Ok(PRIMITIVE_LEN),
            TypeDesc::Struct(children) | TypeDesc::Union(children) => {
                children
                    .iter()
                    .try_fold(CONTAINER_HEADER_LEN, |sum, child| {
                        sum.checked_add(child.wire_len()?)
                            .ok_or(ProtocolError::TypeTooLarge)
                    })
            }
            TypeDesc::Array { elem, .. } => elem
                .wire_len()?
                .checked_add(ARRAY_HEADER_LEN)
                .ok_or(ProtocolError::TypeTooLarge),
        }
    }

    /// Serialises this descriptor into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.wire_len()? as usize);
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        buf.write_u32::<NetworkEndian>(self.wire_len()?)?;
        buf.write_u8(self.tag() as u8)?;

        match self {
            TypeDesc::Char
            | TypeDesc::Int32
            | TypeDesc::Int64
            | TypeDesc::Float32
            | TypeDesc::Float64
            | TypeDesc::Bool => {}
            TypeDesc::Struct(children) | TypeDesc::Union(children) => {
                let count = u32::try_from(children.len())
                    .map_err(|_| ProtocolError::TypeTooLarge)?;
                buf.write_u32::<NetworkEndian>(count)?;
                for child in children {
                    child.write_to(buf)?;
                }
            }
            TypeDesc::Array { length, elem } => {
                buf.write_u64::<NetworkEndian>(*length)?;
                elem.write_to(buf)?;
            }
        }

        Ok(())
    }

    /// Deserialises a descriptor that occupies the whole of `buf`.
    ///
    /// Trailing bytes after the descriptor are an error; callers that embed
    /// a descriptor in a larger body slice off its declared extent first.
    pub fn from_bytes(buf: &[u8]) -> Result<TypeDesc, ProtocolError> {
        let (desc, used) = parse(buf)?;
        if used != buf.len() {
            return Err(ProtocolError::MalformedType(format!(
                "{} trailing bytes after descriptor",
                buf.len() - used
            )));
        }
        Ok(desc)
    }
}

/// Parses one descriptor from the front of `buf`, returning it and the
/// number of bytes consumed.
fn parse(buf: &[u8]) -> Result<(TypeDesc, usize), ProtocolError> {
    if buf.len() < PRIMITIVE_LEN as usize {
        return Err(ProtocolError::MalformedType(format!(
            "truncated descriptor: {} bytes",
            buf.len()
        )));
    }

    let len = NetworkEndian::read_u32(&buf[0..4]) as usize;
    if len < PRIMITIVE_LEN as usize || len > buf.len() {
        return Err(ProtocolError::MalformedType(format!(
            "descriptor length {} out of bounds for a {}-byte buffer",
            len,
            buf.len()
        )));
    }

    let tag = TypeTag::from_u8(buf[4]).ok_or_else(|| {
        ProtocolError::MalformedType(format!("unknown type tag 0x{:02X}", buf[4]))
    })?;

    let desc = match tag {
        TypeTag::Char
        | TypeTag::Int32
        | TypeTag::Int64
        | TypeTag::Float32
        | TypeTag::Float64
        | TypeTag::Bool => {
            if len != PRIMITIVE_LEN as usize {
                return Err(ProtocolError::MalformedType(format!(
                    "primitive descriptor with length {}",
                    len
                )));
            }
            match tag {
                TypeTag::Char => TypeDesc::Char,
                TypeTag::Int32 => TypeDesc::Int32,
                TypeTag::Int64 => TypeDesc::Int64,
                TypeTag::Float32 => TypeDesc::Float32,
                TypeTag::Float64 => TypeDesc::Float64,
                _ => TypeDesc::Bool,
            }
        }
        TypeTag::Struct | TypeTag::Union => {
            if len < CONTAINER_HEADER_LEN as usize {
                return Err(ProtocolError::MalformedType(format!(
                    "container descriptor with length {}",
                    len
                )));
            }
            let count = NetworkEndian::read_u32(&buf[5..9]);

            let mut children = Vec::new();
            let mut offset = CONTAINER_HEADER_LEN as usize;
            for _ in 0..count {
                let (child, used) = parse(&buf[offset..len])?;
                children.push(child);
                offset += used;
            }
            if offset != len {
                return Err(ProtocolError::MalformedType(format!(
                    "container length {} does not match its {} fields",
                    len, count
                )));
            }

            if tag == TypeTag::Struct {
                TypeDesc::Struct(children)
            } else {
                TypeDesc::Union(children)
            }
        }
        TypeTag::Array => {
            if len < (ARRAY_HEADER_LEN + PRIMITIVE_LEN) as usize {
                return Err(ProtocolError::MalformedType(format!(
                    "array descriptor with length {}",
                    len
                )));
            }
            let length = NetworkEndian::read_u64(&buf[5..13]);
            let (elem, used) = parse(&buf[ARRAY_HEADER_LEN as usize..len])?;
            if ARRAY_HEADER_LEN as usize + used != len {
                return Err(ProtocolError::MalformedType(format!(
                    "array length {} does not match its element",
                    len
                )));
            }
            TypeDesc::Array {
                length,
                elem: Box::new(elem),
            }
        }
    };

    Ok((desc, len))
}
