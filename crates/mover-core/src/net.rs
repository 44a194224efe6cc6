//! Byte-level wire codec for replicated simulation data.
//!
//! Every polymorphic collection (data collections, layered move arrays,
//! modifier arrays) shares the same wire shape:
//!
//! ```text
//! +-------------+----------------------------------------------+
//! | count (u8)  | count x [ tag_len (u8) | tag (utf-8) | body ] |
//! +-------------+----------------------------------------------+
//! ```
//!
//! The tag is the type descriptor. Receivers validate it against a
//! [`TypeRegistry`](crate::registry::TypeRegistry) before anything is
//! allocated; bodies are `postcard` encodings of the concrete type.

use std::any::Any;
use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::registry::TypeRegistry;

/// Maximum number of entries a single collection can carry on the wire.
pub const MAX_WIRE_ENTRIES: usize = u8::MAX as usize;

/// Maximum byte length of a type descriptor.
pub const MAX_TAG_LEN: usize = u8::MAX as usize;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while writing or reading replicated simulation data.
#[derive(Debug, thiserror::Error)]
pub enum NetSerializeError {
    /// The stream named a type that is not a registered, instantiable
    /// subtype of the expected base. Fatal for the rest of the stream.
    #[error("protocol violation: `{tag}` is not a registered {expected_base} type")]
    ProtocolViolation {
        /// The offending type descriptor.
        tag: String,
        /// Name of the base kind the collection accepts.
        expected_base: &'static str,
    },

    /// The stream ended before a complete value could be read.
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes required by the pending read.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },

    /// The type descriptor bytes were not valid UTF-8.
    #[error("type descriptor is not valid utf-8")]
    InvalidTag,

    /// A payload failed to encode or decode.
    #[error("payload error: {0}")]
    Payload(#[from] postcard::Error),

    /// A collection or tag exceeded what the wire format can express.
    #[error("{count} exceeds the wire maximum of {max}")]
    TooManyEntries {
        /// Requested size.
        count: usize,
        /// Largest size the format supports.
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// Payload traits
// ---------------------------------------------------------------------------

/// Static type information for a replicable simulation type.
pub trait MoverType {
    /// Stable wire tag. Must be unique within a registry.
    const TAG: &'static str;
    /// Tags of the (possibly abstract) parent types, nearest first.
    const PARENTS: &'static [&'static str] = &[];
}

/// Object-safe view over a replicable payload.
///
/// Implemented automatically for every `MoverType` that is also
/// `Serialize + DeserializeOwned`.
pub trait NetPayload: Any + Debug + Send + Sync {
    /// Wire tag of the concrete type.
    fn type_tag(&self) -> &'static str;

    /// Parent tags, nearest first.
    fn ancestry(&self) -> &'static [&'static str];

    /// Returns `true` if this value is `tag` or a subtype of it.
    fn is_a(&self, tag: &str) -> bool {
        self.type_tag() == tag || self.ancestry().contains(&tag)
    }

    /// Writes the payload body.
    fn net_serialize(&self, writer: &mut NetWriter) -> Result<(), NetSerializeError>;

    /// Reads the payload body into `self`, replacing its replicated fields.
    fn net_deserialize(&mut self, reader: &mut NetReader<'_>) -> Result<(), NetSerializeError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> NetPayload for T
where
    T: MoverType + Serialize + DeserializeOwned + Any + Debug + Send + Sync,
{
    fn type_tag(&self) -> &'static str {
        T::TAG
    }

    fn ancestry(&self) -> &'static [&'static str] {
        T::PARENTS
    }

    fn net_serialize(&self, writer: &mut NetWriter) -> Result<(), NetSerializeError> {
        writer.write_payload(self)
    }

    fn net_deserialize(&mut self, reader: &mut NetReader<'_>) -> Result<(), NetSerializeError> {
        *self = reader.read_payload()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// NetWriter
// ---------------------------------------------------------------------------

/// Growable output buffer for the simulation wire format.
#[derive(Debug, Default)]
pub struct NetWriter {
    buffer: Vec<u8>,
}

impl NetWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a collection count as a single byte.
    pub fn write_count(&mut self, count: usize) -> Result<(), NetSerializeError> {
        let count = u8::try_from(count).map_err(|_| NetSerializeError::TooManyEntries {
            count,
            max: MAX_WIRE_ENTRIES,
        })?;
        self.write_u8(count);
        Ok(())
    }

    /// Writes a length-prefixed type descriptor.
    pub fn write_tag(&mut self, tag: &str) -> Result<(), NetSerializeError> {
        let len = u8::try_from(tag.len()).map_err(|_| NetSerializeError::TooManyEntries {
            count: tag.len(),
            max: MAX_TAG_LEN,
        })?;
        self.write_u8(len);
        self.buffer.extend_from_slice(tag.as_bytes());
        Ok(())
    }

    /// Appends the postcard encoding of `value`.
    pub fn write_payload<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), NetSerializeError> {
        let bytes = postcard::to_allocvec(value)?;
        self.buffer.extend_from_slice(&bytes);
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Borrow the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

// ---------------------------------------------------------------------------
// NetReader
// ---------------------------------------------------------------------------

/// Cursor over received bytes.
///
/// The first failed read marks the stream as errored; callers are expected
/// to stop consuming the stream once [`has_error`](Self::has_error) is set.
#[derive(Debug)]
pub struct NetReader<'a> {
    bytes: &'a [u8],
    position: usize,
    errored: bool,
}

impl<'a> NetReader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            errored: false,
        }
    }

    /// Returns `true` once any read on this stream has failed.
    pub fn has_error(&self) -> bool {
        self.errored
    }

    /// Marks the stream as errored and hands the error back.
    pub fn fail<T>(&mut self, error: NetSerializeError) -> Result<T, NetSerializeError> {
        self.errored = true;
        Err(error)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, NetSerializeError> {
        match self.bytes.get(self.position) {
            Some(&byte) => {
                self.position += 1;
                Ok(byte)
            }
            None => self.fail(NetSerializeError::UnexpectedEnd {
                needed: 1,
                remaining: 0,
            }),
        }
    }

    /// Reads a length-prefixed type descriptor.
    pub fn read_tag(&mut self) -> Result<&'a str, NetSerializeError> {
        let len = self.read_u8()? as usize;
        let remaining = self.remaining();
        if len > remaining {
            return self.fail(NetSerializeError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let bytes: &'a [u8] = &self.bytes[self.position..self.position + len];
        self.position += len;
        match std::str::from_utf8(bytes) {
            Ok(tag) => Ok(tag),
            Err(_) => self.fail(NetSerializeError::InvalidTag),
        }
    }

    /// Decodes one postcard value from the stream.
    pub fn read_payload<T: DeserializeOwned>(&mut self) -> Result<T, NetSerializeError> {
        let rest = &self.bytes[self.position..];
        match postcard::take_from_bytes::<T>(rest) {
            Ok((value, tail)) => {
                self.position = self.bytes.len() - tail.len();
                Ok(value)
            }
            Err(err) => self.fail(NetSerializeError::Payload(err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Polymorphic arrays
// ---------------------------------------------------------------------------

/// Writes `items` as `count + (tag, body)*`.
pub(crate) fn write_payload_array<P>(
    writer: &mut NetWriter,
    items: &[Box<P>],
) -> Result<(), NetSerializeError>
where
    P: NetPayload + ?Sized,
{
    writer.write_count(items.len())?;
    for item in items {
        writer.write_tag(item.type_tag())?;
        item.net_serialize(writer)?;
    }
    Ok(())
}

/// Reads an array written by [`write_payload_array`].
///
/// Entries whose index and concrete type match an element of `existing` are
/// decoded in place; everything else is freshly instantiated from the
/// registry. A descriptor the registry cannot instantiate aborts the read
/// with [`NetSerializeError::ProtocolViolation`] before anything is built.
pub(crate) fn read_payload_array<P>(
    reader: &mut NetReader<'_>,
    registry: &TypeRegistry<P>,
    existing: Vec<Box<P>>,
) -> Result<Vec<Box<P>>, NetSerializeError>
where
    P: NetPayload + ?Sized,
{
    let count = reader.read_u8()? as usize;
    let mut reusable: Vec<Option<Box<P>>> = existing.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(count);

    for index in 0..count {
        let tag = reader.read_tag()?;
        if !registry.is_instantiable(tag) {
            return reader.fail(NetSerializeError::ProtocolViolation {
                tag: tag.to_string(),
                expected_base: registry.base_name(),
            });
        }

        let reused = reusable
            .get_mut(index)
            .and_then(|slot| slot.take_if(|item| item.type_tag() == tag));
        let mut item = match reused {
            Some(item) => item,
            None => match registry.instantiate(tag) {
                Ok(item) => item,
                Err(err) => return reader.fail(err),
            },
        };
        item.net_deserialize(reader)?;
        out.push(item);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_over_u8_is_rejected() {
        let mut writer = NetWriter::new();
        let result = writer.write_count(300);
        assert!(matches!(
            result,
            Err(NetSerializeError::TooManyEntries { count: 300, .. })
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_tag_and_payload_read_back_in_order() {
        let mut writer = NetWriter::new();
        writer.write_tag("LinearVelocity").unwrap();
        writer.write_payload(&(42u32, -1.5f32)).unwrap();
        writer.write_u8(7);

        let bytes = writer.into_bytes();
        let mut reader = NetReader::new(&bytes);
        assert_eq!(reader.read_tag().unwrap(), "LinearVelocity");
        assert_eq!(reader.read_payload::<(u32, f32)>().unwrap(), (42, -1.5));
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
        assert!(!reader.has_error());
    }

    #[test]
    fn test_truncated_tag_sets_error_flag() {
        // Claims a 10-byte tag but only 3 bytes follow.
        let bytes = [10u8, b'a', b'b', b'c'];
        let mut reader = NetReader::new(&bytes);
        let result = reader.read_tag();
        assert!(matches!(
            result,
            Err(NetSerializeError::UnexpectedEnd {
                needed: 10,
                remaining: 3
            })
        ));
        assert!(reader.has_error());
    }

    #[test]
    fn test_non_utf8_tag_is_rejected() {
        let bytes = [2u8, 0xff, 0xfe];
        let mut reader = NetReader::new(&bytes);
        assert!(matches!(
            reader.read_tag(),
            Err(NetSerializeError::InvalidTag)
        ));
        assert!(reader.has_error());
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut reader = NetReader::new(&[]);
        assert!(reader.read_u8().is_err());
        assert!(reader.has_error());
    }
}
