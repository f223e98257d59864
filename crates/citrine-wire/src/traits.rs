use crate::error::Result;
use crate::io::{WireReader, WireWriter};

/// Trait for datagram types parsed from a `WireReader`.
pub trait Decode: Sized {
    fn decode(reader: &mut WireReader) -> Result<Self>;
}

/// Trait for datagram types serialized into a `WireWriter`.
///
/// Encoding is infallible: the writer grows as needed and every field of the
/// protocol has a fixed representation.
pub trait Encode {
    fn encode(&self, writer: &mut WireWriter);
}

impl Decode for u32 {
    #[inline]
    fn decode(reader: &mut WireReader) -> Result<Self> {
        reader.read_u32()
    }
}

impl Encode for u32 {
    #[inline]
    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(*self)
    }
}

impl Decode for u8 {
    #[inline]
    fn decode(reader: &mut WireReader) -> Result<Self> {
        reader.read_u8()
    }
}

impl Encode for u8 {
    #[inline]
    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u8(*self)
    }
}
