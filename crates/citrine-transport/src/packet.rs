//! Datagram types shared by both sides of a transfer.
//!
//! Every datagram opens with a 20-byte header: a 4-byte big-endian word
//! followed by a 16-byte reserved area. Data segments carry their sequence
//! number in the leading word and zeros in the reserved area; ACK datagrams
//! carry the cumulative ACK in the leading word and up to two selective
//! ranges as `[s1, e1, s2, e2]` in the reserved area, a zero pair marking an
//! unused slot.

use crate::consts::{EOF_MARKER, HEADER_SIZE, READY_MARKER};
use bytes::Bytes;
use citrine_wire::error::Result as WireResult;
use citrine_wire::{Decode, Encode, WireReader, WireWriter};
use log::warn;

/// Number of SACK ranges an ACK datagram can carry.
pub const MAX_SACK_RANGES: usize = 2;

const RESERVED_SIZE: usize = HEADER_SIZE - 4;

/// Parses one whole datagram. Anything shorter than the fixed header fails
/// and is dropped by the caller.
pub fn parse<T: Decode>(datagram: Bytes) -> WireResult<T> {
    let mut reader = WireReader::new(datagram);
    T::decode(&mut reader)
}

/// Inclusive range of received segment sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackRange {
    pub start: u32,
    pub end: u32,
}

impl SackRange {
    pub fn contains(&self, seq: u32) -> bool {
        self.start <= seq && seq <= self.end
    }
}

/// A data segment on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub seq: u32,
    pub payload: Bytes,
}

impl DataPacket {
    pub fn new(seq: u32, payload: Bytes) -> Self {
        Self { seq, payload }
    }

    /// End-of-stream sentinel at the given sequence.
    pub fn eof(seq: u32) -> Self {
        Self::new(seq, Bytes::from_static(EOF_MARKER))
    }

    /// Ready datagram answering a transfer request.
    pub fn ready() -> Self {
        Self::new(0, Bytes::from_static(READY_MARKER))
    }

    pub fn is_eof(&self) -> bool {
        self.payload.as_ref() == EOF_MARKER
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut writer = WireWriter::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode(&mut writer);
        writer.freeze()
    }
}

impl Encode for DataPacket {
    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(self.seq);
        writer.write_zeros(RESERVED_SIZE);
        writer.write_bytes(&self.payload);
    }
}

impl Decode for DataPacket {
    fn decode(reader: &mut WireReader) -> WireResult<Self> {
        let seq = reader.read_u32()?;
        reader.skip(RESERVED_SIZE)?;
        let payload = reader.read_rest();
        Ok(Self { seq, payload })
    }
}

/// Cumulative acknowledgement plus up to two selective ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPacket {
    /// Next sequence number expected by the receiver; everything strictly
    /// below it has been delivered.
    pub cum_ack: u32,
    pub sacks: Vec<SackRange>,
}

impl AckPacket {
    pub fn new(cum_ack: u32, sacks: Vec<SackRange>) -> Self {
        debug_assert!(sacks.len() <= MAX_SACK_RANGES);
        Self { cum_ack, sacks }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut writer = WireWriter::with_capacity(HEADER_SIZE);
        self.encode(&mut writer);
        writer.freeze()
    }
}

impl Encode for AckPacket {
    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(self.cum_ack);
        for range in self.sacks.iter().take(MAX_SACK_RANGES) {
            writer.write_u32(range.start);
            writer.write_u32(range.end);
        }
        for _ in self.sacks.len()..MAX_SACK_RANGES {
            writer.write_u32(0);
            writer.write_u32(0);
        }
    }
}

impl Decode for AckPacket {
    fn decode(reader: &mut WireReader) -> WireResult<Self> {
        let cum_ack = reader.read_u32()?;
        let mut sacks = Vec::new();
        for _ in 0..MAX_SACK_RANGES {
            let start = reader.read_u32()?;
            let end = reader.read_u32()?;
            if start == 0 && end == 0 {
                continue;
            }
            if end < start {
                warn!("ignoring inverted SACK range [{start}, {end}]");
                continue;
            }
            sacks.push(SackRange { start, end });
        }
        Ok(Self { cum_ack, sacks })
    }
}
