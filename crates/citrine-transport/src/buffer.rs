use crate::consts::DATA_SIZE;
use bytes::Bytes;

/// The source payload partitioned into fixed-size segments.
///
/// Segments `0..total_segments()` carry the file bytes in order; the
/// end-of-stream sentinel occupies the sequence equal to `total_segments()`.
/// Slicing is zero-copy: every segment shares the source allocation.
#[derive(Debug)]
pub struct SendBuffer {
    segments: Vec<Bytes>,
    total_bytes: usize,
}

impl SendBuffer {
    pub fn new(data: Bytes) -> Self {
        let total_bytes = data.len();
        let mut segments = Vec::with_capacity(total_bytes.div_ceil(DATA_SIZE));
        let mut offset = 0;
        while offset < data.len() {
            let end = usize::min(offset + DATA_SIZE, data.len());
            segments.push(data.slice(offset..end));
            offset = end;
        }
        Self {
            segments,
            total_bytes,
        }
    }

    /// Number of data segments; the EOF sentinel sits at this sequence.
    pub fn total_segments(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn payload(&self, seq: u32) -> Bytes {
        self.segments[seq as usize].clone()
    }

    pub fn payload_len(&self, seq: u32) -> usize {
        self.segments[seq as usize].len()
    }
}
