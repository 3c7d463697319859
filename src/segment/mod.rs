// src/segment/mod.rs
mod header;
mod queue;

pub use header::Header;
pub use queue::SegmentQueue;

use crate::error::{StripeError, Result};
use crate::types::BlockFlags;
use bytes::Bytes;
use header::eof_as_truncation;
use std::io::{Read, Write};

/// Largest payload accepted from the wire (64MB); checked before allocating
pub const MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// One offset-tagged chunk of the logical stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub data: Bytes,
}

impl Segment {
    pub fn new(data: Bytes, offset: u64) -> Self {
        Segment {
            header: Header::new(data.len() as u64, offset, BlockFlags::empty()),
            data,
        }
    }

    pub fn end_of_data() -> Self {
        Segment {
            header: Header::end_of_data(),
            data: Bytes::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.header.offset_count
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_end_of_data(&self) -> bool {
        self.header.is_end_of_data()
    }

    /// Read one framed segment, rejecting payloads above `max_len`.
    pub fn read_from<R: Read>(reader: &mut R, max_len: u64) -> Result<Self> {
        let header = Header::read_from(reader)?;
        if header.byte_count > max_len {
            return Err(StripeError::SegmentTooLarge {
                byte_count: header.byte_count,
                max: max_len,
            });
        }

        let mut data = vec![0u8; header.byte_count as usize];
        reader.read_exact(&mut data).map_err(eof_as_truncation)?;

        Ok(Segment {
            header,
            data: Bytes::from(data),
        })
    }

    /// Write header and payload back to back.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        debug_assert_eq!(self.header.byte_count, self.data.len() as u64);
        self.header.write_to(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}
