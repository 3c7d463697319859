// src/segment/header.rs
use crate::error::{StripeError, Result};
use crate::types::BlockFlags;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::io::{self, Read, Write};

/// Extended Block Mode header preceding every segment on a stripe.
///
/// Wire layout (big-endian):
///
/// ```text
/// [ descriptor   (1) ]
/// [ byte count   (8) ]
/// [ offset count (8) ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: BlockFlags,
    pub byte_count: u64,
    pub offset_count: u64,
}

impl Header {
    pub const LEN: usize = 1 + 8 + 8;

    pub fn new(byte_count: u64, offset_count: u64, flags: BlockFlags) -> Self {
        Header {
            flags,
            byte_count,
            offset_count,
        }
    }

    /// The terminal marker a stripe sends once it has no more data.
    pub fn end_of_data() -> Self {
        let mut flags = BlockFlags::empty();
        flags.set_end_of_data(true);
        Header::new(0, 0, flags)
    }

    pub fn is_end_of_data(&self) -> bool {
        self.flags.is_end_of_data()
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0] = self.flags.bits();
        BigEndian::write_u64(&mut buf[1..9], self.byte_count);
        BigEndian::write_u64(&mut buf[9..17], self.offset_count);
        buf
    }

    pub fn decode(buf: &[u8; Self::LEN]) -> Result<Self> {
        let header = Header {
            flags: BlockFlags::new(buf[0]),
            byte_count: BigEndian::read_u64(&buf[1..9]),
            offset_count: BigEndian::read_u64(&buf[9..17]),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_end_of_data() && self.byte_count != 0 {
            return Err(StripeError::MalformedHeader(format!(
                "end-of-data header carries {} payload bytes",
                self.byte_count
            )));
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let header = Header {
            flags: BlockFlags::new(reader.read_u8().map_err(eof_as_truncation)?),
            byte_count: reader.read_u64::<BigEndian>().map_err(eof_as_truncation)?,
            offset_count: reader.read_u64::<BigEndian>().map_err(eof_as_truncation)?,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }
}

pub(crate) fn eof_as_truncation(err: io::Error) -> StripeError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StripeError::UnexpectedEof
    } else {
        StripeError::Io(err)
    }
}
