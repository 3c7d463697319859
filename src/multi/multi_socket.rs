// src/multi/multi_socket.rs
use crate::error::{Result, StripeError};
use crate::reader::ReaderSocket;
use crate::segment::MAX_SEGMENT_SIZE;
use crate::socket::DataSocket;
use crate::types::StripeOptions;
use crate::writer::WriterSocket;
use std::io;
use std::sync::Arc;
use std::time::Instant;

/// One connection-like object over a set of stripes.
///
/// Reads come from the fan-in side and writes go to the fan-out side, both
/// over the same stripes. Addresses are those of the first stripe.
///
/// # Example
///
/// ```no_run
/// use ebstripe_rs::{MultiSocket, StripeOptions};
/// use std::io::Write;
/// use std::net::TcpStream;
///
/// # fn main() -> ebstripe_rs::Result<()> {
/// let options: StripeOptions = "Parallelism=2;BlockSize=65536;".parse()?;
/// let stripes = vec![
///     TcpStream::connect("127.0.0.1:5000")?,
///     TcpStream::connect("127.0.0.1:5001")?,
/// ];
///
/// let mut socket = MultiSocket::with_options(stripes, &options)?;
/// socket.write_all(b"payload")?;
/// socket.close()?;
/// # Ok(())
/// # }
/// ```
pub struct MultiSocket<S: DataSocket> {
    stripes: Vec<Arc<S>>,
    reader: ReaderSocket<S>,
    writer: WriterSocket<S>,
}

impl<S: DataSocket> MultiSocket<S> {
    pub fn new(stripes: Vec<S>, max_chunk_size: usize) -> Result<Self> {
        let stripes: Vec<Arc<S>> = stripes.into_iter().map(Arc::new).collect();
        let writer = WriterSocket::new(stripes.clone(), max_chunk_size)?;
        // The peer may use the same block size, so accept frames that large
        let reader = ReaderSocket::new(stripes.clone())?
            .with_max_segment_size(MAX_SEGMENT_SIZE.max(max_chunk_size as u64));

        Ok(MultiSocket {
            stripes,
            reader,
            writer,
        })
    }

    /// Build from negotiated options; the stripe count must match.
    pub fn with_options(stripes: Vec<S>, options: &StripeOptions) -> Result<Self> {
        options.validate()?;
        if stripes.len() != options.parallelism {
            return Err(StripeError::InvalidConfig(format!(
                "expected {} stripe(s), got {}",
                options.parallelism,
                stripes.len()
            )));
        }
        Self::new(stripes, options.block_size)
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn max_chunk_size(&self) -> usize {
        self.writer.max_chunk_size()
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes_written()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.writer.write(buf)
    }

    /// Send end-of-data on every stripe without closing them.
    pub fn finish_and_wait(&mut self) -> Result<()> {
        self.writer.finish_and_wait()
    }

    /// Finish the outgoing stream and close all stripes. Safe to call twice.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }

    pub fn local_addr(&self) -> io::Result<S::Addr> {
        self.stripes[0].local_addr()
    }

    pub fn remote_addr(&self) -> io::Result<S::Addr> {
        self.stripes[0].remote_addr()
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        for (stripe, socket) in self.stripes.iter().enumerate() {
            socket
                .set_read_deadline(deadline)
                .map_err(|e| StripeError::Io(e).on_stripe(stripe))?;
        }
        self.reader.set_deadline(deadline);
        Ok(())
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        for (stripe, socket) in self.stripes.iter().enumerate() {
            socket
                .set_write_deadline(deadline)
                .map_err(|e| StripeError::Io(e).on_stripe(stripe))?;
        }
        self.writer.set_deadline(deadline);
        Ok(())
    }
}

impl<S: DataSocket> io::Read for MultiSocket<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        MultiSocket::read(self, buf).map_err(io::Error::from)
    }
}

impl<S: DataSocket> io::Write for MultiSocket<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        MultiSocket::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
