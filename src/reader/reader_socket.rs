// src/reader/reader_socket.rs
use super::read_worker::ReadWorker;
use crate::error::{Result, StripeError};
use crate::segment::{Segment, SegmentQueue, MAX_SEGMENT_SIZE};
use crate::socket::DataSocket;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Idle,
    Streaming,
    Finished,
    Failed,
}

/// Fan-in side of a striped transfer.
///
/// The first `read` starts one reader thread per stripe plus the segment
/// queue dispatcher. Bytes come out in stream order no matter which stripe
/// delivered them first.
///
/// # Example
///
/// ```no_run
/// use ebstripe_rs::{MemoryStripe, ReaderSocket, WriterSocket};
/// use std::io::Read;
/// use std::sync::Arc;
///
/// let (near, far) = MemoryStripe::pairs(4);
/// let mut writer = WriterSocket::new(near.into_iter().map(Arc::new).collect(), 1024).unwrap();
/// let mut reader = ReaderSocket::new(far.into_iter().map(Arc::new).collect()).unwrap();
///
/// std::thread::spawn(move || {
///     writer.write(b"hello over four stripes").unwrap();
///     writer.close().unwrap();
/// });
///
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).unwrap();
/// ```
pub struct ReaderSocket<S: DataSocket> {
    stripes: Vec<Arc<S>>,
    max_segment_size: u64,
    pop: Option<Receiver<Result<Segment>>>,
    pending: Bytes,
    deadline: Option<Instant>,
    delivered: u64,
    state: ReadState,
}

impl<S: DataSocket> ReaderSocket<S> {
    pub fn new(stripes: Vec<Arc<S>>) -> Result<Self> {
        if stripes.is_empty() {
            return Err(StripeError::InvalidConfig("at least one stripe is required".into()));
        }

        Ok(ReaderSocket {
            stripes,
            max_segment_size: MAX_SEGMENT_SIZE,
            pop: None,
            pending: Bytes::new(),
            deadline: None,
            delivered: 0,
            state: ReadState::Idle,
        })
    }

    /// Limit on the payload size accepted from a single header.
    pub fn with_max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Bytes handed to the caller so far
    pub fn position(&self) -> u64 {
        self.delivered
    }

    /// True once every stripe sent end-of-data and all data was read.
    pub fn is_finished(&self) -> bool {
        self.state == ReadState::Finished && self.pending.is_empty()
    }

    /// Deadline for waiting on the next in-order segment. Stripe deadlines
    /// are set separately, see `MultiSocket::set_read_deadline`.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Read stream bytes in order.
    ///
    /// A segment larger than `buf` is served across several calls. Returns
    /// `Ok(0)` only at the end of the stream, which is reached once every
    /// stripe has delivered its end-of-data marker.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.next_segment()? {
                Some(segment) => self.pending = segment.data,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        self.delivered += n as u64;
        Ok(n)
    }

    fn start(&mut self) -> Result<()> {
        let (push, pop) = SegmentQueue::new(self.stripes.len()).spawn()?;

        for (stripe, socket) in self.stripes.iter().enumerate() {
            let worker = ReadWorker::new(stripe, Arc::clone(socket), self.max_segment_size);
            let push = push.clone();
            thread::Builder::new()
                .name(format!("stripe-read-{}", stripe))
                .spawn(move || worker.run(push))?;
        }

        debug!("dispatched {} read worker(s)", self.stripes.len());
        self.pop = Some(pop);
        self.state = ReadState::Streaming;
        Ok(())
    }

    fn next_segment(&mut self) -> Result<Option<Segment>> {
        match self.state {
            ReadState::Idle => {
                // Workers started before the failure still hold the stripes
                if let Err(err) = self.start() {
                    self.state = ReadState::Failed;
                    return Err(err);
                }
            }
            ReadState::Streaming => {}
            ReadState::Finished => return Ok(None),
            ReadState::Failed => return Err(StripeError::TransferAborted),
        }

        let pop = match &self.pop {
            Some(pop) => pop,
            None => return Ok(None),
        };

        let received = match self.deadline {
            Some(deadline) => match pop.recv_deadline(deadline) {
                Ok(item) => Some(item),
                Err(RecvTimeoutError::Timeout) => return Err(StripeError::Timeout),
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => pop.recv().ok(),
        };

        match received {
            Some(Ok(segment)) => Ok(Some(segment)),
            Some(Err(err)) => {
                self.state = ReadState::Failed;
                self.pop = None;
                Err(err)
            }
            None => {
                debug!("striped stream finished after {} bytes", self.delivered);
                self.state = ReadState::Finished;
                self.pop = None;
                Ok(None)
            }
        }
    }
}

impl<S: DataSocket> io::Read for ReaderSocket<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReaderSocket::read(self, buf).map_err(io::Error::from)
    }
}
