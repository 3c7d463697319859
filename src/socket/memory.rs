// src/socket/memory.rs
use super::DataSocket;
use bytes::Bytes;
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_ADDR: AtomicU64 = AtomicU64::new(1);

/// Address of one end of an in-memory stripe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAddr(pub u64);

impl fmt::Display for MemoryAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem:{}", self.0)
    }
}

/// One end of an in-process, bidirectional byte pipe.
///
/// Each direction is a bounded channel of byte chunks, so a writer blocks once
/// `capacity` chunks are waiting for the peer. Closing an end makes the peer
/// read EOF after draining what was already sent and wakes up local readers.
pub struct MemoryStripe {
    local: MemoryAddr,
    remote: MemoryAddr,
    outgoing: Mutex<Option<Sender<Bytes>>>,
    incoming: Receiver<Bytes>,
    leftover: Mutex<Bytes>,
    closing: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
    read_deadline: Mutex<Option<Instant>>,
    write_deadline: Mutex<Option<Instant>>,
}

impl MemoryStripe {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn pair() -> (MemoryStripe, MemoryStripe) {
        Self::pair_with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn pair_with_capacity(capacity: usize) -> (MemoryStripe, MemoryStripe) {
        let a_addr = MemoryAddr(NEXT_ADDR.fetch_add(1, Ordering::Relaxed));
        let b_addr = MemoryAddr(NEXT_ADDR.fetch_add(1, Ordering::Relaxed));
        let (a_tx, b_rx) = bounded(capacity);
        let (b_tx, a_rx) = bounded(capacity);

        (
            MemoryStripe::end(a_addr, b_addr, a_tx, a_rx),
            MemoryStripe::end(b_addr, a_addr, b_tx, b_rx),
        )
    }

    /// `count` connected pairs, split into the two sides of a striped link.
    pub fn pairs(count: usize) -> (Vec<MemoryStripe>, Vec<MemoryStripe>) {
        (0..count).map(|_| Self::pair()).unzip()
    }

    fn end(local: MemoryAddr, remote: MemoryAddr, outgoing: Sender<Bytes>, incoming: Receiver<Bytes>) -> Self {
        let (closing, closed) = bounded(0);
        MemoryStripe {
            local,
            remote,
            outgoing: Mutex::new(Some(outgoing)),
            incoming,
            leftover: Mutex::new(Bytes::new()),
            closing: Mutex::new(Some(closing)),
            closed,
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
        }
    }

    fn next_chunk(&self) -> io::Result<Option<Bytes>> {
        let deadline = *self.read_deadline.lock();
        let timeout = match deadline {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        };

        select! {
            recv(self.incoming) -> chunk => Ok(chunk.ok()),
            recv(self.closed) -> _ => Ok(None),
            recv(timeout) -> _ => Err(io::Error::new(io::ErrorKind::TimedOut, "read deadline exceeded")),
        }
    }
}

impl DataSocket for MemoryStripe {
    type Addr = MemoryAddr;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut leftover = self.leftover.lock();
        if leftover.is_empty() {
            match self.next_chunk()? {
                Some(chunk) => *leftover = chunk,
                None => return Ok(0),
            }
        }

        let n = buf.len().min(leftover.len());
        buf[..n].copy_from_slice(&leftover.split_to(n));
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let sender = self
            .outgoing
            .lock()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "memory stripe closed"))?;
        let chunk = Bytes::copy_from_slice(buf);
        let deadline = *self.write_deadline.lock();

        let sent = match deadline {
            Some(deadline) => sender.send_deadline(chunk, deadline).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, "write deadline exceeded"),
                SendTimeoutError::Disconnected(_) => io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"),
            }),
            None => sender
                .send(chunk)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed")),
        };
        sent.map(|_| buf.len())
    }

    fn close(&self) -> io::Result<()> {
        self.outgoing.lock().take();
        self.closing.lock().take();
        Ok(())
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        *self.read_deadline.lock() = deadline;
        Ok(())
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        *self.write_deadline.lock() = deadline;
        Ok(())
    }

    fn local_addr(&self) -> io::Result<MemoryAddr> {
        Ok(self.local)
    }

    fn remote_addr(&self) -> io::Result<MemoryAddr> {
        Ok(self.remote)
    }
}

impl fmt::Debug for MemoryStripe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStripe")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}
