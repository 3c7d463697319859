// src/socket/mod.rs
mod memory;

pub use memory::{MemoryAddr, MemoryStripe};

use crate::utils::timeout_until;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Instant;

/// The capability set a striped transfer needs from one data connection.
///
/// Methods take `&self` because a stripe is read by one worker and written by
/// another at the same time, the way `&TcpStream` can be.
pub trait DataSocket: Send + Sync + 'static {
    type Addr: Clone + fmt::Debug + Send;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    fn close(&self) -> io::Result<()>;

    /// `None` clears the deadline.
    ///
    /// Implementations backed by OS sockets (`TcpStream`, `UnixStream`) turn
    /// the deadline into a socket timeout measured from the moment it is set.
    /// That timeout bounds each blocking call, not the total time, so a frame
    /// that trickles in across several calls can outlast the deadline. Set it
    /// again before each transfer to keep it tight. `MemoryStripe` deadlines
    /// are absolute.
    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()>;

    fn set_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }

    fn local_addr(&self) -> io::Result<Self::Addr>;

    fn remote_addr(&self) -> io::Result<Self::Addr>;
}

/// Borrowing adapter that exposes a stripe as `std::io::Read + Write`.
pub struct StripeIo<'a, S: ?Sized>(pub &'a S);

impl<S: DataSocket + ?Sized> Read for StripeIo<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DataSocket::read(self.0, buf)
    }
}

impl<S: DataSocket + ?Sized> Write for StripeIo<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DataSocket::write(self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Closing twice must not turn into an error.
fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

impl DataSocket for TcpStream {
    type Addr = SocketAddr;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn close(&self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }

    /// Per-call timeout, computed now
    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_timeout(timeout_until(deadline))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_write_timeout(timeout_until(deadline))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.peer_addr()
    }
}

#[cfg(unix)]
impl DataSocket for std::os::unix::net::UnixStream {
    type Addr = std::os::unix::net::SocketAddr;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn close(&self) -> io::Result<()> {
        ignore_not_connected(self.shutdown(Shutdown::Both))
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_read_timeout(timeout_until(deadline))
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        self.set_write_timeout(timeout_until(deadline))
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        std::os::unix::net::UnixStream::local_addr(self)
    }

    fn remote_addr(&self) -> io::Result<Self::Addr> {
        self.peer_addr()
    }
}
