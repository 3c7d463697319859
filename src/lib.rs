// src/lib.rs
//! # ebstripe-rs
//!
//! Striped data transfer over several parallel connections, using the framing of
//! GridFTP Extended Block Mode (`MODE E`).
//!
//! One logical byte stream is cut into offset-tagged segments and spread over
//! N already-opened connections ("stripes"). The receiving side reassembles the
//! segments in offset order, whatever order the stripes deliver them in.
//!
//! ## Features
//!
//! - **Work stealing fan-out**: an idle stripe takes the next segment, so a slow
//!   connection never holds back the others
//! - **Ordered fan-in**: a single dispatcher thread reorders segments by offset
//! - **Fail fast**: a broken stripe aborts the transfer instead of stalling it
//! - **Transport agnostic**: anything implementing [`DataSocket`] can be a stripe
//!   (TCP and Unix streams are supported out of the box, plus an in-memory pipe)
//! - **Async facade**: [`AsyncMultiSocket`] for Tokio applications (`async` feature)
//!
//! ## Wire format
//!
//! Every stripe carries a sequence of frames:
//!
//! ```text
//! [flags: u8][byte count: u64 BE][offset: u64 BE][payload: byte count bytes]
//! ```
//!
//! Each stripe ends with one end-of-data frame (flag `0x08`, count and offset 0).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ebstripe_rs::*;
//! use std::io::{Read, Write};
//!
//! fn main() -> Result<()> {
//!     let (near, far) = MemoryStripe::pairs(4);
//!     let mut sender = MultiSocket::new(near, 64 * 1024)?;
//!     let mut receiver = MultiSocket::new(far, 64 * 1024)?;
//!
//!     let writer = std::thread::spawn(move || -> Result<()> {
//!         sender.write_all(&vec![7u8; 1 << 20])?;
//!         sender.close()
//!     });
//!
//!     let mut data = Vec::new();
//!     receiver.read_to_end(&mut data)?;
//!     writer.join().expect("writer thread")?;
//!     assert_eq!(data.len(), 1 << 20);
//!     Ok(())
//! }
//! ```
//!
//! ### Async
//!
//! ```rust,no_run
//! # #[cfg(feature = "async")]
//! use ebstripe_rs::*;
//!
//! # #[cfg(feature = "async")]
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (near, _far) = MemoryStripe::pairs(2);
//!     let socket = AsyncMultiSocket::new(MultiSocket::new(near, 4096)?);
//!
//!     socket.write(&b"hello"[..]).await?;
//!     socket.close().await?;
//!     Ok(())
//! }
//! ```

// Modules
pub mod error;
pub mod types;
pub mod segment;
pub mod socket;
pub mod reader;
pub mod writer;
pub mod multi;

mod utils;

// Re-export commonly used types at the crate root for convenience
pub use error::{StripeError, Result};

pub use types::{BlockFlags, StripeOptions};

pub use segment::{Header, Segment, SegmentQueue, MAX_SEGMENT_SIZE};

pub use socket::{DataSocket, MemoryAddr, MemoryStripe, StripeIo};

pub use reader::ReaderSocket;
pub use writer::WriterSocket;
pub use multi::MultiSocket;

#[cfg(feature = "async")]
pub use multi::AsyncMultiSocket;

// Prelude module for glob imports
pub mod prelude {
    //! Convenient imports for common use cases.
    //!
    //! ```rust
    //! use ebstripe_rs::prelude::*;
    //! ```

    pub use crate::error::{StripeError, Result};
    pub use crate::types::StripeOptions;
    pub use crate::socket::DataSocket;
    pub use crate::multi::MultiSocket;

    #[cfg(feature = "async")]
    pub use crate::multi::AsyncMultiSocket;
}

/// Transfer mode letter announced on the control channel (`MODE E`)
pub const TRANSFER_MODE: char = 'E';

/// The library version
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
