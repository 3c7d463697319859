// src/writer/writer_socket.rs
use super::write_worker::{FailureSlot, WriteWorker};
use crate::error::{Result, StripeError};
use crate::segment::Segment;
use crate::socket::DataSocket;
use bytes::Bytes;
use crossbeam_channel::{bounded, SendTimeoutError, Sender};
use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Workers of one dispatch round, from the first `write` to `finish_and_wait`
struct Dispatch {
    segments: Sender<Segment>,
    cancel: Sender<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Fan-out side of a striped transfer.
///
/// `write` cuts the input into segments of at most `max_chunk_size` bytes,
/// tags each with its stream offset and hands it to whichever stripe worker
/// is free. The stream ends with `finish_and_wait` (or `close`), which makes
/// every worker send its end-of-data marker.
///
/// `write` and `finish_and_wait` take `&mut self`, so they can never overlap.
pub struct WriterSocket<S: DataSocket> {
    stripes: Vec<Arc<S>>,
    max_chunk_size: usize,
    written: u64,
    dispatch: Option<Dispatch>,
    failure: FailureSlot,
    aborted: bool,
    ended: bool,
    deadline: Option<Instant>,
    closed: Option<Option<io::ErrorKind>>,
}

impl<S: DataSocket> WriterSocket<S> {
    pub fn new(stripes: Vec<Arc<S>>, max_chunk_size: usize) -> Result<Self> {
        if stripes.is_empty() {
            return Err(StripeError::InvalidConfig("at least one stripe is required".into()));
        }
        if max_chunk_size < 1 {
            return Err(StripeError::InvalidConfig("max chunk size must be at least 1".into()));
        }

        Ok(WriterSocket {
            stripes,
            max_chunk_size,
            written: 0,
            dispatch: None,
            failure: Arc::new(Mutex::new(None)),
            aborted: false,
            ended: false,
            deadline: None,
            closed: None,
        })
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Stream offset of the next byte to be written
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Deadline for handing a segment to a free worker.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Split `buf` into segments and dispatch them in order.
    ///
    /// Returns once every segment has been taken by a worker; the bytes may
    /// still be in flight. A stripe failure seen so far is returned here
    /// instead of being silently dropped.
    ///
    /// If the deadline passes or a stripe fails after some segments were
    /// taken, the count of those bytes is returned and the error shows up on
    /// the next call.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed.is_some() {
            return Err(StripeError::Closed);
        }
        self.check_failure()?;
        if buf.is_empty() {
            return Ok(0);
        }

        if self.dispatch.is_none() {
            self.dispatch = Some(self.dispatch_workers()?);
            self.ended = false;
        }

        let mut dispatched = 0;
        for chunk in buf.chunks(self.max_chunk_size) {
            let segment = Segment::new(Bytes::copy_from_slice(chunk), self.written);
            if let Err(err) = self.hand_off(segment) {
                if dispatched == 0 {
                    self.check_failure()?;
                    return Err(err);
                }
                debug!("short write of {} bytes: {}", dispatched, err);
                return Ok(dispatched);
            }
            self.written += chunk.len() as u64;
            dispatched += chunk.len();
        }

        Ok(dispatched)
    }

    fn hand_off(&mut self, segment: Segment) -> Result<()> {
        let segments = match &self.dispatch {
            Some(dispatch) => &dispatch.segments,
            None => return Err(StripeError::TransferAborted),
        };

        let sent = match self.deadline {
            Some(deadline) => segments.send_deadline(segment, deadline).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => Some(StripeError::Timeout),
                SendTimeoutError::Disconnected(_) => None,
            }),
            None => segments.send(segment).map_err(|_| None),
        };

        match sent {
            Ok(()) => Ok(()),
            Err(Some(err)) => Err(err),
            // Every worker has exited, which only happens after a failure.
            // A stored failure is left for `check_failure` to report.
            Err(None) => {
                if self.failure.lock().is_none() {
                    self.aborted = true;
                }
                Err(StripeError::TransferAborted)
            }
        }
    }

    fn check_failure(&mut self) -> Result<()> {
        if self.aborted {
            return Err(StripeError::TransferAborted);
        }
        if let Some(err) = self.failure.lock().take() {
            self.aborted = true;
            return Err(err);
        }
        Ok(())
    }

    fn dispatch_workers(&self) -> Result<Dispatch> {
        let (segments_tx, segments_rx) = bounded(0);
        let (cancel_tx, cancel_rx) = bounded(0);
        let mut workers = Vec::with_capacity(self.stripes.len());

        for (stripe, socket) in self.stripes.iter().enumerate() {
            let worker = WriteWorker::new(
                stripe,
                Arc::clone(socket),
                segments_rx.clone(),
                cancel_rx.clone(),
                Arc::clone(&self.failure),
            );
            let spawned = thread::Builder::new()
                .name(format!("stripe-write-{}", stripe))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Started workers exit without end-of-data
                    drop(segments_tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }

        debug!("dispatched {} write worker(s)", workers.len());
        Ok(Dispatch {
            segments: segments_tx,
            cancel: cancel_tx,
            workers,
        })
    }

    /// End the stream: every worker sends end-of-data, then this waits for
    /// all of them to exit.
    ///
    /// An empty stream still gets its end-of-data markers. Calling this again
    /// without writing in between does nothing. Returns the first stripe
    /// failure of this round, if any.
    pub fn finish_and_wait(&mut self) -> Result<()> {
        let Dispatch {
            segments,
            cancel,
            workers,
        } = match self.dispatch.take() {
            Some(dispatch) => dispatch,
            None if self.ended => return self.check_failure(),
            None => {
                self.check_failure()?;
                self.dispatch_workers()?
            }
        };
        self.ended = true;

        // Segments stay open until the workers are gone
        drop(cancel);
        let mut panicked = false;
        for handle in workers {
            panicked |= handle.join().is_err();
        }
        drop(segments);
        debug!("all write workers finished at offset {}", self.written);

        self.check_failure()?;
        if panicked {
            return Err(StripeError::WorkerPanicked);
        }
        Ok(())
    }

    /// Finish the stream and close every stripe.
    ///
    /// Only a stream with data still in flight is finished here, so closing a
    /// socket that never wrote sends nothing. Senders of an empty stream call
    /// `finish_and_wait` first. All stripes are closed even if one fails; the
    /// first error wins. Calling `close` again returns the outcome of the
    /// first call.
    pub fn close(&mut self) -> Result<()> {
        if let Some(outcome) = self.closed {
            return match outcome {
                None => Ok(()),
                Some(kind) => Err(StripeError::Io(io::Error::from(kind))),
            };
        }

        let mut result = if self.dispatch.is_some() {
            self.finish_and_wait()
        } else {
            self.check_failure()
        };

        for (stripe, socket) in self.stripes.iter().enumerate() {
            if let Err(err) = socket.close() {
                warn!("Failed to close stripe {}: {}", stripe, err);
                if result.is_ok() {
                    result = Err(StripeError::Io(err).on_stripe(stripe));
                }
            }
        }

        self.closed = Some(result.as_ref().err().map(StripeError::kind));
        result
    }
}

impl<S: DataSocket> io::Write for WriterSocket<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriterSocket::write(self, buf).map_err(io::Error::from)
    }

    /// Segments are unbuffered; this does not end the stream.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
