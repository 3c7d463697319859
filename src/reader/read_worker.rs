// src/reader/read_worker.rs
use crate::error::{Result, StripeError};
use crate::segment::Segment;
use crate::socket::{DataSocket, StripeIo};
use crossbeam_channel::Sender;
use log::{debug, error, trace};
use std::sync::Arc;

/// Reads framed segments off one stripe and pushes them to the segment queue.
///
/// Runs until it has forwarded the stripe's end-of-data marker. On a framing
/// or connection error it pushes the error, which aborts the whole read side,
/// and stops.
pub(crate) struct ReadWorker<S: DataSocket> {
    stripe: usize,
    socket: Arc<S>,
    max_segment_size: u64,
}

impl<S: DataSocket> ReadWorker<S> {
    pub fn new(stripe: usize, socket: Arc<S>, max_segment_size: u64) -> Self {
        ReadWorker {
            stripe,
            socket,
            max_segment_size,
        }
    }

    pub fn run(self, push: Sender<Result<Segment>>) {
        debug!("read worker {} started", self.stripe);

        loop {
            match self.next_segment() {
                Ok(segment) => {
                    let end_of_data = segment.is_end_of_data();
                    trace!(
                        "stripe {} received segment at offset {} ({} bytes)",
                        self.stripe,
                        segment.offset(),
                        segment.len()
                    );

                    if push.send(Ok(segment)).is_err() {
                        debug!("read worker {}: segment queue gone", self.stripe);
                        return;
                    }
                    if end_of_data {
                        debug!("read worker {} reached end of data", self.stripe);
                        return;
                    }
                }
                Err(err) => {
                    error!("Failed to receive segment on stripe {}: {}", self.stripe, err);
                    let _ = push.send(Err(err.on_stripe(self.stripe)));
                    return;
                }
            }
        }
    }

    fn next_segment(&self) -> Result<Segment> {
        Segment::read_from(&mut StripeIo(&*self.socket), self.max_segment_size).map_err(|err| match err {
            StripeError::Io(e) if e.kind() == std::io::ErrorKind::WouldBlock => StripeError::Timeout,
            StripeError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => StripeError::Timeout,
            other => other,
        })
    }
}
