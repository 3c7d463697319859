// src/writer/write_worker.rs
use crate::error::{Result, StripeError};
use crate::segment::{Header, Segment};
use crate::socket::{DataSocket, StripeIo};
use crossbeam_channel::{select, Receiver};
use log::{debug, error, trace};
use parking_lot::Mutex;
use std::sync::Arc;

/// First failure reported by any write worker of one dispatch
pub(crate) type FailureSlot = Arc<Mutex<Option<StripeError>>>;

/// Writes segments taken from the shared queue onto one stripe.
///
/// Whichever worker is idle takes the next segment. Once cancelled, the
/// worker sends a single end-of-data header and exits. If the segment sender
/// goes away first, it exits without one.
pub(crate) struct WriteWorker<S: DataSocket> {
    stripe: usize,
    socket: Arc<S>,
    segments: Receiver<Segment>,
    cancel: Receiver<()>,
    failure: FailureSlot,
}

impl<S: DataSocket> WriteWorker<S> {
    pub fn new(
        stripe: usize,
        socket: Arc<S>,
        segments: Receiver<Segment>,
        cancel: Receiver<()>,
        failure: FailureSlot,
    ) -> Self {
        WriteWorker {
            stripe,
            socket,
            segments,
            cancel,
            failure,
        }
    }

    pub fn run(self) {
        debug!("write worker {} started", self.stripe);

        loop {
            select! {
                recv(self.segments) -> segment => match segment {
                    Ok(segment) => {
                        if let Err(err) = self.write_segment(&segment) {
                            error!("Failed to write segment on stripe {}: {}", self.stripe, err);
                            self.fail(err);
                            return;
                        }
                    }
                    // Dispatch abandoned; the stream is not complete
                    Err(_) => {
                        debug!("write worker {} abandoned without end of data", self.stripe);
                        return;
                    }
                },
                recv(self.cancel) -> _ => break,
            }
        }

        match Header::end_of_data().write_to(&mut StripeIo(&*self.socket)) {
            Ok(()) => debug!("write worker {} sent end of data", self.stripe),
            Err(err) => {
                error!("Failed to write end-of-data header on stripe {}: {}", self.stripe, err);
                self.fail(err);
            }
        }
    }

    fn write_segment(&self, segment: &Segment) -> Result<()> {
        trace!(
            "stripe {} sending segment at offset {} ({} bytes)",
            self.stripe,
            segment.offset(),
            segment.len()
        );
        segment.write_to(&mut StripeIo(&*self.socket))
    }

    fn fail(&self, err: StripeError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err.on_stripe(self.stripe));
        }
    }
}
