// src/segment/queue.rs
use super::Segment;
use crate::error::{StripeError, Result};
use crossbeam_channel::{bounded, Receiver, RecvError, Select, Sender};
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::thread;

/// Heap entry ordered so that the lowest offset sits on top.
#[derive(Debug)]
struct Pending(Segment);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.0.offset() == other.0.offset()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.offset().cmp(&self.0.offset())
    }
}

/// Reorders segments arriving from several stripes back into stream order.
///
/// The queue itself is plain single-owner state. [`SegmentQueue::spawn`] moves
/// it onto a dedicated dispatcher thread that talks to the stripe readers and
/// the consumer exclusively through channels.
#[derive(Debug)]
pub struct SegmentQueue {
    heap: BinaryHeap<Pending>,
    expected_offset: u64,
    open_stripes: usize,
    stripes: usize,
}

impl SegmentQueue {
    pub fn new(stripes: usize) -> Self {
        SegmentQueue {
            heap: BinaryHeap::new(),
            expected_offset: 0,
            open_stripes: stripes,
            stripes,
        }
    }

    /// Offset of the next byte to hand to the consumer
    pub fn expected_offset(&self) -> u64 {
        self.expected_offset
    }

    /// Stripes that have not delivered their end-of-data marker yet
    pub fn open_stripes(&self) -> usize {
        self.open_stripes
    }

    /// Segments buffered while waiting for a gap to fill
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn is_finished(&self) -> bool {
        self.open_stripes == 0 && self.heap.is_empty()
    }

    /// Take in one segment read from a stripe.
    pub fn accept(&mut self, segment: Segment) -> Result<()> {
        if segment.is_end_of_data() {
            if self.open_stripes == 0 {
                return Err(StripeError::UnexpectedEndOfData { stripes: self.stripes });
            }
            self.open_stripes -= 1;
            trace!("end-of-data received, {} stripe(s) still open", self.open_stripes);
            return Ok(());
        }

        // Carries nothing, and would tie with the real segment at its offset
        if segment.is_empty() {
            return Ok(());
        }

        if segment.offset() < self.expected_offset {
            return Err(StripeError::OffsetRegression {
                offset: segment.offset(),
                expected: self.expected_offset,
            });
        }

        trace!("queued segment at offset {} ({} bytes)", segment.offset(), segment.len());
        self.heap.push(Pending(segment));
        Ok(())
    }

    /// Remove the next in-order segment, if it has arrived.
    pub fn pop_ready(&mut self) -> Result<Option<Segment>> {
        let ready = self.take_ready()?;
        if let Some(segment) = &ready {
            self.expected_offset += segment.len() as u64;
        }
        Ok(ready)
    }

    // Does not advance `expected_offset`; the caller commits once the
    // segment was actually handed over.
    fn take_ready(&mut self) -> Result<Option<Segment>> {
        let head_offset = match self.heap.peek() {
            Some(head) => head.0.offset(),
            None => return Ok(None),
        };

        match head_offset.cmp(&self.expected_offset) {
            Ordering::Greater => Ok(None),
            Ordering::Equal => Ok(self.heap.pop().map(|pending| pending.0)),
            Ordering::Less => Err(StripeError::OffsetRegression {
                offset: head_offset,
                expected: self.expected_offset,
            }),
        }
    }

    fn requeue(&mut self, segment: Segment) {
        self.heap.push(Pending(segment));
    }

    /// Start the dispatcher thread.
    ///
    /// Returns the push side for stripe readers and the pop side for the
    /// consumer. Both are rendezvous channels. The pop side yields segments in
    /// stream order and disconnects once every stripe has sent end-of-data and
    /// the heap is drained. A failure is delivered as a single `Err` before
    /// the disconnect.
    pub fn spawn(self) -> io::Result<(Sender<Result<Segment>>, Receiver<Result<Segment>>)> {
        let (push_tx, push_rx) = bounded(0);
        let (pop_tx, pop_rx) = bounded(0);

        thread::Builder::new()
            .name("stripe-queue".into())
            .spawn(move || self.dispatch(push_rx, pop_tx))?;

        Ok((push_tx, pop_rx))
    }

    fn dispatch(mut self, push: Receiver<Result<Segment>>, pop: Sender<Result<Segment>>) {
        debug!("segment queue started for {} stripe(s)", self.stripes);

        match self.drive(&push, &pop) {
            Ok(()) => debug!("segment queue drained at offset {}", self.expected_offset),
            Err(err) => {
                debug!("segment queue aborting: {}", err);
                let _ = pop.send(Err(err));
            }
        }
    }

    fn drive(&mut self, push: &Receiver<Result<Segment>>, pop: &Sender<Result<Segment>>) -> Result<()> {
        while !self.is_finished() {
            let segment = match self.take_ready()? {
                Some(segment) => segment,
                None => {
                    self.arrive(push.recv())?;
                    continue;
                }
            };

            // Hand the head to the consumer, but keep taking new arrivals
            // while the consumer is busy.
            let mut sel = Select::new();
            let pop_op = sel.send(pop);
            sel.recv(push);
            let oper = sel.select();

            if oper.index() == pop_op {
                let len = segment.len() as u64;
                if oper.send(pop, Ok(segment)).is_err() {
                    debug!("segment queue consumer went away");
                    return Ok(());
                }
                self.expected_offset += len;
            } else {
                let arrival = oper.recv(push);
                self.requeue(segment);
                self.arrive(arrival)?;
            }
        }
        Ok(())
    }

    fn arrive(&mut self, arrival: std::result::Result<Result<Segment>, RecvError>) -> Result<()> {
        match arrival {
            Ok(Ok(segment)) => self.accept(segment),
            Ok(Err(err)) => Err(err),
            Err(RecvError) if self.open_stripes == 0 => Err(StripeError::MissingSegment {
                expected: self.expected_offset,
            }),
            Err(RecvError) => Err(StripeError::StripesExhausted { open: self.open_stripes }),
        }
    }
}
