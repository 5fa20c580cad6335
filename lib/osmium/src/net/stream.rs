use crate::net::buffer::OutBuffer;
use crate::net::shared::{ErrorKind, StreamStatus};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::io;
use std::io::{IoSlice, Read, Write};

/// Size of a single kernel read.
const READ_CHUNK: usize = 16 * 1024;

/// Upper bound on the number of buffers handed to one vectored write. A
/// deeper queue is drained across successive writable signals.
const MAX_SEGMENTS: usize = 32;

/// The per-connection byte pipe: an ordered inbound buffer appended to on
/// read and a FIFO of outbound buffers drained on write. Only the head of
/// the FIFO may have a nonzero head offset.
pub struct StreamEngine {
    inbound: BytesMut,
    outbound: VecDeque<OutBuffer>,
    queued: usize,
    ingress_budget: usize,
}

impl StreamEngine {
    #[inline]
    pub fn new(ingress_budget: usize) -> StreamEngine {
        StreamEngine {
            inbound: BytesMut::new(),
            outbound: VecDeque::new(),
            queued: 0,
            ingress_budget,
        }
    }

    /// Appends a buffer to the tail of the outbound FIFO. Never blocks,
    /// never fails; transmission happens on subsequent ticks.
    #[inline]
    pub fn enqueue(&mut self, buffer: OutBuffer) {
        self.queued += buffer.len();
        self.outbound.push_back(buffer);
    }

    /// Bytes waiting in the outbound FIFO. The driver enforces its
    /// backpressure cap against this.
    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.queued
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// The inbound byte buffer, in kernel delivery order. Frames are
    /// extracted from its head by the codec.
    #[inline]
    pub fn inbound(&mut self) -> &mut BytesMut {
        &mut self.inbound
    }

    /// Drops all buffered state. Used on teardown.
    #[inline]
    pub fn clear(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.queued = 0;
    }

    /// Moves bytes between the link and the buffers according to the
    /// readiness flags: ingress first, then one vectored egress.
    pub fn tick<L: Read + Write>(
        &mut self,
        link: &mut L,
        readable: bool,
        writable: bool,
    ) -> StreamStatus {
        if readable {
            match self.ingress(link) {
                StreamStatus::Open => (),
                other => return other,
            }
        }

        if writable {
            match self.egress(link) {
                StreamStatus::Open => (),
                other => return other,
            }
        }

        StreamStatus::Open
    }

    /// Drains the kernel receive queue in fixed-size reads until it would
    /// block or the per-tick budget is reached. A zero-byte read with no
    /// error means the peer closed its write half.
    fn ingress<L: Read>(&mut self, link: &mut L) -> StreamStatus {
        let mut chunk = [0u8; READ_CHUNK];
        let mut taken = 0usize;

        loop {
            match link.read(&mut chunk) {
                Ok(0) => return StreamStatus::Closed,
                Ok(count) => {
                    self.inbound.extend_from_slice(&chunk[..count]);
                    taken += count;

                    if taken >= self.ingress_budget {
                        return StreamStatus::Open;
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return StreamStatus::Open
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return StreamStatus::Failed(ErrorKind::from_io(err.kind())),
            }
        }
    }

    /// One vectored write of the head buffer at its current offset followed
    /// by every subsequent buffer in full. The accepted byte count advances
    /// the head offset and pops fully-consumed buffers left to right.
    fn egress<L: Write>(&mut self, link: &mut L) -> StreamStatus {
        if self.outbound.is_empty() {
            return StreamStatus::Open;
        }

        let mut segments: Vec<IoSlice> = Vec::with_capacity(self.outbound.len().min(MAX_SEGMENTS));
        for buffer in self.outbound.iter().take(MAX_SEGMENTS) {
            segments.push(IoSlice::new(buffer.unsent()));
        }

        let sent = loop {
            match link.write_vectored(&segments) {
                Ok(0) => return StreamStatus::Closed,
                Ok(count) => break count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return StreamStatus::Open
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return StreamStatus::Failed(ErrorKind::from_io(err.kind())),
            }
        };

        drop(segments);
        self.consume(sent);

        StreamStatus::Open
    }

    fn consume(&mut self, mut count: usize) {
        self.queued -= count.min(self.queued);

        while count > 0 {
            let head = match self.outbound.front_mut() {
                Some(head) => head,
                None => {
                    debug_assert!(false, "kernel accepted more than was queued");
                    return;
                }
            };

            count = head.consume(count);

            if head.is_empty() {
                self.outbound.pop_front();
            } else {
                // A partially consumed buffer stays at the head; everything
                // behind it is untouched.
                debug_assert_eq!(count, 0);
                break;
            }
        }
    }
}
