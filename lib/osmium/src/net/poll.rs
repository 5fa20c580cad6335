use crate::net::shared::NetResult;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::time::Duration;

/// Per-source readiness snapshot. `token` is the value the source was
/// registered with.
#[derive(Debug, Copy, Clone)]
pub struct Readiness {
    pub token: usize,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub hangup: bool,
}

/// Batch readiness poller over a set of registered sources. Registration is
/// persistent: sources stay registered until `deregister`, and each `poll`
/// replaces the previous result set.
pub struct Poller {
    poll: Poll,
    events: Events,
    sources: usize,
}

impl Poller {
    pub fn new(capacity: usize) -> NetResult<Poller> {
        Ok(Poller {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
            sources: 0,
        })
    }

    /// Registers a source for both readable and writable interest.
    #[inline]
    pub fn register<S: Source>(&mut self, source: &mut S, token: usize) -> NetResult<()> {
        self.poll
            .registry()
            .register(source, Token(token), Interest::READABLE | Interest::WRITABLE)?;
        self.sources += 1;
        Ok(())
    }

    #[inline]
    pub fn deregister<S: Source>(&mut self, source: &mut S) -> NetResult<()> {
        self.poll.registry().deregister(source)?;
        self.sources = self.sources.saturating_sub(1);
        Ok(())
    }

    /// Waits up to `timeout` for readiness. A poll with nothing registered
    /// returns immediately with no results; a zero timeout is a pure probe.
    pub fn poll(&mut self, timeout: Option<Duration>) -> NetResult<()> {
        if self.sources == 0 {
            self.events.clear();
            return Ok(());
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {
                self.events.clear();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The results of the last `poll`, in event order.
    pub fn results(&self) -> impl Iterator<Item = Readiness> + '_ {
        self.events.iter().map(|event| Readiness {
            token: event.token().0,
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            hangup: event.is_read_closed() || event.is_write_closed(),
        })
    }
}
