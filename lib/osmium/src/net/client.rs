use crate::net::channel::Channel;
use crate::net::packet::Packet;
use crate::net::poll::Poller;
use crate::net::shared::{Config, DropReason, ErrorKind, NetError, NetResult, StreamStatus};
use crate::net::transport::{ConnectionInfo, Transport};
use flint::logging;
use std::net::SocketAddr;

/// User callback surface for the client driver. Fires from `tick` only.
pub trait ClientEvents {
    fn on_connect(&mut self);
    fn on_receive(&mut self, packet: Packet);
    fn on_disconnect(&mut self, reason: DropReason);
}

const CLIENT_TOKEN: usize = 0;

/// The single-peer driver: one channel, one poller, a tick entry point.
///
/// `connect` starts a non-blocking connect and queues the handshake frame;
/// the first writable readiness signal pushes it out. After the handshake
/// completes (`ClientEvents::on_connect`), `send` queues encrypted packets.
pub struct Client {
    channel: Option<Channel<Transport>>,
    poller: Poller,
    received: Vec<Packet>,
    connected: bool,
    config: Config,
    log: logging::Logger,
}

impl Client {
    pub fn connect<'a, G: Into<Option<&'a logging::Logger>>>(
        addr: SocketAddr,
        config: Config,
        log: G,
    ) -> NetResult<Client> {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::null(),
        };

        let mut transport = Transport::connect(addr)?;
        let mut poller = Poller::new(8)?;
        poller.register(&mut transport, CLIENT_TOKEN)?;

        let mut channel = Channel::client(transport, config, &log);
        channel.initiate_handshake()?;

        logging::debug!(log, "connecting"; "addr" => %addr);

        Ok(Client {
            channel: Some(channel),
            poller,
            received: Vec::new(),
            connected: false,
            config,
            log,
        })
    }

    /// True while the connection has not been torn down.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// True once the handshake has completed.
    #[inline]
    pub fn is_established(&self) -> bool {
        self.channel
            .as_ref()
            .map(Channel::is_established)
            .unwrap_or(false)
    }

    #[inline]
    pub fn peer_info(&self) -> Option<ConnectionInfo> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.link().peer_info())
    }

    #[inline]
    pub fn local_info(&self) -> Option<ConnectionInfo> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.link().local_info())
    }

    /// Encrypts and queues one packet. The bytes go out on subsequent ticks.
    pub fn send(&mut self, packet: Packet) -> NetResult<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(packet),
            None => Err(NetError::Fatal(ErrorKind::Reset)),
        }
    }

    /// One pass: flush pending egress, poll readiness, run the channel,
    /// dispatch callbacks. Safe to call after teardown; it becomes a no-op.
    pub fn tick<E: ClientEvents>(&mut self, events: &mut E) -> NetResult<()> {
        // Flush outside the event path so data queued between writable
        // edges does not stall. Held back until the connect completes:
        // writing into a connect still in progress is a platform error.
        if self.connected {
            let channel = match self.channel.as_mut() {
                Some(channel) => channel,
                None => return Ok(()),
            };

            if channel.has_egress() {
                match channel.flush() {
                    StreamStatus::Open => (),
                    StreamStatus::Closed => return self.teardown(DropReason::Closed, events),
                    StreamStatus::Failed(kind) => {
                        return self.teardown(DropReason::Error(kind), events)
                    }
                }
            }
        }

        if self.channel.is_none() {
            return Ok(());
        }

        self.poller.poll(Some(self.config.poll_timeout))?;

        let mut readable = false;
        let mut writable = false;
        let mut hangup = false;
        let mut error = false;

        for readiness in self.poller.results() {
            if readiness.token == CLIENT_TOKEN {
                readable |= readiness.readable;
                writable |= readiness.writable;
                hangup |= readiness.hangup;
                error |= readiness.error;
            }
        }

        if writable {
            self.connected = true;
        }

        let channel = match self.channel.as_mut() {
            Some(channel) => channel,
            None => return Ok(()),
        };

        self.received.clear();
        let status = channel.tick(readable || hangup || error, writable, &mut self.received);

        if channel.take_established() {
            events.on_connect();
        }

        for packet in self.received.drain(..) {
            events.on_receive(packet);
        }

        match status {
            StreamStatus::Open => {
                if channel.queued_bytes() > self.config.max_queued {
                    return self.teardown(DropReason::Error(ErrorKind::QueueOverflow), events);
                }
                Ok(())
            }
            StreamStatus::Closed => self.teardown(DropReason::Closed, events),
            StreamStatus::Failed(kind) => self.teardown(DropReason::Error(kind), events),
        }
    }

    /// Flushes what it can and closes the connection. No disconnect
    /// callback fires for a locally requested close.
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.begin_drop();

            if self.connected {
                drop(channel.flush());
            }

            drop(self.poller.deregister(channel.link_mut()));
            channel.link_mut().shutdown();

            logging::debug!(self.log, "disconnected");
        }
    }

    fn teardown<E: ClientEvents>(&mut self, reason: DropReason, events: &mut E) -> NetResult<()> {
        if let Some(mut channel) = self.channel.take() {
            drop(self.poller.deregister(channel.link_mut()));
            channel.link_mut().shutdown();

            logging::debug!(self.log, "connection dropped"; "reason" => ?reason);

            events.on_disconnect(reason);
        }

        Ok(())
    }
}
