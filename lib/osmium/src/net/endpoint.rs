use crate::net::channel::Channel;
use crate::net::packet::Packet;
use crate::net::poll::{Poller, Readiness};
use crate::net::shared::{Config, DropReason, ErrorKind, NetError, NetResult, StreamStatus};
use crate::net::table::{PeerId, PeerTable};
use crate::net::transport::{Acceptor, ConnectionInfo, Transport};
use flint::logging;
use std::mem;
use std::net::SocketAddr;

/// User callback surface for the server driver. All callbacks fire from the
/// driver's thread, inside `tick`, at well-defined points: `on_connect` when
/// a peer's handshake completes, `on_receive` per decrypted application
/// packet in arrival order, `on_disconnect` when the peer record is
/// destroyed.
pub trait ServerEvents {
    fn on_connect(&mut self, peer: PeerId);
    fn on_receive(&mut self, peer: PeerId, packet: Packet);
    fn on_disconnect(&mut self, peer: PeerId, reason: DropReason);
}

/// Poller token reserved for the acceptor. Peers register under their id
/// shifted by one so the two spaces never collide.
const ACCEPTOR_TOKEN: usize = 0;

#[inline]
fn peer_token(id: PeerId) -> usize {
    id as usize + 1
}

/// The multi-peer driver: accepts connections, assigns stable identifiers,
/// owns the peer table and runs one fair tick over all of it.
///
/// Single-threaded cooperative: all peer state is reached from `tick`, and
/// the only blocking call inside a tick is the bounded poll.
pub struct Endpoint {
    acceptor: Acceptor,
    poller: Poller,
    peers: PeerTable<Channel<Transport>>,
    pending_drop: Vec<(PeerId, DropReason)>,
    ready: Vec<Readiness>,
    received: Vec<Packet>,
    config: Config,
    log: logging::Logger,
}

impl Endpoint {
    /// Binds the listener and prepares the poller. The listener address may
    /// carry port 0 to let the kernel pick one; see [`local_info`](Self::local_info).
    pub fn bind<'a, G: Into<Option<&'a logging::Logger>>>(
        addr: SocketAddr,
        config: Config,
        log: G,
    ) -> NetResult<Endpoint> {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::null(),
        };

        let mut acceptor = Acceptor::bind(addr)?;
        let mut poller = Poller::new(1024)?;
        poller.register(&mut acceptor, ACCEPTOR_TOKEN)?;

        logging::debug!(log, "endpoint bound"; "addr" => %addr);

        Ok(Endpoint {
            acceptor,
            poller,
            peers: PeerTable::new(),
            pending_drop: Vec::new(),
            ready: Vec::new(),
            received: Vec::new(),
            config,
            log,
        })
    }

    #[inline]
    pub fn local_info(&self) -> Option<ConnectionInfo> {
        self.acceptor.local_info()
    }

    /// Number of live peer records.
    #[inline]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    #[inline]
    pub fn is_established(&self, peer: PeerId) -> bool {
        self.peers
            .get(peer)
            .map(Channel::is_established)
            .unwrap_or(false)
    }

    #[inline]
    pub fn peer_info(&self, peer: PeerId) -> Option<ConnectionInfo> {
        self.peers.get(peer).and_then(|channel| channel.link().peer_info())
    }

    /// Encrypts and queues one packet for the peer. The bytes go out on
    /// subsequent ticks.
    pub fn send(&mut self, peer: PeerId, packet: Packet) -> NetResult<()> {
        match self.peers.get_mut(peer) {
            Some(channel) => channel.send(packet),
            None => Err(NetError::Fatal(ErrorKind::UnknownPeer)),
        }
    }

    /// Queues a disconnect for the peer. Executed at the end of the current
    /// tick, after in-flight I/O for the peer has completed; the peer table
    /// never mutates while the tick loop is iterating it.
    pub fn disconnect(&mut self, peer: PeerId) {
        if let Some(channel) = self.peers.get_mut(peer) {
            channel.begin_drop();
            Self::schedule_drop(&mut self.pending_drop, peer, DropReason::Requested);
        }
    }

    /// One pass: drain the acceptor, flush pending egress, poll readiness,
    /// service every ready peer, then drain the disconnect list.
    pub fn tick<E: ServerEvents>(&mut self, events: &mut E) -> NetResult<()> {
        self.accept_pending()?;
        self.flush_egress();

        self.poller.poll(Some(self.config.poll_timeout))?;

        // Copy out the readiness snapshot so peer servicing can borrow the
        // table freely.
        self.ready.clear();
        let Endpoint { ready, poller, .. } = self;
        ready.extend(poller.results());

        for slot in 0..self.ready.len() {
            let readiness = self.ready[slot];

            if readiness.token == ACCEPTOR_TOKEN {
                self.accept_pending()?;
            } else {
                // Hang-up and error readiness still run the read path: any
                // bytes the kernel delivered before the close are drained
                // and the stream classifies the outcome.
                self.service_peer(
                    (readiness.token - 1) as PeerId,
                    readiness.readable || readiness.hangup || readiness.error,
                    readiness.writable,
                    events,
                );
            }
        }

        self.drain_drops(events);
        Ok(())
    }

    fn service_peer<E: ServerEvents>(
        &mut self,
        id: PeerId,
        readable: bool,
        writable: bool,
        events: &mut E,
    ) {
        let Endpoint {
            peers,
            received,
            pending_drop,
            config,
            ..
        } = self;

        let channel = match peers.get_mut(id) {
            Some(channel) => channel,
            None => return,
        };

        received.clear();
        let status = channel.tick(readable, writable, received);

        if channel.take_established() {
            events.on_connect(id);
        }

        for packet in received.drain(..) {
            events.on_receive(id, packet);
        }

        match status {
            StreamStatus::Open => {
                if channel.queued_bytes() > config.max_queued {
                    Self::schedule_drop(
                        pending_drop,
                        id,
                        DropReason::Error(ErrorKind::QueueOverflow),
                    );
                }
            }
            StreamStatus::Closed => Self::schedule_drop(pending_drop, id, DropReason::Closed),
            StreamStatus::Failed(kind) => {
                Self::schedule_drop(pending_drop, id, DropReason::Error(kind))
            }
        }
    }

    /// Accepts until the backlog is empty, creating a peer record per
    /// connection with the next stable id.
    fn accept_pending(&mut self) -> NetResult<()> {
        while let Some(mut transport) = self.acceptor.accept()? {
            let id = self.peers.next_id();
            self.poller.register(&mut transport, peer_token(id))?;

            let info = transport.peer_info();
            let peer_log = self.log.new(logging::o!("peer" => id));
            let channel = Channel::server(transport, self.config, &peer_log);

            let assigned = self.peers.insert(channel);
            debug_assert_eq!(assigned, id);

            logging::debug!(self.log, "peer accepted";
                            "peer" => id,
                            "remote" => info.map(|info| info.to_string()));
        }

        Ok(())
    }

    /// Pushes queued bytes on every peer that has any. Writable readiness
    /// events alone cannot be relied on for this: they signal edges, and a
    /// peer whose queue filled after the last edge would stall.
    fn flush_egress(&mut self) {
        let Endpoint {
            peers,
            pending_drop,
            ..
        } = self;

        for (id, channel) in peers.iter_mut() {
            if !channel.has_egress() {
                continue;
            }

            match channel.flush() {
                StreamStatus::Open => (),
                StreamStatus::Closed => Self::schedule_drop(pending_drop, id, DropReason::Closed),
                StreamStatus::Failed(kind) => {
                    Self::schedule_drop(pending_drop, id, DropReason::Error(kind))
                }
            }
        }
    }

    fn drain_drops<E: ServerEvents>(&mut self, events: &mut E) {
        if self.pending_drop.is_empty() {
            return;
        }

        let drops = mem::take(&mut self.pending_drop);

        for (id, reason) in drops {
            let mut channel = match self.peers.remove(id) {
                Some(channel) => channel,
                None => continue,
            };

            if reason == DropReason::Requested {
                // Best-effort drain of anything still queued before the
                // socket goes away.
                drop(channel.flush());
            }

            drop(self.poller.deregister(channel.link_mut()));
            channel.link_mut().shutdown();

            logging::debug!(self.log, "peer dropped"; "peer" => id, "reason" => ?reason);

            events.on_disconnect(id, reason);
        }
    }

    fn schedule_drop(pending: &mut Vec<(PeerId, DropReason)>, id: PeerId, reason: DropReason) {
        if !pending.iter().any(|(peer, _)| *peer == id) {
            pending.push((id, reason));
        }
    }
}
