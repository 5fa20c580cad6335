use crate::net::buffer::OutBuffer;
use crate::net::packet::{deframe, Packet, FRAME_HEADER_SIZE};
use crate::net::session::Session;
use crate::net::shared::{Config, ErrorKind, NetError, NetResult, StreamStatus};
use crate::net::stream::StreamEngine;
use flint::crypto::MAC_SIZE;
use flint::logging;
use std::io::{Read, Write};
use std::mem;

/// Frame type tags, the first byte of every frame payload.
pub const TAG_HANDSHAKE: u8 = 0x00;
pub const TAG_USER: u8 = 0x01;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    /// Created, no handshake traffic yet.
    Fresh,
    /// Our side of the handshake is determined; waiting for the peer's
    /// public point.
    AwaitingPeerPublic,
    /// Shared secret derived on both sides, application traffic flows.
    Established,
    /// Scheduled for teardown; outbound drains, inbound is ignored.
    Dropping,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

/// Binds one link, one stream engine and one crypto session into the
/// per-peer state machine. All traffic on the channel past the handshake is
/// encrypted.
///
/// The link is anything byte-stream shaped; the drivers instantiate it with
/// a [`Transport`](crate::net::transport::Transport).
pub struct Channel<L> {
    link: L,
    stream: StreamEngine,
    session: Session,
    state: ChannelState,
    role: Role,
    config: Config,
    just_established: bool,
    log: logging::Logger,
}

impl<L: Read + Write> Channel<L> {
    /// A client-side channel. Call [`initiate_handshake`](Self::initiate_handshake)
    /// to queue the opening frame.
    pub fn client<'a, G: Into<Option<&'a logging::Logger>>>(
        link: L,
        config: Config,
        log: G,
    ) -> Channel<L> {
        Self::new(link, config, Role::Client, ChannelState::Fresh, log)
    }

    /// A server-side channel for an accepted connection, immediately
    /// expecting the client's public point.
    pub fn server<'a, G: Into<Option<&'a logging::Logger>>>(
        link: L,
        config: Config,
        log: G,
    ) -> Channel<L> {
        Self::new(
            link,
            config,
            Role::Server,
            ChannelState::AwaitingPeerPublic,
            log,
        )
    }

    fn new<'a, G: Into<Option<&'a logging::Logger>>>(
        link: L,
        config: Config,
        role: Role,
        state: ChannelState,
        log: G,
    ) -> Channel<L> {
        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::null(),
        };

        Channel {
            link,
            stream: StreamEngine::new(config.ingress_budget),
            session: Session::new(),
            state,
            role,
            config,
            just_established: false,
            log: channel_log,
        }
    }

    #[inline]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    #[inline]
    pub fn is_established(&self) -> bool {
        self.state == ChannelState::Established
    }

    #[inline]
    pub fn link(&self) -> &L {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// True once per handshake completion; the driver turns it into the
    /// connect callback.
    #[inline]
    pub fn take_established(&mut self) -> bool {
        mem::replace(&mut self.just_established, false)
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        self.stream.has_egress()
    }

    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.stream.queued_bytes()
    }

    /// Marks the channel for teardown. Frames still queued drain on
    /// subsequent flushes; incoming data is no longer dispatched.
    #[inline]
    pub fn begin_drop(&mut self) {
        self.state = ChannelState::Dropping;
    }

    /// Queues the opening handshake frame carrying the local public point.
    /// Client side only, exactly once.
    pub fn initiate_handshake(&mut self) -> NetResult<()> {
        if self.role != Role::Client || self.state != ChannelState::Fresh {
            return Err(NetError::Fatal(ErrorKind::Protocol));
        }

        let mut hello = Packet::new();
        hello.write(&TAG_HANDSHAKE);
        hello.write(self.session.public());

        self.stream.enqueue(OutBuffer::owned(hello.frame()));
        self.state = ChannelState::AwaitingPeerPublic;

        logging::debug!(self.log, "handshake queued"; "role" => ?self.role);

        Ok(())
    }

    /// Encrypts and queues one application packet. The payload is wrapped
    /// under the current outbound nonce, which advances once the frame is
    /// handed to the stream engine.
    pub fn send(&mut self, mut packet: Packet) -> NetResult<()> {
        if self.state != ChannelState::Established {
            return Err(NetError::Fatal(ErrorKind::Protocol));
        }

        let frame_len = 1 + MAC_SIZE + FRAME_HEADER_SIZE + packet.len();
        if frame_len > self.config.max_frame_len {
            return Err(NetError::Fatal(ErrorKind::Oversize));
        }

        let mac = self.session.wrap(&mut packet)?;

        let mut wire = Packet::with_capacity(frame_len);
        wire.write(&TAG_USER);
        wire.write(&mac);
        wire.write(&packet);

        self.stream.enqueue(OutBuffer::owned(wire.frame()));
        self.session.advance_outbound();

        logging::trace!(self.log, "frame queued";
                        "outbound_count" => self.session.outbound_count(),
                        "frame_len" => frame_len,
                        "queued_bytes" => self.stream.queued_bytes());

        Ok(())
    }

    /// One egress-only pass, used by the drivers to push queued data without
    /// a readiness event.
    #[inline]
    pub fn flush(&mut self) -> StreamStatus {
        self.stream.tick(&mut self.link, false, true)
    }

    /// Moves bytes according to the readiness flags, then extracts and
    /// dispatches every complete frame the inbound buffer yields. Decrypted
    /// application packets are appended to `received` in arrival order.
    pub fn tick(
        &mut self,
        readable: bool,
        writable: bool,
        received: &mut Vec<Packet>,
    ) -> StreamStatus {
        match self.stream.tick(&mut self.link, readable, writable) {
            StreamStatus::Open => (),
            other => return other,
        }

        if self.state == ChannelState::Dropping {
            return StreamStatus::Open;
        }

        loop {
            let frame = match deframe(self.stream.inbound(), self.config.max_frame_len) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(NetError::Fatal(kind)) => return StreamStatus::Failed(kind),
                Err(_) => break,
            };

            match self.dispatch(frame) {
                Ok(Some(packet)) => received.push(packet),
                Ok(None) => (),
                Err(kind) => return StreamStatus::Failed(kind),
            }
        }

        StreamStatus::Open
    }

    fn dispatch(&mut self, mut frame: Packet) -> Result<Option<Packet>, ErrorKind> {
        let tag: u8 = frame.read().map_err(|_| ErrorKind::Protocol)?;

        match tag {
            TAG_HANDSHAKE => self.on_handshake(frame).map(|_| None),
            TAG_USER => self.on_user(frame).map(Some),
            _ => Err(ErrorKind::Protocol),
        }
    }

    fn on_handshake(&mut self, mut frame: Packet) -> Result<(), ErrorKind> {
        // A repeated handshake, or one before ours went out, is hostile or
        // corrupt either way.
        if self.state != ChannelState::AwaitingPeerPublic {
            return Err(ErrorKind::Protocol);
        }

        let peer_public = frame.read().map_err(|_| ErrorKind::Protocol)?;
        self.session.derive(&peer_public).map_err(|_| ErrorKind::Crypto)?;

        if self.role == Role::Server {
            let mut response = Packet::new();
            response.write(&TAG_HANDSHAKE);
            response.write(self.session.public());
            self.stream.enqueue(OutBuffer::owned(response.frame()));
        }

        self.state = ChannelState::Established;
        self.just_established = true;

        logging::debug!(self.log, "shared secret established"; "role" => ?self.role);

        Ok(())
    }

    fn on_user(&mut self, mut frame: Packet) -> Result<Packet, ErrorKind> {
        if self.state != ChannelState::Established {
            return Err(ErrorKind::Protocol);
        }

        let mac = frame.read().map_err(|_| ErrorKind::Protocol)?;
        let mut inner: Packet = frame.read().map_err(|_| ErrorKind::Protocol)?;

        if !self.session.unwrap(&mut inner, &mac) {
            logging::debug!(self.log, "authenticator verification failed";
                            "inbound_count" => self.session.inbound_count());
            return Err(ErrorKind::Crypto);
        }

        self.session.advance_inbound();

        logging::trace!(self.log, "frame dispatched";
                        "inbound_count" => self.session.inbound_count(),
                        "payload_len" => inner.len());

        Ok(inner)
    }
}
