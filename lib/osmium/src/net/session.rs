use crate::net::packet::Packet;
use crate::net::shared::{ErrorKind, NetError, NetResult};
use byteorder::{ByteOrder, LittleEndian};
use flint::crypto;
use flint::crypto::{KEY_SIZE, MAC_SIZE, NONCE_SIZE};

/// One side of an ephemeral Diffie-Hellman session.
///
/// Holds the local key pair, the derived shared secret once the peer's
/// public point is known, and one monotonic counter per direction. Nonces
/// are never transmitted: both sides reconstruct them from their own
/// counters, and any desynchronization surfaces as an authenticator failure.
///
/// Secret material is overwritten with zeros when the session is dropped.
pub struct Session {
    private: [u8; KEY_SIZE],
    public: [u8; KEY_SIZE],
    shared: [u8; KEY_SIZE],
    shared_valid: bool,
    outbound: u64,
    inbound: u64,
}

impl Session {
    /// Draws a fresh random scalar and computes the matching public point.
    pub fn new() -> Session {
        let mut private = [0u8; KEY_SIZE];
        crypto::random_bytes(&mut private);

        let public = crypto::x25519_base(&private);

        Session {
            private,
            public,
            shared: [0u8; KEY_SIZE],
            shared_valid: false,
            outbound: 0,
            inbound: 0,
        }
    }

    /// The local public point, sent to the peer during the handshake.
    #[inline]
    pub fn public(&self) -> &[u8; KEY_SIZE] {
        &self.public
    }

    #[inline]
    pub fn shared_valid(&self) -> bool {
        self.shared_valid
    }

    /// Derives the shared secret from the peer's public point:
    /// `BLAKE2b(X25519(private, peer_public))`. Fails if the peer supplied a
    /// degenerate point.
    pub fn derive(&mut self, peer_public: &[u8; KEY_SIZE]) -> NetResult<()> {
        let mut dh = [0u8; KEY_SIZE];

        if !crypto::x25519(&mut dh, &self.private, peer_public) {
            crypto::memzero(&mut dh);
            return Err(NetError::Fatal(ErrorKind::Crypto));
        }

        crypto::blake2b(&mut self.shared, &dh);
        crypto::memzero(&mut dh);

        self.shared_valid = true;
        Ok(())
    }

    #[inline]
    pub fn outbound_count(&self) -> u64 {
        self.outbound
    }

    #[inline]
    pub fn inbound_count(&self) -> u64 {
        self.inbound
    }

    /// Advances the outbound counter by one. Called per frame handed to the
    /// stream engine for transmission.
    #[inline]
    pub fn advance_outbound(&mut self) {
        self.outbound += 1;
    }

    /// Advances the inbound counter by one. Called per frame that passed
    /// authenticator verification, never on failure.
    #[inline]
    pub fn advance_inbound(&mut self) {
        self.inbound += 1;
    }

    #[inline]
    pub fn outbound_nonce(&self) -> [u8; NONCE_SIZE] {
        Self::nonce(self.outbound)
    }

    #[inline]
    pub fn inbound_nonce(&self) -> [u8; NONCE_SIZE] {
        Self::nonce(self.inbound)
    }

    /// The counter, little-endian, in the first 8 bytes; the rest zero.
    #[inline]
    fn nonce(counter: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        LittleEndian::write_u64(&mut nonce[..8], counter);
        nonce
    }

    /// Encrypts the packet's cursor-to-end bytes in place under the current
    /// outbound nonce and returns the detached authenticator.
    pub fn wrap(&self, packet: &mut Packet) -> NetResult<[u8; MAC_SIZE]> {
        if !self.shared_valid {
            return Err(NetError::Fatal(ErrorKind::Crypto));
        }

        let nonce = self.outbound_nonce();
        let mut mac = [0u8; MAC_SIZE];

        if !crypto::seal(packet.remaining_mut(), &mut mac, &[], &nonce, &self.shared) {
            return Err(NetError::Fatal(ErrorKind::Crypto));
        }

        Ok(mac)
    }

    /// Decrypts the packet's cursor-to-end bytes in place under the current
    /// inbound nonce. Returns true iff the authenticator verifies; on false
    /// the buffer contents are undefined and must be discarded.
    pub fn unwrap(&self, packet: &mut Packet, mac: &[u8; MAC_SIZE]) -> bool {
        if !self.shared_valid {
            return false;
        }

        let nonce = self.inbound_nonce();
        crypto::open(packet.remaining_mut(), mac, &[], &nonce, &self.shared)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        crypto::memzero(&mut self.private);
        crypto::memzero(&mut self.public);
        crypto::memzero(&mut self.shared);
    }
}
