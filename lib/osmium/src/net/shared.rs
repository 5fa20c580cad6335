use std::io;
use std::time::Duration;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NetError {
    /// No progress at this moment, retry on the next readiness signal.
    Wait,
    /// A read past the end of a packet. Recoverable at the codec boundary:
    /// the read is rejected and the cursor is left where it was.
    Underflow,
    /// The peer is done for.
    Fatal(ErrorKind),
}

/// Platform-neutral failure taxonomy. The transport maps `io::Error` into
/// this so that everything above it stays platform-agnostic.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    Refused,
    Reset,
    TimedOut,
    HostUnreachable,
    NetworkDown,
    AddrInUse,
    Interrupted,
    /// Authenticator verification failed. The nonce counters cannot be
    /// resynchronized in-band, so the session is unrecoverable.
    Crypto,
    /// Unexpected frame in the current channel state.
    Protocol,
    /// Frame length above the configured ceiling.
    Oversize,
    /// Zero-length frame on the wire.
    EmptyFrame,
    /// Outbound queue grew past the configured cap.
    QueueOverflow,
    /// Frame content that cannot be decoded (e.g. malformed text).
    Serialization,
    /// Operation against an identifier the driver does not know.
    UnknownPeer,
    Unknown,
}

impl ErrorKind {
    pub(crate) fn from_io(kind: io::ErrorKind) -> ErrorKind {
        match kind {
            io::ErrorKind::ConnectionRefused => ErrorKind::Refused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ErrorKind::Reset,
            io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ErrorKind::HostUnreachable
            }
            io::ErrorKind::NetworkDown => ErrorKind::NetworkDown,
            io::ErrorKind::AddrInUse => ErrorKind::AddrInUse,
            io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetError::Wait,
            kind => NetError::Fatal(ErrorKind::from_io(kind)),
        }
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetError::Wait) => false,
            Err(NetError::Underflow) => false,
            _ => true,
        }
    }
}

/// Coalesced per-tick outcome for a byte stream or a peer channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StreamStatus {
    /// Zero or more bytes moved, keep the peer.
    Open,
    /// The peer closed its write half. Not an error, but ends the session.
    Closed,
    /// Fatal, drop the peer.
    Failed(ErrorKind),
}

/// Why a peer went away. Handed to the disconnect callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DropReason {
    /// Orderly shutdown by the peer.
    Closed,
    Error(ErrorKind),
    /// Disconnect queued on this side via the driver.
    Requested,
}

/// Driver and channel tunables.
#[derive(Debug, Copy, Clone)]
pub struct Config {
    /// Deframe ceiling. Frames advertising more than this are fatal.
    pub max_frame_len: usize,
    /// Bytes ingested from the kernel per stream tick.
    pub ingress_budget: usize,
    /// Outbound queue cap in bytes. A peer that falls this far behind is
    /// dropped rather than allowed to balloon memory.
    pub max_queued: usize,
    /// Upper bound on the blocking poll inside a driver tick.
    pub poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_frame_len: 16 * 1024 * 1024,
            ingress_budget: 16 * 1024,
            max_queued: 8 * 1024 * 1024,
            poll_timeout: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_folds_to_wait() {
        let err: NetError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetError::Wait);
    }

    #[test]
    fn test_platform_errors_fold_to_taxonomy() {
        let err: NetError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert_eq!(err, NetError::Fatal(ErrorKind::Refused));

        let err: NetError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert_eq!(err, NetError::Fatal(ErrorKind::Reset));

        let err: NetError = io::Error::from(io::ErrorKind::AddrNotAvailable).into();
        assert_eq!(err, NetError::Fatal(ErrorKind::Unknown));
    }

    #[test]
    fn test_has_failed() {
        assert!(!Ok::<(), NetError>(()).has_failed());
        assert!(!Err::<(), _>(NetError::Wait).has_failed());
        assert!(!Err::<(), _>(NetError::Underflow).has_failed());
        assert!(Err::<(), _>(NetError::Fatal(ErrorKind::Crypto)).has_failed());
    }
}
