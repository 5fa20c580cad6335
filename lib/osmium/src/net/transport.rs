use crate::net::shared::NetResult;
use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use std::fmt;
use std::io;
use std::io::{IoSlice, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr};

/// Human-readable form of one side of a connection, produced on demand by
/// querying the kernel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConnectionInfo {
    pub ip: IpAddr,
    pub port: u16,
}

impl From<SocketAddr> for ConnectionInfo {
    #[inline]
    fn from(addr: SocketAddr) -> Self {
        ConnectionInfo {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// An owned, movable, non-clonable connected stream socket in non-blocking
/// mode. Dropping it releases the OS resource exactly once.
pub struct Transport {
    stream: TcpStream,
}

impl Transport {
    /// Starts a non-blocking connect to the supplied address. The connection
    /// is not necessarily complete when this returns; the first writable
    /// readiness signal marks completion (or the error surfaces on the first
    /// transfer attempt).
    #[inline]
    pub fn connect(addr: SocketAddr) -> NetResult<Transport> {
        Ok(Transport {
            stream: TcpStream::connect(addr)?,
        })
    }

    #[inline]
    pub(crate) fn new(stream: TcpStream) -> Transport {
        Transport { stream }
    }

    #[inline]
    pub fn peer_info(&self) -> Option<ConnectionInfo> {
        self.stream.peer_addr().ok().map(Into::into)
    }

    #[inline]
    pub fn local_info(&self) -> Option<ConnectionInfo> {
        self.stream.local_addr().ok().map(Into::into)
    }

    /// Gracefully closes both halves. Safe to call more than once.
    #[inline]
    pub fn shutdown(&mut self) {
        drop(self.stream.shutdown(Shutdown::Both));
    }
}

impl Read for Transport {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Transport {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    /// Scatter/gather transmit: one syscall for the concatenation of all
    /// buffers in order. The kernel may accept fewer bytes than offered.
    #[inline]
    fn write_vectored(&mut self, bufs: &[IoSlice]) -> io::Result<usize> {
        self.stream.write_vectored(bufs)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Source for Transport {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

/// A bound, listening socket handing out [`Transport`] instances.
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    /// Creates the listener, binds it to the address and starts listening.
    /// The socket is non-blocking and reuses the local address so a restarted
    /// server can rebind through TIME_WAIT.
    #[inline]
    pub fn bind(addr: SocketAddr) -> NetResult<Acceptor> {
        Ok(Acceptor {
            listener: TcpListener::bind(addr)?,
        })
    }

    /// Accepts one pending connection. `None` means no connection is waiting,
    /// which is not an error on a non-blocking listener.
    pub fn accept(&mut self) -> NetResult<Option<Transport>> {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => return Ok(Some(Transport::new(stream))),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    #[inline]
    pub fn local_info(&self) -> Option<ConnectionInfo> {
        self.listener.local_addr().ok().map(Into::into)
    }
}

impl Source for Acceptor {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.listener.deregister(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_display() {
        let v4 = ConnectionInfo {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9000,
        };
        assert_eq!(v4.to_string(), "127.0.0.1:9000");

        let v6 = ConnectionInfo {
            ip: "::1".parse().unwrap(),
            port: 9000,
        };
        assert_eq!(v6.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_accept_empty_backlog() {
        let mut acceptor = Acceptor::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        assert!(acceptor.local_info().unwrap().port != 0);
        assert!(acceptor.accept().unwrap().is_none());
    }
}
