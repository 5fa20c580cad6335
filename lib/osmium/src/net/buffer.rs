use std::sync::Arc;

/// Backing storage for an outbound buffer. Most buffers are uniquely owned
/// by the stream that drains them; a buffer fanned out to several peers
/// (broadcast) shares one allocation instead of copying it per peer.
enum Payload {
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
}

impl Payload {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Owned(data) => data,
            Payload::Shared(data) => data,
        }
    }
}

/// An outbound byte sequence plus a head offset marking how much of it has
/// already been accepted by the kernel. The unsent region is `bytes[offset..]`.
pub struct OutBuffer {
    payload: Payload,
    offset: usize,
}

impl OutBuffer {
    #[inline]
    pub fn owned(data: Vec<u8>) -> OutBuffer {
        OutBuffer {
            payload: Payload::Owned(data),
            offset: 0,
        }
    }

    #[inline]
    pub fn shared(data: Arc<[u8]>) -> OutBuffer {
        OutBuffer {
            payload: Payload::Shared(data),
            offset: 0,
        }
    }

    /// The not-yet-transmitted region.
    #[inline]
    pub fn unsent(&self) -> &[u8] {
        &self.payload.as_bytes()[self.offset..]
    }

    /// Remaining (unsent) length.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.as_bytes().len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks `count` bytes as transmitted, advancing the head offset by at
    /// most the remaining length. Returns the excess that did not apply to
    /// this buffer.
    #[inline]
    pub fn consume(&mut self, count: usize) -> usize {
        let taken = count.min(self.len());
        self.offset += taken;
        count - taken
    }
}

impl From<Vec<u8>> for OutBuffer {
    #[inline]
    fn from(data: Vec<u8>) -> Self {
        OutBuffer::owned(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_partial() {
        let mut buffer = OutBuffer::owned(vec![1, 2, 3, 4, 5]);

        assert_eq!(buffer.consume(2), 0);
        assert_eq!(buffer.unsent(), &[3, 4, 5]);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_consume_exact() {
        let mut buffer = OutBuffer::owned(vec![1, 2, 3]);

        assert_eq!(buffer.consume(3), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.unsent(), &[] as &[u8]);
    }

    #[test]
    fn test_consume_excess() {
        let mut buffer = OutBuffer::owned(vec![1, 2, 3]);

        assert_eq!(buffer.consume(10), 7);
        assert!(buffer.is_empty());

        // Consuming an empty buffer returns everything as excess.
        assert_eq!(buffer.consume(4), 4);
    }

    #[test]
    fn test_shared_view() {
        let data: Arc<[u8]> = Arc::from(&[9, 9, 9][..]);

        let mut first = OutBuffer::shared(data.clone());
        let second = OutBuffer::shared(data);

        first.consume(2);

        assert_eq!(first.unsent(), &[9]);
        assert_eq!(second.unsent(), &[9, 9, 9]);
    }
}
