use crate::net::shared::{ErrorKind, NetError, NetResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::{Buf, BytesMut};

/// Size of the length prefix preceding every frame on the wire.
pub const FRAME_HEADER_SIZE: usize = 4;

/// An owned byte sequence with a read cursor. Writes append at the tail,
/// reads consume at the cursor. The typed grammar lives in [`Serialize`] and
/// [`Deserialize`]; integers inside a packet are little-endian, only the
/// outer frame length is big-endian.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Packet {
    data: Vec<u8>,
    cursor: usize,
}

impl Packet {
    #[inline]
    pub fn new() -> Packet {
        Packet {
            data: Vec::new(),
            cursor: 0,
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Packet {
        Packet {
            data: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Copying construction from a byte view.
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Packet {
        Packet {
            data: bytes.to_vec(),
            cursor: 0,
        }
    }

    /// Moving construction from an owned byte sequence.
    #[inline]
    pub fn from_vec(data: Vec<u8>) -> Packet {
        Packet { data, cursor: 0 }
    }

    /// Total packet length, independent of the cursor.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The full byte sequence.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The not-yet-consumed region, cursor to tail.
    #[inline]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Mutable view of the not-yet-consumed region. This is the region the
    /// session encrypts and decrypts in place.
    #[inline]
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.cursor..]
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    /// Appends the typed image of a value.
    #[inline]
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) {
        value.serialize(self);
    }

    /// Reads a value at the cursor. On any failure the cursor is left where
    /// it was, including for partially consumed compound values.
    #[inline]
    pub fn read<T: Deserialize>(&mut self) -> NetResult<T> {
        let mark = self.cursor;

        match T::deserialize(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.cursor = mark;
                Err(err)
            }
        }
    }

    /// Appends raw bytes without a length prefix.
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Consumes `count` raw bytes at the cursor.
    #[inline]
    fn take(&mut self, count: usize) -> NetResult<&[u8]> {
        if self.cursor + count > self.data.len() {
            return Err(NetError::Underflow);
        }

        let bytes = &self.data[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(bytes)
    }

    /// Serializes the packet for the wire: a 4-byte big-endian length
    /// followed by the packet bytes. The header is never part of the packet
    /// itself.
    pub fn frame(&self) -> Vec<u8> {
        debug_assert!(self.data.len() <= u32::max_value() as usize);

        let mut wire = Vec::with_capacity(FRAME_HEADER_SIZE + self.data.len());
        wire.extend_from_slice(&[0; FRAME_HEADER_SIZE]);
        BigEndian::write_u32(&mut wire[..FRAME_HEADER_SIZE], self.data.len() as u32);
        wire.extend_from_slice(&self.data);
        wire
    }
}

/// Extracts one complete frame from the head of the inbound byte buffer.
///
/// Returns `Ok(None)` when fewer than a full frame is available, leaving the
/// buffer untouched. A zero length or a length above `max_len` is fatal; the
/// connection is corrupt or hostile and there is no way to resynchronize.
pub fn deframe(stream: &mut BytesMut, max_len: usize) -> NetResult<Option<Packet>> {
    if stream.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    let length = BigEndian::read_u32(&stream[..FRAME_HEADER_SIZE]) as usize;

    if length == 0 {
        return Err(NetError::Fatal(ErrorKind::EmptyFrame));
    }

    if length > max_len {
        return Err(NetError::Fatal(ErrorKind::Oversize));
    }

    if stream.len() < FRAME_HEADER_SIZE + length {
        return Ok(None);
    }

    stream.advance(FRAME_HEADER_SIZE);
    let payload = stream.split_to(length);

    Ok(Some(Packet::from_vec(payload.to_vec())))
}

/// Typed append into a packet. Writing cannot fail; the packet grows as
/// needed.
pub trait Serialize {
    fn serialize(&self, packet: &mut Packet);
}

/// Typed read out of a packet. Implementations must consume nothing on
/// failure beyond what [`Packet::read`] rolls back.
pub trait Deserialize: Sized {
    fn deserialize(packet: &mut Packet) -> NetResult<Self>;
}

macro_rules! impl_fixed {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl Serialize for $ty {
            #[inline]
            fn serialize(&self, packet: &mut Packet) {
                let mut image = [0u8; $size];
                LittleEndian::$write(&mut image, *self);
                packet.append_bytes(&image);
            }
        }

        impl Deserialize for $ty {
            #[inline]
            fn deserialize(packet: &mut Packet) -> NetResult<Self> {
                Ok(LittleEndian::$read(packet.take($size)?))
            }
        }
    };
}

impl_fixed!(u16, 2, write_u16, read_u16);
impl_fixed!(u32, 4, write_u32, read_u32);
impl_fixed!(u64, 8, write_u64, read_u64);
impl_fixed!(i16, 2, write_i16, read_i16);
impl_fixed!(i32, 4, write_i32, read_i32);
impl_fixed!(i64, 8, write_i64, read_i64);
impl_fixed!(f32, 4, write_f32, read_f32);
impl_fixed!(f64, 8, write_f64, read_f64);

impl Serialize for u8 {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.data.push(*self);
    }
}

impl Deserialize for u8 {
    #[inline]
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        Ok(packet.take(1)?[0])
    }
}

impl Serialize for i8 {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.data.push(*self as u8);
    }
}

impl Deserialize for i8 {
    #[inline]
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        Ok(packet.take(1)?[0] as i8)
    }
}

impl Serialize for bool {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.data.push(*self as u8);
    }
}

impl Deserialize for bool {
    #[inline]
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        Ok(packet.take(1)?[0] != 0)
    }
}

impl<const N: usize> Serialize for [u8; N] {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.append_bytes(self);
    }
}

impl<const N: usize> Deserialize for [u8; N] {
    #[inline]
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        let mut value = [0u8; N];
        value.copy_from_slice(packet.take(N)?);
        Ok(value)
    }
}

impl Serialize for str {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.write(&(self.len() as u32));
        packet.append_bytes(self.as_bytes());
    }
}

impl Serialize for String {
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        self.as_str().serialize(packet);
    }
}

impl Deserialize for String {
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        let length = u32::deserialize(packet)? as usize;
        let bytes = packet.take(length)?.to_vec();

        String::from_utf8(bytes).map_err(|_| NetError::Fatal(ErrorKind::Serialization))
    }
}

impl<T: Serialize> Serialize for Vec<T> {
    fn serialize(&self, packet: &mut Packet) {
        packet.write(&(self.len() as u32));

        for element in self {
            element.serialize(packet);
        }
    }
}

impl<T: Deserialize> Deserialize for Vec<T> {
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        let count = u32::deserialize(packet)? as usize;

        // Every element is at least one byte, so a count beyond the remaining
        // data can never decode. Checking here bounds the allocation below.
        if count > packet.remaining().len() {
            return Err(NetError::Underflow);
        }

        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(T::deserialize(packet)?);
        }

        Ok(elements)
    }
}

impl Serialize for Packet {
    /// Nested packet: a 4-byte length followed by the packet's bytes.
    #[inline]
    fn serialize(&self, packet: &mut Packet) {
        packet.write(&(self.data.len() as u32));
        packet.append_bytes(&self.data);
    }
}

impl Deserialize for Packet {
    #[inline]
    fn deserialize(packet: &mut Packet) -> NetResult<Self> {
        let length = u32::deserialize(packet)? as usize;
        Ok(Packet::from_slice(packet.take(length)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_roundtrip() {
        let mut packet = Packet::new();

        packet.write(&0xabu8);
        packet.write(&0xcdefu16);
        packet.write(&0xdead_beefu32);
        packet.write(&0x0123_4567_89ab_cdefu64);
        packet.write(&(-5i32));
        packet.write(&1.5f64);
        packet.write(&true);
        packet.write("hello");
        packet.write(&vec![10u32, 20, 30]);
        packet.write(&[9u8; 16]);

        assert_eq!(packet.read::<u8>().unwrap(), 0xab);
        assert_eq!(packet.read::<u16>().unwrap(), 0xcdef);
        assert_eq!(packet.read::<u32>().unwrap(), 0xdead_beef);
        assert_eq!(packet.read::<u64>().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(packet.read::<i32>().unwrap(), -5);
        assert_eq!(packet.read::<f64>().unwrap(), 1.5);
        assert_eq!(packet.read::<bool>().unwrap(), true);
        assert_eq!(packet.read::<String>().unwrap(), "hello");
        assert_eq!(packet.read::<Vec<u32>>().unwrap(), vec![10, 20, 30]);
        assert_eq!(packet.read::<[u8; 16]>().unwrap(), [9u8; 16]);
        assert_eq!(packet.remaining().len(), 0);
    }

    #[test]
    fn test_nested_roundtrip() {
        let mut inner = Packet::new();
        inner.write("payload");
        inner.write(&7u64);

        let mut outer = Packet::new();
        outer.write(&1u8);
        outer.write(&inner);
        outer.write(&2u8);

        assert_eq!(outer.read::<u8>().unwrap(), 1);

        let mut decoded = outer.read::<Packet>().unwrap();
        assert_eq!(decoded.bytes(), inner.bytes());
        assert_eq!(decoded.read::<String>().unwrap(), "payload");
        assert_eq!(decoded.read::<u64>().unwrap(), 7);

        assert_eq!(outer.read::<u8>().unwrap(), 2);
    }

    #[test]
    fn test_vector_of_strings() {
        let mut packet = Packet::new();
        packet.write(&vec!["one".to_string(), "two".to_string()]);

        assert_eq!(
            packet.read::<Vec<String>>().unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn test_underflow_leaves_cursor() {
        let mut packet = Packet::new();
        packet.write(&0x1122u16);

        assert_eq!(packet.read::<u32>(), Err(NetError::Underflow));
        // The failed read consumed nothing.
        assert_eq!(packet.read::<u16>().unwrap(), 0x1122);
    }

    #[test]
    fn test_compound_underflow_leaves_cursor() {
        // A string advertising ten bytes with only three present.
        let mut packet = Packet::new();
        packet.write(&10u32);
        packet.append_bytes(b"abc");

        assert_eq!(packet.read::<String>(), Err(NetError::Underflow));
        // The length prefix was rolled back too.
        assert_eq!(packet.read::<u32>().unwrap(), 10);
    }

    #[test]
    fn test_vector_count_bound() {
        // A hostile count must not drive the allocation, just fail the read.
        let mut packet = Packet::new();
        packet.write(&u32::max_value());

        assert_eq!(packet.read::<Vec<u64>>(), Err(NetError::Underflow));
    }

    #[test]
    fn test_frame_layout() {
        let mut packet = Packet::new();
        packet.append_bytes(&[1, 2, 3]);

        assert_eq!(packet.frame(), vec![0, 0, 0, 3, 1, 2, 3]);
    }

    #[test]
    fn test_frame_deframe_roundtrip() {
        let mut packet = Packet::new();
        packet.write("ping");
        packet.write(&42u64);

        let mut stream = BytesMut::from(&packet.frame()[..]);

        let decoded = deframe(&mut stream, 1024).unwrap().unwrap();
        assert_eq!(decoded.bytes(), packet.bytes());
        assert!(stream.is_empty());

        // Reframing produces byte-identical output.
        assert_eq!(decoded.frame(), packet.frame());
    }

    #[test]
    fn test_deframe_partial_input_untouched() {
        let mut packet = Packet::new();
        packet.write(&7u32);
        let wire = packet.frame();

        for cut in 0..wire.len() {
            let mut stream = BytesMut::from(&wire[..cut]);

            assert_eq!(deframe(&mut stream, 1024).unwrap(), None);
            assert_eq!(&stream[..], &wire[..cut]);
        }
    }

    #[test]
    fn test_deframe_multiple_frames_in_order() {
        let mut first = Packet::new();
        first.write(&1u8);
        let mut second = Packet::new();
        second.write(&2u8);

        let mut stream = BytesMut::new();
        stream.extend_from_slice(&first.frame());
        stream.extend_from_slice(&second.frame());
        // Half of a third frame header.
        stream.extend_from_slice(&[0, 0]);

        assert_eq!(deframe(&mut stream, 1024).unwrap().unwrap(), first);
        assert_eq!(deframe(&mut stream, 1024).unwrap().unwrap(), second);
        assert_eq!(deframe(&mut stream, 1024).unwrap(), None);
        assert_eq!(&stream[..], &[0, 0]);
    }

    #[test]
    fn test_frame_deframe_random_payloads() {
        use rand::{Rng, RngCore};

        let mut rng = rand::thread_rng();
        let mut stream = BytesMut::new();
        let mut expected = Vec::new();

        for _ in 0..20 {
            let mut payload = vec![0u8; rng.gen_range(1..2048)];
            rng.fill_bytes(&mut payload);

            let packet = Packet::from_vec(payload);
            stream.extend_from_slice(&packet.frame());
            expected.push(packet);
        }

        for packet in &expected {
            assert_eq!(&deframe(&mut stream, 4096).unwrap().unwrap(), packet);
        }

        assert!(stream.is_empty());
    }

    #[test]
    fn test_deframe_zero_length_fatal() {
        let mut stream = BytesMut::from(&[0u8, 0, 0, 0][..]);

        assert_eq!(
            deframe(&mut stream, 1024),
            Err(NetError::Fatal(ErrorKind::EmptyFrame))
        );
    }

    #[test]
    fn test_deframe_oversize_fatal() {
        let mut packet = Packet::new();
        packet.append_bytes(&[0u8; 64]);
        let mut stream = BytesMut::from(&packet.frame()[..]);

        assert_eq!(
            deframe(&mut stream, 63),
            Err(NetError::Fatal(ErrorKind::Oversize))
        );
    }

    #[test]
    fn test_invalid_utf8_fatal() {
        let mut packet = Packet::new();
        packet.write(&2u32);
        packet.append_bytes(&[0xff, 0xfe]);

        assert_eq!(
            packet.read::<String>(),
            Err(NetError::Fatal(ErrorKind::Serialization))
        );
    }

    #[test]
    fn test_remaining_tracks_cursor() {
        let mut packet = Packet::from_slice(&[1, 2, 3, 4]);

        assert_eq!(packet.remaining(), &[1, 2, 3, 4]);
        packet.read::<u16>().unwrap();
        assert_eq!(packet.remaining(), &[3, 4]);
        assert_eq!(packet.len(), 4);
    }
}
