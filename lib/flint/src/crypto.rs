use ctor::ctor;
use libsodium_sys;

pub const KEY_SIZE: usize = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_KEYBYTES as usize;
pub const MAC_SIZE: usize = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_ABYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_NPUBBYTES as usize;
pub const POINT_SIZE: usize = libsodium_sys::crypto_scalarmult_BYTES as usize;
pub const HASH_SIZE: usize = libsodium_sys::crypto_generichash_BYTES as usize;

/// Initialize the sodium infrastructure
#[ctor]
fn INIT_SODIUM() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("Cryptography initialization failed")
        }
    }
}

/// Fills the provided buffer with cryptographically secure random bytes sourced
/// from the platform generator.
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut ::std::ffi::c_void, out.len());
    }
}

/// Overwrites the buffer with zeros in a way the optimizer is not allowed to elide.
#[inline]
pub fn memzero(buf: &mut [u8]) {
    unsafe {
        libsodium_sys::sodium_memzero(buf.as_mut_ptr() as *mut ::std::ffi::c_void, buf.len());
    }
}

/// Computes the public point for the supplied secret scalar (fixed-base X25519).
#[inline]
pub fn x25519_base(scalar: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let mut point = [0u8; KEY_SIZE];

    unsafe {
        let result = libsodium_sys::crypto_scalarmult_base(point.as_mut_ptr(), scalar.as_ptr());
        debug_assert_eq!(result, 0);
    }

    point
}

/// Computes the X25519 shared point for the supplied secret scalar and peer point.
/// Fails if the resulting point is degenerate (the peer supplied a low order point).
#[inline]
pub fn x25519(shared: &mut [u8; KEY_SIZE], scalar: &[u8; KEY_SIZE], point: &[u8; KEY_SIZE]) -> bool {
    unsafe {
        let result =
            libsodium_sys::crypto_scalarmult(shared.as_mut_ptr(), scalar.as_ptr(), point.as_ptr());
        result == 0
    }
}

/// Hashes the input into a 32 byte BLAKE2b digest.
#[inline]
pub fn blake2b(out: &mut [u8; HASH_SIZE], input: &[u8]) {
    unsafe {
        let result = libsodium_sys::crypto_generichash(
            out.as_mut_ptr(),
            HASH_SIZE,
            input.as_ptr(),
            input.len() as u64,
            ::std::ptr::null(),
            0,
        );
        debug_assert_eq!(result, 0);
    }
}

/// Encrypts the data in place and writes the detached authenticator into `mac`.
///
/// The additional data, nonce and key must match those used during decryption,
/// the decryption will fail otherwise.
#[inline]
pub fn seal(
    data: &mut [u8],
    mac: &mut [u8; MAC_SIZE],
    additional_data: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &[u8; KEY_SIZE],
) -> bool {
    let ad_ptr = match additional_data.is_empty() {
        true => ::std::ptr::null(),
        false => additional_data.as_ptr(),
    };

    unsafe {
        let result = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_encrypt_detached(
            data.as_mut_ptr(),
            mac.as_mut_ptr(),
            ::std::ptr::null_mut(),
            data.as_ptr(),
            data.len() as u64,
            ad_ptr,
            additional_data.len() as u64,
            ::std::ptr::null(),
            nonce.as_ptr(),
            key.as_ptr(),
        );

        result == 0
    }
}

/// Decrypts the data in place, verifying the detached authenticator. Returns
/// false if the authenticator does not match, in which case the buffer contents
/// are undefined and must be discarded.
#[inline]
pub fn open(
    data: &mut [u8],
    mac: &[u8; MAC_SIZE],
    additional_data: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &[u8; KEY_SIZE],
) -> bool {
    let ad_ptr = match additional_data.is_empty() {
        true => ::std::ptr::null(),
        false => additional_data.as_ptr(),
    };

    unsafe {
        let result = libsodium_sys::crypto_aead_xchacha20poly1305_ietf_decrypt_detached(
            data.as_mut_ptr(),
            ::std::ptr::null_mut(),
            data.as_ptr(),
            data.len() as u64,
            mac.as_ptr(),
            ad_ptr,
            additional_data.len() as u64,
            nonce.as_ptr(),
            key.as_ptr(),
        );

        result == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(KEY_SIZE, 32);
        assert_eq!(MAC_SIZE, 16);
        assert_eq!(NONCE_SIZE, 24);
        assert_eq!(POINT_SIZE, 32);
        assert_eq!(HASH_SIZE, 32);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let nonce = [3u8; NONCE_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        let mut data = b"attack at dawn".to_vec();

        assert!(seal(&mut data, &mut mac, &[], &nonce, &key));
        assert_ne!(&data[..], b"attack at dawn");

        assert!(open(&mut data, &mac, &[], &nonce, &key));
        assert_eq!(&data[..], b"attack at dawn");
    }

    #[test]
    fn test_open_rejects_tampered_mac() {
        let key = [7u8; KEY_SIZE];
        let nonce = [3u8; NONCE_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        let mut data = b"attack at dawn".to_vec();
        assert!(seal(&mut data, &mut mac, &[], &nonce, &key));

        mac[2] ^= 1;

        assert!(!open(&mut data, &mac, &[], &nonce, &key));
    }

    #[test]
    fn test_open_rejects_tampered_cipher() {
        let key = [7u8; KEY_SIZE];
        let nonce = [3u8; NONCE_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        let mut data = b"attack at dawn".to_vec();
        assert!(seal(&mut data, &mut mac, &[], &nonce, &key));

        data[0] ^= 1;

        assert!(!open(&mut data, &mac, &[], &nonce, &key));
    }

    #[test]
    fn test_open_rejects_wrong_nonce() {
        let key = [7u8; KEY_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        let mut data = b"attack at dawn".to_vec();
        assert!(seal(&mut data, &mut mac, &[], &[3u8; NONCE_SIZE], &key));
        assert!(!open(&mut data, &mac, &[], &[4u8; NONCE_SIZE], &key));
    }

    #[test]
    fn test_open_rejects_mismatched_additional_data() {
        let key = [7u8; KEY_SIZE];
        let nonce = [3u8; NONCE_SIZE];
        let mut mac = [0u8; MAC_SIZE];

        let mut data = b"attack at dawn".to_vec();
        assert!(seal(&mut data, &mut mac, b"header", &nonce, &key));
        assert!(!open(&mut data, &mac, b"mangled", &nonce, &key));
    }

    #[test]
    fn test_x25519_agreement() {
        let mut scalar_a = [0u8; KEY_SIZE];
        let mut scalar_b = [0u8; KEY_SIZE];
        random_bytes(&mut scalar_a);
        random_bytes(&mut scalar_b);

        let point_a = x25519_base(&scalar_a);
        let point_b = x25519_base(&scalar_b);

        let mut shared_a = [0u8; KEY_SIZE];
        let mut shared_b = [0u8; KEY_SIZE];

        assert!(x25519(&mut shared_a, &scalar_a, &point_b));
        assert!(x25519(&mut shared_b, &scalar_b, &point_a));
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn test_x25519_rejects_low_order_point() {
        let mut scalar = [0u8; KEY_SIZE];
        random_bytes(&mut scalar);

        let mut shared = [0u8; KEY_SIZE];
        assert!(!x25519(&mut shared, &scalar, &[0u8; KEY_SIZE]));
    }

    #[test]
    fn test_blake2b_deterministic() {
        let mut first = [0u8; HASH_SIZE];
        let mut second = [0u8; HASH_SIZE];

        blake2b(&mut first, b"input");
        blake2b(&mut second, b"input");
        assert_eq!(first, second);

        blake2b(&mut second, b"other");
        assert_ne!(first, second);
    }

    #[test]
    fn test_random_bytes_vary() {
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];

        random_bytes(&mut first);
        random_bytes(&mut second);

        assert_ne!(first, second);
    }

    #[test]
    fn test_memzero() {
        let mut buf = [0xffu8; 16];
        memzero(&mut buf);
        assert_eq!(buf, [0u8; 16]);
    }
}
