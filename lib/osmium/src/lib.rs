//! The networking modules in `osmium` provide an encrypted, length-prefixed
//! packet channel over non-blocking TCP: a stream engine that survives
//! partial writes, a typed packet codec, an ephemeral Diffie-Hellman session
//! with per-direction nonce counters, and the server/client drivers tying
//! them together.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod net;
pub mod prelude;
