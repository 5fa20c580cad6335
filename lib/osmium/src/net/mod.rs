//! Layering, leaf first: `shared` (results and tunables), `transport` and
//! `poll` (the OS edge), `buffer` and `stream` (the byte pipe), `packet`
//! (framing and the typed grammar), `session` (the key agreement and nonce
//! ledger), `channel` (the per-peer state machine), `table`, `endpoint` and
//! `client` (the drivers).

pub mod shared;

pub mod poll;
pub mod transport;

pub mod buffer;
pub mod stream;

pub mod packet;
pub mod session;

pub mod channel;

pub mod table;

pub mod client;
pub mod endpoint;
