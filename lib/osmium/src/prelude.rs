pub use crate::net::channel::{Channel, ChannelState, Role};
pub use crate::net::client::{Client, ClientEvents};
pub use crate::net::endpoint::{Endpoint, ServerEvents};
pub use crate::net::packet::{deframe, Deserialize, Packet, Serialize};
pub use crate::net::shared::{
    Config, DropReason, ErrorKind, ErrorUtils, NetError, NetResult, StreamStatus,
};
pub use crate::net::table::{PeerId, NO_PEER};
pub use crate::net::transport::ConnectionInfo;
