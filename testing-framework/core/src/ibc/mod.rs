pub mod channel;
pub mod denom;
pub mod packet;

pub use channel::{
    ChannelCounterparty, ChannelInfo, ChannelOptions, ChannelOrder, ConnectionCounterparty,
    ConnectionInfo, ICS20_VERSION, TRANSFER_PORT,
};
pub use denom::{DenomTrace, ibc_denom, prefixed_denom, received_denom};
pub use packet::{
    ACK_SUCCESS_B64, Acknowledgement, FungibleTokenPacketData, Packet, PacketEvent, PacketRef,
    PacketState, PacketTracker, TransitionError,
};
