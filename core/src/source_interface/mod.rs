pub mod adapter;
pub mod packet;

#[cfg(test)]
pub(crate) mod scripted;

pub use adapter::{AdapterError, ChannelAdapter, ChannelCallback, PacketSource};
pub use packet::SamplePacket;
