//! # Shared Protocol Library
//!
//! Wire-level building blocks for talking to game servers and master servers
//! with the A2S query protocol. Both the per-server querier and the master
//! server discovery client encode their requests and decode their replies
//! through this crate, so the byte layout lives in exactly one place.
//!
//! ## Module Organization
//!
//! ### Codec Module (`codec`)
//! Bounds-checked primitives:
//! - [`PacketBuilder`] appends raw bytes, little-endian integers and
//!   null-terminated strings
//! - [`PacketReader`] walks a received datagram with a cursor, failing with
//!   [`CodecError::OutOfBounds`] instead of reading past the end
//!
//! ### Packets Module (`packets`)
//! Message layer on top of the codec:
//! - Info, player and master server request encoders
//! - Reply decoders for server info (Source and GoldSrc layouts), player
//!   lists, challenges and master server address pages
//!
//! ## Byte Order
//!
//! Every integer and float is little-endian, except the IPv4 address and
//! port pairs in master server replies, which are in network byte order.
//!
//! ## Limits
//!
//! Replies are read one datagram at a time, capped at [`MAX_PACKET_SIZE`]
//! bytes. Split replies are reported as [`CodecError::SplitPacket`].

pub mod codec;
pub mod packets;

pub use codec::{CodecError, PacketBuilder, PacketReader};
pub use packets::{
    decode_info_response, decode_master_response, decode_player_response, ExtendedInfo,
    InfoRequest, InfoResponse, MasterRequest, Player, PlayerRequest, PlayerResponse, ServerInfo,
    ServerOs, ServerType, MAX_PACKET_SIZE, NO_CHALLENGE,
};
