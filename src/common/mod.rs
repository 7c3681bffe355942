pub mod enums;
pub mod lookup_key;
pub mod meta_packet;

pub const ETH_HEADER_SIZE: usize = 14;
pub const ETH_TYPE_OFFSET: usize = 12;
pub const IPV4_PROTO_OFFSET: usize = 9;
pub const IPV4_FRAG_OFFSET: usize = 6;
pub const IPV4_SRC_OFFSET: usize = 12;
pub const IPV4_DST_OFFSET: usize = 16;
pub const TCP_DATA_OFFSET_BYTE: usize = 12;
