// Frame header: 3-byte little-endian body length, 1-byte sequence id.
pub const HEADER_LEN: usize = 4;
pub const NUMBER_OFFSET: usize = 3;
pub const COMMAND_OFFSET: usize = 4;
pub const COMMAND_LEN: usize = 1;

// Body length field is 24 bits wide.
pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;

pub const COM_QUIT: u8 = 1;
pub const COM_INIT_DB: u8 = 2;
pub const COM_QUERY: u8 = 3;
pub const COM_FIELD_LIST: u8 = 4;
pub const COM_PING: u8 = 14;
pub const COM_STMT_PREPARE: u8 = 22;
pub const COM_STMT_EXECUTE: u8 = 23;
