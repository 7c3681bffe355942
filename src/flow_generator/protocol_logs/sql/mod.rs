pub mod consts;
pub mod formatter;
pub mod obfuscate;
pub mod tokenizer;

use consts::{COMMAND_OFFSET, HEADER_LEN, MAX_FRAME_SIZE};

use crate::utils::bytes::read_u24_le;

/// Result of slicing one protocol frame off the front of a stream buffer.
#[derive(Debug, PartialEq)]
pub enum Carved<'a> {
    /// Not enough bytes for a whole frame; the caller keeps the buffer as is.
    Incomplete,
    Frame {
        command: u8,
        body: &'a [u8],
        rest: &'a [u8],
    },
}

/// Carves the leading MySQL frame out of `buf`. `rest` is always a suffix
/// of the input; a zero-length or not-yet-complete frame carves nothing.
pub fn carve(buf: &[u8]) -> Carved<'_> {
    if buf.len() < HEADER_LEN + 1 {
        return Carved::Incomplete;
    }
    let body_len = read_u24_le(buf) as usize;
    if body_len == 0 || buf.len() < body_len + HEADER_LEN {
        return Carved::Incomplete;
    }
    let end = body_len + HEADER_LEN;
    Carved::Frame {
        command: buf[COMMAND_OFFSET],
        body: &buf[COMMAND_OFFSET + 1..end],
        rest: &buf[end..],
    }
}

/// Upper bound for a stream accumulator: one maximum-size frame plus its
/// header. Anything beyond this can never carve and is dropped.
pub const MAX_BUFFERED: usize = MAX_FRAME_SIZE + HEADER_LEN;
