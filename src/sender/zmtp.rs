//! Minimal ZMTP 3.0 publisher-side framing: greeting, NULL-mechanism
//! READY, and message frames. Just enough for a fire-and-forget PUB
//! endpoint speaking to a standard subscriber.

pub const GREETING_LEN: usize = 64;

pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_LONG: u8 = 0x02;
pub const FLAG_COMMAND: u8 = 0x04;

const VERSION_MAJOR: u8 = 3;
const VERSION_MINOR: u8 = 0;

/// Full greeting: signature `0xff 8*0x00 0x7f`, version, the NULL
/// mechanism name padded to 20 bytes, as-server flag, filler.
pub fn greeting() -> [u8; GREETING_LEN] {
    let mut g = [0u8; GREETING_LEN];
    g[0] = 0xff;
    g[9] = 0x7f;
    g[10] = VERSION_MAJOR;
    g[11] = VERSION_MINOR;
    g[12..16].copy_from_slice(b"NULL");
    g
}

/// READY command announcing a PUB socket, sent after the greeting.
pub fn ready_command() -> Vec<u8> {
    let mut body = vec![];
    body.push(b"READY".len() as u8);
    body.extend_from_slice(b"READY");
    body.push(b"Socket-Type".len() as u8);
    body.extend_from_slice(b"Socket-Type");
    body.extend_from_slice(&(b"PUB".len() as u32).to_be_bytes());
    body.extend_from_slice(b"PUB");

    let mut frame = vec![FLAG_COMMAND, body.len() as u8];
    frame.append(&mut body);
    frame
}

/// Appends one message frame. Bodies up to 255 bytes use the short form.
pub fn encode_frame(buf: &mut Vec<u8>, body: &[u8], more: bool) {
    let more_flag = if more { FLAG_MORE } else { 0 };
    if body.len() <= u8::MAX as usize {
        buf.push(more_flag);
        buf.push(body.len() as u8);
    } else {
        buf.push(more_flag | FLAG_LONG);
        buf.extend_from_slice(&(body.len() as u64).to_be_bytes());
    }
    buf.extend_from_slice(body);
}

/// One published record: topic frame flagged MORE, payload frame final.
pub fn encode_publish(buf: &mut Vec<u8>, topic: &[u8], payload: &[u8]) {
    encode_frame(buf, topic, true);
    encode_frame(buf, payload, false);
}
